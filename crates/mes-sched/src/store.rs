//! 預約資料倉儲
//!
//! 倉儲只負責資料存取與原子性，不含排程業務邏輯。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use mes_core::{Booking, MesError, Resource, Result};

/// 預約倉儲能力集
///
/// 排程服務透過此介面存取資源與預約，便於在沒有實際儲存層的
/// 情況下測試。
///
/// # 原子性契約
///
/// `commit_booking` 必須在單一臨界區內完成「重疊檢查 + 寫入」：
/// 兩個併發提交同一資源重疊時段的請求，恰好一個成功，
/// 另一個收到 `BookingConflict`。
pub trait BookingStore: Send + Sync {
    /// 查詢資源
    fn find_resource(&self, resource_id: &str) -> Result<Option<Resource>>;

    /// 寫入/更新資源
    fn upsert_resource(&self, resource: Resource) -> Result<()>;

    /// 查詢資源的有效預約（依開始時間升冪）
    fn list_bookings(&self, resource_id: &str) -> Result<Vec<Booking>>;

    /// 查詢資源的全部預約（含已釋放，稽核用）
    fn all_bookings(&self, resource_id: &str) -> Result<Vec<Booking>>;

    /// 查詢工序目前的有效預約
    fn find_booking(&self, operation_id: Uuid) -> Result<Option<Booking>>;

    /// 原子提交預約（檢查重疊 + 寫入在同一臨界區）
    fn commit_booking(&self, booking: Booking) -> Result<Booking>;

    /// 軟釋放工序的預約（保留稽核記錄）
    fn release_booking(&self, operation_id: Uuid) -> Result<Booking>;
}

/// 倉儲內部狀態
#[derive(Debug, Default)]
struct StoreState {
    resources: HashMap<String, Resource>,
    bookings: Vec<Booking>,
}

/// 記憶體內預約倉儲
///
/// 以單一互斥鎖守護狀態；`commit_booking` 的檢查與寫入在同一把鎖
/// 內完成，等效於資料庫的區間互斥約束。
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    inner: Mutex<StoreState>,
}

impl InMemoryBookingStore {
    /// 創建新的記憶體倉儲
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.inner
            .lock()
            .map_err(|e| MesError::LockPoisoned(e.to_string()))
    }
}

impl BookingStore for InMemoryBookingStore {
    fn find_resource(&self, resource_id: &str) -> Result<Option<Resource>> {
        let state = self.lock()?;
        Ok(state.resources.get(resource_id).cloned())
    }

    fn upsert_resource(&self, resource: Resource) -> Result<()> {
        let mut state = self.lock()?;
        state
            .resources
            .insert(resource.resource_id.clone(), resource);
        Ok(())
    }

    fn list_bookings(&self, resource_id: &str) -> Result<Vec<Booking>> {
        let state = self.lock()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| b.resource_id == resource_id && b.is_active())
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.slot.start);
        Ok(bookings)
    }

    fn all_bookings(&self, resource_id: &str) -> Result<Vec<Booking>> {
        let state = self.lock()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| b.resource_id == resource_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.slot.start);
        Ok(bookings)
    }

    fn find_booking(&self, operation_id: Uuid) -> Result<Option<Booking>> {
        let state = self.lock()?;
        Ok(state
            .bookings
            .iter()
            .find(|b| b.operation_id == operation_id && b.is_active())
            .cloned())
    }

    fn commit_booking(&self, booking: Booking) -> Result<Booking> {
        let mut state = self.lock()?;

        let conflict = state
            .bookings
            .iter()
            .any(|existing| existing.conflicts_with(&booking));

        if conflict {
            return Err(MesError::BookingConflict {
                resource_id: booking.resource_id,
                suggested: None,
            });
        }

        state.bookings.push(booking.clone());
        Ok(booking)
    }

    fn release_booking(&self, operation_id: Uuid) -> Result<Booking> {
        let mut state = self.lock()?;

        let booking = state
            .bookings
            .iter_mut()
            .find(|b| b.operation_id == operation_id && b.is_active())
            .ok_or_else(|| MesError::NotFound {
                entity: "預約",
                id: operation_id.to_string(),
            })?;

        booking.released = true;
        Ok(booking.clone())
    }
}
