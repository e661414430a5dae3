//! 資源預約服務

use std::sync::Arc;

use chrono::NaiveDateTime;
use uuid::Uuid;

use mes_core::{Booking, MesError, Result, TimeSlot, WorkCalendar};

use crate::slots::SlotScanner;
use crate::store::BookingStore;

/// 資源預約服務
///
/// 預約的「檢查 + 寫入」原子性由倉儲保證；本服務負責日曆排定、
/// 資源狀態檢查與衝突時的替代時段建議。衝突不自動重試，
/// 由呼叫端決定採用建議時段或改選資源。
pub struct BookingService<S: BookingStore> {
    store: Arc<S>,
    calendar: WorkCalendar,
}

impl<S: BookingStore> BookingService<S> {
    /// 創建新的預約服務
    pub fn new(store: Arc<S>, calendar: WorkCalendar) -> Self {
        Self { store, calendar }
    }

    /// 預約資源
    ///
    /// 時段經工作日曆排定（對齊粒度、工作時間、不早於 `now`）後
    /// 原子提交；衝突時返回 `BookingConflict` 並附帶第一個可行的
    /// 替代時段。
    pub fn book(
        &self,
        resource_id: &str,
        operation_id: Uuid,
        start: NaiveDateTime,
        duration_minutes: i64,
        now: NaiveDateTime,
    ) -> Result<Booking> {
        let resource = self
            .store
            .find_resource(resource_id)?
            .ok_or_else(|| MesError::NotFound {
                entity: "資源",
                id: resource_id.to_string(),
            })?;

        if !resource.is_bookable() {
            return Err(MesError::ResourceUnavailable {
                resource_id: resource_id.to_string(),
                status: resource.status,
            });
        }

        let slot = self
            .calendar
            .schedule_within_calendar(start, duration_minutes, now)?;

        match self
            .store
            .commit_booking(Booking::new(resource_id.to_string(), operation_id, slot))
        {
            Ok(booking) => {
                tracing::info!(
                    "資源 {} 預約成功: {} ~ {} (工序 {})",
                    resource_id,
                    booking.slot.start,
                    booking.slot.end,
                    operation_id
                );
                Ok(booking)
            }
            Err(MesError::BookingConflict { .. }) => {
                let suggested =
                    self.suggest_next_available(resource_id, duration_minutes, start, now)?;
                tracing::debug!(
                    "資源 {} 時段衝突，建議改用 {} ~ {}",
                    resource_id,
                    suggested.start,
                    suggested.end
                );
                Err(MesError::BookingConflict {
                    resource_id: resource_id.to_string(),
                    suggested: Some(suggested),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 建議下一個可用時段
    ///
    /// 若建議的時段立即預約，必定成功（不考慮期間其他呼叫端的寫入）。
    pub fn suggest_next_available(
        &self,
        resource_id: &str,
        duration_minutes: i64,
        after: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<TimeSlot> {
        let bookings = self.store.list_bookings(resource_id)?;
        SlotScanner::first_fit(&bookings, duration_minutes, after, &self.calendar, now)
    }

    /// 取消工序的預約（軟釋放，保留稽核記錄）
    pub fn cancel_booking(&self, operation_id: Uuid) -> Result<Booking> {
        let booking = self.store.release_booking(operation_id)?;
        tracing::info!(
            "工序 {} 的預約已釋放: 資源 {} {} ~ {}",
            operation_id,
            booking.resource_id,
            booking.slot.start,
            booking.slot.end
        );
        Ok(booking)
    }

    /// 獲取工作日曆引用
    pub fn calendar(&self) -> &WorkCalendar {
        &self.calendar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBookingStore;
    use chrono::{Duration, NaiveDate};
    use mes_core::{Resource, ResourceStatus};
    use proptest::prelude::*;

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn service_with_printer() -> (Arc<InMemoryBookingStore>, BookingService<InMemoryBookingStore>) {
        let store = Arc::new(InMemoryBookingStore::new());
        store
            .upsert_resource(Resource::new(
                "PRINTER-01".to_string(),
                "FDM 列印機 1 號".to_string(),
            ))
            .unwrap();
        let service = BookingService::new(store.clone(), WorkCalendar::default());
        (store, service)
    }

    #[test]
    fn test_book_success() {
        let (_store, service) = service_with_printer();
        let now = dt(3, 8, 0); // 週一

        let booking = service
            .book("PRINTER-01", Uuid::new_v4(), dt(3, 9, 0), 120, now)
            .unwrap();

        assert_eq!(booking.slot.start, dt(3, 9, 0));
        assert_eq!(booking.slot.end, dt(3, 11, 0));
    }

    #[test]
    fn test_conflict_carries_usable_suggestion() {
        let (_store, service) = service_with_printer();
        let now = dt(3, 8, 0);

        service
            .book("PRINTER-01", Uuid::new_v4(), dt(3, 9, 0), 120, now)
            .unwrap();

        // 重疊請求收到衝突與建議時段
        let err = service
            .book("PRINTER-01", Uuid::new_v4(), dt(3, 10, 0), 60, now)
            .unwrap_err();

        let suggested = match err {
            MesError::BookingConflict { suggested, .. } => suggested.unwrap(),
            other => panic!("預期衝突錯誤，得到 {:?}", other),
        };

        // 建議時段不與既有預約重疊，立即預約必定成功
        service
            .book(
                "PRINTER-01",
                Uuid::new_v4(),
                suggested.start,
                suggested.duration_minutes(),
                now,
            )
            .unwrap();
    }

    #[test]
    fn test_book_offline_resource_fails() {
        let (store, service) = service_with_printer();
        store
            .upsert_resource(
                Resource::new("PRINTER-02".to_string(), "FDM 列印機 2 號".to_string())
                    .with_status(ResourceStatus::Maintenance),
            )
            .unwrap();
        let now = dt(3, 8, 0);

        let result = service.book("PRINTER-02", Uuid::new_v4(), dt(3, 9, 0), 60, now);
        assert!(matches!(
            result,
            Err(MesError::ResourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_book_unknown_resource_fails() {
        let (_store, service) = service_with_printer();
        let now = dt(3, 8, 0);

        let result = service.book("NO-SUCH", Uuid::new_v4(), dt(3, 9, 0), 60, now);
        assert!(matches!(result, Err(MesError::NotFound { .. })));
    }

    #[test]
    fn test_cancel_then_rebook_same_slot() {
        let (_store, service) = service_with_printer();
        let now = dt(3, 8, 0);
        let op_id = Uuid::new_v4();

        service
            .book("PRINTER-01", op_id, dt(3, 9, 0), 120, now)
            .unwrap();
        service.cancel_booking(op_id).unwrap();

        // 釋放後同時段可由其他工序使用
        service
            .book("PRINTER-01", Uuid::new_v4(), dt(3, 9, 0), 120, now)
            .unwrap();
    }

    #[test]
    fn test_concurrent_overlapping_requests_single_winner() {
        let (_store, service) = service_with_printer();
        let service = Arc::new(service);
        let now = dt(3, 8, 0);

        // 兩個執行緒搶同一資源的重疊時段
        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            handles.push(std::thread::spawn(move || {
                service.book("PRINTER-01", Uuid::new_v4(), dt(3, 9, 0), 120, now)
            }));
        }

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("執行緒失敗"))
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(MesError::BookingConflict { suggested: Some(s), .. })
                if s.duration_minutes() >= 120))
            .count();

        // 恰好一個成功，另一個收到含可行建議的衝突
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 1);
    }

    proptest! {
        /// 任意一串預約請求後，同一資源的有效預約兩兩不重疊
        #[test]
        fn prop_active_bookings_never_overlap(
            requests in prop::collection::vec((0i64..160, 15i64..300), 1..30)
        ) {
            let (store, service) = service_with_printer();
            let now = dt(3, 8, 0);

            for (offset_steps, duration) in requests {
                let start = now + Duration::minutes(offset_steps * 15);
                // 衝突是合法結果，只驗證不變量
                let _ = service.book("PRINTER-01", Uuid::new_v4(), start, duration, now);
            }

            let bookings = store.list_bookings("PRINTER-01").unwrap();
            for i in 0..bookings.len() {
                for j in (i + 1)..bookings.len() {
                    prop_assert!(!bookings[i].slot.overlaps(&bookings[j].slot));
                }
            }
        }
    }
}
