//! 資源與預約模型

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::TimeSlot;

/// 資源狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    /// 可用
    Available,
    /// 使用中
    Busy,
    /// 保養中
    Maintenance,
    /// 停機
    Offline,
}

/// 資源（機台/工作中心）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// 資源代碼
    pub resource_id: String,

    /// 資源名稱
    pub name: String,

    /// 資源狀態
    pub status: ResourceStatus,
}

impl Resource {
    /// 創建新的資源（預設可用）
    pub fn new(resource_id: String, name: String) -> Self {
        Self {
            resource_id,
            name,
            status: ResourceStatus::Available,
        }
    }

    /// 建構器模式：設置狀態
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// 檢查是否可接受預約（保養中/停機不可）
    pub fn is_bookable(&self) -> bool {
        matches!(self.status, ResourceStatus::Available | ResourceStatus::Busy)
    }
}

/// 資源預約
///
/// 同一資源的有效預約時段互不重疊；取消採軟釋放，
/// 保留記錄供排程稽核。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// 預約ID
    pub id: Uuid,

    /// 資源代碼
    pub resource_id: String,

    /// 所屬工序
    pub operation_id: Uuid,

    /// 預約時段
    pub slot: TimeSlot,

    /// 已釋放（不再占用時段，但保留稽核記錄）
    pub released: bool,
}

impl Booking {
    /// 創建新的預約
    pub fn new(resource_id: String, operation_id: Uuid, slot: TimeSlot) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            operation_id,
            slot,
            released: false,
        }
    }

    /// 檢查是否仍占用時段
    pub fn is_active(&self) -> bool {
        !self.released
    }

    /// 檢查與另一預約是否衝突（僅限同一資源的有效預約）
    pub fn conflicts_with(&self, other: &Booking) -> bool {
        self.resource_id == other.resource_id
            && self.is_active()
            && other.is_active()
            && self.slot.overlaps(&other.slot)
    }
}
