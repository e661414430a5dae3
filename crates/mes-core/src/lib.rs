//! # MES Core
//!
//! 核心資料模型與類型定義

pub mod calendar;
pub mod operation;
pub mod order;
pub mod resource;
pub mod scrap;
pub mod stock;

// Re-export 主要類型
pub use calendar::{TimeSlot, WorkCalendar};
pub use operation::{MaterialConsumption, Operation, OperationStatus};
pub use order::{OrderStatus, ProductionOrder};
pub use resource::{Booking, Resource, ResourceStatus};
pub use scrap::ScrapEvent;
pub use stock::{BomLine, IncomingSupply, ItemStock};

use uuid::Uuid;

/// MES 錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum MesError {
    #[error("資源 {resource_id} 預約時段衝突")]
    BookingConflict {
        resource_id: String,
        /// 第一個可行的替代時段（由呼叫端決定是否採用）
        suggested: Option<TimeSlot>,
    },

    #[error("資源 {resource_id} 目前無法預約（狀態: {status:?}）")]
    ResourceUnavailable {
        resource_id: String,
        status: ResourceStatus,
    },

    #[error("工序 {operation_id} 狀態 {from:?} 不允許 {action}")]
    InvalidTransition {
        operation_id: Uuid,
        from: OperationStatus,
        action: &'static str,
    },

    #[error("訂單 {order_id} 狀態 {status:?} 不允許 {action}")]
    OrderState {
        order_id: Uuid,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("數量無效: {reason}")]
    InvalidQuantity { reason: String },

    #[error("缺少原因代碼")]
    MissingReason,

    #[error("找不到{entity}: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("工作日曆配置錯誤: {0}")]
    InvalidCalendar(String),

    #[error("鎖定失敗: {0}")]
    LockPoisoned(String),
}

pub type Result<T> = std::result::Result<T, MesError>;
