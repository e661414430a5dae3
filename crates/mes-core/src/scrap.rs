//! 報廢事件模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 報廢事件
///
/// 每次報廢申報產生一筆，一經記錄不再修改；`total_cost`
/// 為回溯成本計算的結果（含上游各工序已消耗的材料）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapEvent {
    /// 事件ID
    pub id: Uuid,

    /// 發生報廢的工序
    pub operation_id: Uuid,

    /// 報廢數量
    pub quantity: Decimal,

    /// 原因代碼
    pub reason_code: String,

    /// 備註
    pub notes: Option<String>,

    /// 回溯成本總額
    pub total_cost: Decimal,

    /// 補產訂單（若有建立）
    pub replacement_order_id: Option<Uuid>,
}

impl ScrapEvent {
    /// 創建新的報廢事件
    pub fn new(
        operation_id: Uuid,
        quantity: Decimal,
        reason_code: String,
        total_cost: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id,
            quantity,
            reason_code,
            notes: None,
            total_cost,
            replacement_order_id: None,
        }
    }

    /// 建構器模式：設置備註
    pub fn with_notes(mut self, notes: String) -> Self {
        self.notes = Some(notes);
        self
    }

    /// 建構器模式：設置補產訂單
    pub fn with_replacement_order(mut self, order_id: Uuid) -> Self {
        self.replacement_order_id = Some(order_id);
        self
    }
}
