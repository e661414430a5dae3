//! 工序模型與材料消耗帳

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::TimeSlot;

/// 工序狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// 待排入
    Pending,
    /// 已排入佇列（可開工或預約資源）
    Queued,
    /// 已預約資源
    Scheduled,
    /// 執行中
    Running,
    /// 已完工
    Complete,
    /// 已跳過
    Skipped,
}

/// 工序
///
/// 每張生產訂單的工序依 `sequence` 構成全序；`quantity_input`
/// 由上游最近一個未跳過工序的完工數量決定（首工序取訂購數量）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// 工序ID
    pub id: Uuid,

    /// 所屬生產訂單
    pub order_id: Uuid,

    /// 序號（定義工序先後）
    pub sequence: u32,

    /// 工序名稱
    pub name: String,

    /// 指派的資源（預約前為空）
    pub resource_id: Option<String>,

    /// 計劃換線時間（分鐘）
    pub planned_setup_minutes: u32,

    /// 計劃單件加工時間（分鐘/件）
    pub planned_run_minutes_per_unit: Decimal,

    /// 預約時段
    pub scheduled_slot: Option<TimeSlot>,

    /// 實際開工時間
    pub actual_start: Option<NaiveDateTime>,

    /// 實際完工時間
    pub actual_end: Option<NaiveDateTime>,

    /// 工序狀態
    pub status: OperationStatus,

    /// 投入數量（由上游決定，排入佇列時鎖定）
    pub quantity_input: Option<Decimal>,

    /// 良品數量
    pub quantity_completed: Decimal,

    /// 報廢數量
    pub quantity_scrapped: Decimal,

    /// 跳過原因
    pub skip_reason: Option<String>,
}

impl Operation {
    /// 創建新的工序（待排入狀態）
    pub fn new(order_id: Uuid, sequence: u32, name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            sequence,
            name,
            resource_id: None,
            planned_setup_minutes: 0,
            planned_run_minutes_per_unit: Decimal::ZERO,
            scheduled_slot: None,
            actual_start: None,
            actual_end: None,
            status: OperationStatus::Pending,
            quantity_input: None,
            quantity_completed: Decimal::ZERO,
            quantity_scrapped: Decimal::ZERO,
            skip_reason: None,
        }
    }

    /// 建構器模式：設置計劃工時
    pub fn with_planned_times(mut self, setup_minutes: u32, run_minutes_per_unit: Decimal) -> Self {
        self.planned_setup_minutes = setup_minutes;
        self.planned_run_minutes_per_unit = run_minutes_per_unit;
        self
    }

    /// 依數量計算計劃總工時（分鐘，無條件進位）
    pub fn planned_minutes(&self, quantity: Decimal) -> i64 {
        let total = Decimal::from(self.planned_setup_minutes)
            + self.planned_run_minutes_per_unit * quantity;
        total.ceil().to_i64().unwrap_or(i64::MAX)
    }

    /// 尚可交代的數量（投入 - 良品 - 報廢）
    pub fn remaining_quantity(&self) -> Decimal {
        match self.quantity_input {
            Some(input) => input - self.quantity_completed - self.quantity_scrapped,
            None => Decimal::ZERO,
        }
    }

    /// 檢查數量是否已全數交代
    pub fn is_fully_accounted(&self) -> bool {
        self.quantity_input.is_some() && self.remaining_quantity() <= Decimal::ZERO
    }

    /// 累計良品/報廢數量
    ///
    /// 守恆不變量：`quantity_completed + quantity_scrapped <= quantity_input`
    pub fn apply_quantities(&mut self, good: Decimal, bad: Decimal) -> Result<(), String> {
        if good < Decimal::ZERO || bad < Decimal::ZERO {
            return Err("數量不可為負".to_string());
        }
        if good + bad <= Decimal::ZERO {
            return Err("良品與報廢數量不可同時為零".to_string());
        }
        let remaining = self.remaining_quantity();
        if good + bad > remaining {
            return Err(format!(
                "申報數量 {} 超過尚可交代數量 {}",
                good + bad,
                remaining
            ));
        }
        self.quantity_completed += good;
        self.quantity_scrapped += bad;
        Ok(())
    }

    /// 檢查是否可開工（已排入佇列或已預約）
    pub fn is_startable(&self) -> bool {
        matches!(self.status, OperationStatus::Queued | OperationStatus::Scheduled)
    }

    /// 檢查是否可跳過
    pub fn is_skippable(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Pending | OperationStatus::Queued | OperationStatus::Scheduled
        )
    }
}

/// 材料消耗記錄
///
/// 追加式帳目，一經記錄不再修改；單位成本取消耗當下的歷史成本，
/// 作為報廢成本回溯的唯一依據。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConsumption {
    /// 記錄ID
    pub id: Uuid,

    /// 所屬工序
    pub operation_id: Uuid,

    /// 物料ID
    pub component_id: String,

    /// 單件用量
    pub quantity_per_unit: Decimal,

    /// 消耗當下的單位成本
    pub unit_cost: Decimal,
}

impl MaterialConsumption {
    /// 創建新的消耗記錄
    pub fn new(
        operation_id: Uuid,
        component_id: String,
        quantity_per_unit: Decimal,
        unit_cost: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_id,
            component_id,
            quantity_per_unit,
            unit_cost,
        }
    }

    /// 指定數量的消耗成本
    pub fn cost_for(&self, quantity: Decimal) -> Decimal {
        quantity * self.quantity_per_unit * self.unit_cost
    }
}
