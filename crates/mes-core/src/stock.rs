//! 物料庫存與供應模型

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BOM 明細（外部主檔資料，單位用量與現行單位成本）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomLine {
    /// 產品ID
    pub product_id: String,

    /// 物料ID
    pub component_id: String,

    /// 單件用量
    pub quantity_per_unit: Decimal,

    /// 單位成本
    pub unit_cost: Decimal,
}

impl BomLine {
    /// 創建新的 BOM 明細
    pub fn new(
        product_id: String,
        component_id: String,
        quantity_per_unit: Decimal,
        unit_cost: Decimal,
    ) -> Self {
        Self {
            product_id,
            component_id,
            quantity_per_unit,
            unit_cost,
        }
    }
}

/// 物料庫存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStock {
    /// 物料ID
    pub component_id: String,

    /// 現有庫存
    pub on_hand_qty: Decimal,

    /// 已分配數量（鎖定給其他訂單）
    pub allocated_qty: Decimal,

    /// 可用庫存（現有 - 已分配）
    pub available_qty: Decimal,
}

impl ItemStock {
    /// 創建新的庫存記錄
    pub fn new(component_id: String, on_hand_qty: Decimal) -> Self {
        Self {
            component_id,
            on_hand_qty,
            allocated_qty: Decimal::ZERO,
            available_qty: on_hand_qty,
        }
    }

    /// 建構器模式：設置已分配數量
    pub fn with_allocated_qty(mut self, allocated_qty: Decimal) -> Self {
        self.allocated_qty = allocated_qty;
        self.available_qty = self.on_hand_qty - allocated_qty;
        self
    }

    /// 計算可用庫存
    pub fn calculate_available(&mut self) {
        self.available_qty = self.on_hand_qty - self.allocated_qty;
    }

    /// 分配庫存
    pub fn allocate(&mut self, quantity: Decimal) -> Result<(), String> {
        if quantity > self.available_qty {
            return Err(format!(
                "庫存不足：需要 {}, 可用 {}",
                quantity, self.available_qty
            ));
        }
        self.allocated_qty += quantity;
        self.calculate_available();
        Ok(())
    }

    /// 釋放已分配的庫存
    pub fn deallocate(&mut self, quantity: Decimal) -> Result<(), String> {
        if quantity > self.allocated_qty {
            return Err(format!(
                "釋放數量超過已分配數量：釋放 {}, 已分配 {}",
                quantity, self.allocated_qty
            ));
        }
        self.allocated_qty -= quantity;
        self.calculate_available();
        Ok(())
    }
}

/// 在途供應（未結案的採購訂單）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingSupply {
    /// 供應ID
    pub id: Uuid,

    /// 物料ID
    pub component_id: String,

    /// 供應數量
    pub quantity: Decimal,

    /// 預計到貨日
    pub due_date: NaiveDate,

    /// 來源單據（採購訂單號）
    pub source_ref: String,

    /// 是否已確認
    pub is_firm: bool,
}

impl IncomingSupply {
    /// 創建新的在途供應
    pub fn new(
        component_id: String,
        quantity: Decimal,
        due_date: NaiveDate,
        source_ref: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            component_id,
            quantity,
            due_date,
            source_ref,
            is_firm: false,
        }
    }

    /// 建構器模式：設置為確認狀態
    pub fn as_firm(mut self) -> Self {
        self.is_firm = true;
        self
    }
}
