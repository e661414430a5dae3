//! 物料可用性評估

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mes_core::{BomLine, IncomingSupply, ItemStock, OrderStatus, ProductionOrder};

/// 需求明細狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementStatus {
    /// 可用庫存足夠
    Ok,
    /// 缺料
    Shortage,
}

/// 在途供應註記（最早可部分補缺口的採購訂單）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingAnnotation {
    /// 來源單據（採購訂單號）
    pub source_ref: String,

    /// 供應數量
    pub quantity: Decimal,

    /// 預計到貨日
    pub due_date: NaiveDate,
}

/// 物料需求明細（衍生資料，依需即算，不持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequirementLine {
    /// 物料ID
    pub component_id: String,

    /// 需求數量（單件用量 × 訂單未完工數量）
    pub required: Decimal,

    /// 可用數量（現有 - 已分配）
    pub available: Decimal,

    /// 缺口
    pub shortage: Decimal,

    /// 狀態分類
    pub status: RequirementStatus,

    /// 在途供應註記（有缺口且有在途時）
    pub incoming: Option<IncomingAnnotation>,
}

/// 出貨狀態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    /// 可出貨
    ReadyToShip,
    /// 部分可出貨
    PartiallyReady,
    /// 受阻
    Blocked,
}

/// 出貨評估結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentReport {
    /// 出貨狀態
    pub status: FulfillmentStatus,

    /// 受阻原因（指向具體缺料物料）
    pub blocking_reason: Option<String>,
}

/// 物料可用性評估器
///
/// 唯讀投影，無任何寫入副作用；現有/已分配數量由外部持續變動，
/// 每次查詢重新計算，不做快取。
pub struct AvailabilityEvaluator;

impl AvailabilityEvaluator {
    /// 評估生產訂單的物料需求
    ///
    /// 對訂單產品的每條 BOM 明細計算
    /// `required = 單件用量 × 未完工數量`、
    /// `available = 現有 − 已分配`、`shortage = max(0, required − available)`；
    /// 有缺口時以最早到貨的在途供應作註記。
    pub fn evaluate_order(
        order: &ProductionOrder,
        bom_lines: &[BomLine],
        stocks: &[ItemStock],
        incoming: &[IncomingSupply],
    ) -> Vec<MaterialRequirementLine> {
        let remaining = order.remaining_quantity();

        bom_lines
            .iter()
            .filter(|line| line.product_id == order.product_id)
            .map(|line| {
                let required = line.quantity_per_unit * remaining;
                let available = stocks
                    .iter()
                    .find(|s| s.component_id == line.component_id)
                    .map(|s| s.on_hand_qty - s.allocated_qty)
                    .unwrap_or(Decimal::ZERO);
                let shortage = (required - available).max(Decimal::ZERO);

                let incoming_note = if shortage > Decimal::ZERO {
                    Self::earliest_incoming(&line.component_id, incoming)
                } else {
                    None
                };

                MaterialRequirementLine {
                    component_id: line.component_id.clone(),
                    required,
                    available,
                    shortage,
                    status: if shortage > Decimal::ZERO {
                        RequirementStatus::Shortage
                    } else {
                        RequirementStatus::Ok
                    },
                    incoming: incoming_note,
                }
            })
            .collect()
    }

    /// 評估銷售訂單的出貨狀態
    ///
    /// 彙總各明細對應生產訂單的狀態：全部完工為可出貨；
    /// 有未完工訂單缺料則受阻，並指出第一個缺料物料；
    /// 其餘為部分可出貨。
    pub fn assess_fulfillment(
        lines: &[(OrderStatus, Vec<MaterialRequirementLine>)],
    ) -> FulfillmentReport {
        if lines
            .iter()
            .all(|(status, _)| *status == OrderStatus::Complete)
        {
            return FulfillmentReport {
                status: FulfillmentStatus::ReadyToShip,
                blocking_reason: None,
            };
        }

        for (status, requirements) in lines {
            if *status == OrderStatus::Complete {
                continue;
            }
            if let Some(shortage) = requirements
                .iter()
                .find(|r| r.status == RequirementStatus::Shortage)
            {
                return FulfillmentReport {
                    status: FulfillmentStatus::Blocked,
                    blocking_reason: Some(format!(
                        "缺料: {} 缺口 {}",
                        shortage.component_id, shortage.shortage
                    )),
                };
            }
        }

        FulfillmentReport {
            status: FulfillmentStatus::PartiallyReady,
            blocking_reason: None,
        }
    }

    /// 最早到貨且可部分補缺口的在途供應
    fn earliest_incoming(
        component_id: &str,
        incoming: &[IncomingSupply],
    ) -> Option<IncomingAnnotation> {
        incoming
            .iter()
            .filter(|s| s.component_id == component_id && s.quantity > Decimal::ZERO)
            .min_by_key(|s| s.due_date)
            .map(|s| IncomingAnnotation {
                source_ref: s.source_ref.clone(),
                quantity: s.quantity,
                due_date: s.due_date,
            })
    }
}
