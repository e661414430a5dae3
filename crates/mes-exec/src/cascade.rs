//! 報廢成本回溯計算

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mes_core::{MaterialConsumption, MesError, Operation, Result};

/// 回溯成本明細（單一材料）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeLine {
    /// 物料ID
    pub component_id: String,

    /// 單件用量
    pub quantity_per_unit: Decimal,

    /// 消耗當下的單位成本
    pub unit_cost: Decimal,

    /// 回溯數量（報廢件數 × 單件用量）
    pub quantity: Decimal,

    /// 回溯成本
    pub cost: Decimal,
}

/// 回溯成本分組（單一工序）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeOperation {
    /// 工序ID
    pub operation_id: Uuid,

    /// 工序序號
    pub sequence: u32,

    /// 工序名稱
    pub name: String,

    /// 材料明細
    pub lines: Vec<CascadeLine>,

    /// 小計
    pub subtotal: Decimal,
}

/// 回溯成本摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeSummary {
    /// 發生報廢的工序
    pub operation_id: Uuid,

    /// 報廢數量
    pub quantity: Decimal,

    /// 受影響的工序（依序號升冪，只含有材料消耗的工序）
    pub operations: Vec<CascadeOperation>,

    /// 回溯成本總額
    pub total_cost: Decimal,
}

impl CascadeSummary {
    /// 受影響的工序數
    pub fn operations_affected(&self) -> usize {
        self.operations.len()
    }
}

/// 報廢成本回溯計算器
///
/// 工序 k 報廢的件數，其在工序 1..k 已消耗的材料都實體內嵌在
/// 報廢品中無法回收，因此全數按消耗當下的歷史成本計入損失。
/// 純投影計算，無任何副作用。
pub struct CascadeCalculator;

impl CascadeCalculator {
    /// 計算報廢 `quantity` 件在工序 1..k 的材料成本回溯
    ///
    /// `operations` 為同一張訂單的工序（任意順序），`ledger`
    /// 為材料消耗帳；成本一律取帳上記錄的歷史單位成本，
    /// 不受之後的料價變動影響。
    pub fn preview(
        operations: &[Operation],
        ledger: &[MaterialConsumption],
        operation_id: Uuid,
        quantity: Decimal,
    ) -> Result<CascadeSummary> {
        if quantity <= Decimal::ZERO {
            return Err(MesError::InvalidQuantity {
                reason: format!("報廢數量必須為正數，收到 {}", quantity),
            });
        }

        let target = operations
            .iter()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| MesError::NotFound {
                entity: "工序",
                id: operation_id.to_string(),
            })?;

        let mut affected: Vec<&Operation> = operations
            .iter()
            .filter(|op| op.sequence <= target.sequence)
            .collect();
        affected.sort_by_key(|op| op.sequence);

        let mut groups = Vec::new();
        let mut total_cost = Decimal::ZERO;

        for op in affected {
            let lines: Vec<CascadeLine> = ledger
                .iter()
                .filter(|c| c.operation_id == op.id)
                .map(|c| CascadeLine {
                    component_id: c.component_id.clone(),
                    quantity_per_unit: c.quantity_per_unit,
                    unit_cost: c.unit_cost,
                    quantity: quantity * c.quantity_per_unit,
                    cost: c.cost_for(quantity),
                })
                .collect();

            if lines.is_empty() {
                continue;
            }

            let subtotal: Decimal = lines.iter().map(|l| l.cost).sum();
            total_cost += subtotal;

            groups.push(CascadeOperation {
                operation_id: op.id,
                sequence: op.sequence,
                name: op.name.clone(),
                lines,
                subtotal,
            });
        }

        Ok(CascadeSummary {
            operation_id,
            quantity,
            operations: groups,
            total_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    /// 三道工序的測試訂單：工序1、2 各有材料消耗，工序3 尚未消耗
    fn three_op_fixture() -> (Vec<Operation>, Vec<MaterialConsumption>) {
        let order_id = Uuid::new_v4();
        let op1 = Operation::new(order_id, 1, "列印".to_string());
        let op2 = Operation::new(order_id, 2, "組裝".to_string());
        let op3 = Operation::new(order_id, 3, "包裝".to_string());

        let ledger = vec![
            // 工序1: 0.5 kg/件 × 20 元/kg
            MaterialConsumption::new(op1.id, "PLA-RED".to_string(), Decimal::new(5, 1), dec(20)),
            // 工序2: 2 件/件 × 3 元/件
            MaterialConsumption::new(op2.id, "INSERT-M3".to_string(), dec(2), dec(3)),
            // 工序3: 1 件/件 × 5 元/件
            MaterialConsumption::new(op3.id, "BOX-S".to_string(), dec(1), dec(5)),
        ];

        (vec![op1, op2, op3], ledger)
    }

    #[test]
    fn test_cascade_includes_upstream_excludes_downstream() {
        let (operations, ledger) = three_op_fixture();
        let op2_id = operations[1].id;

        let summary = CascadeCalculator::preview(&operations, &ledger, op2_id, dec(10)).unwrap();

        // 工序1: 10 × 0.5 × 20 = 100；工序2: 10 × 2 × 3 = 60；工序3 不計
        assert_eq!(summary.operations_affected(), 2);
        assert_eq!(summary.operations[0].subtotal, dec(100));
        assert_eq!(summary.operations[1].subtotal, dec(60));
        assert_eq!(summary.total_cost, dec(160));
    }

    #[test]
    fn test_cascade_at_first_operation() {
        let (operations, ledger) = three_op_fixture();
        let op1_id = operations[0].id;

        let summary = CascadeCalculator::preview(&operations, &ledger, op1_id, dec(4)).unwrap();

        // 只計工序1: 4 × 0.5 × 20 = 40
        assert_eq!(summary.operations_affected(), 1);
        assert_eq!(summary.total_cost, dec(40));
    }

    #[test]
    fn test_cascade_uses_historical_cost() {
        let order_id = Uuid::new_v4();
        let op1 = Operation::new(order_id, 1, "列印".to_string());

        // 同一材料兩筆記錄，各自凍結消耗當下的成本
        let ledger = vec![
            MaterialConsumption::new(op1.id, "PLA-RED".to_string(), dec(1), dec(20)),
            MaterialConsumption::new(op1.id, "PLA-RED".to_string(), dec(1), dec(25)),
        ];

        let summary =
            CascadeCalculator::preview(&[op1], &ledger, ledger[0].operation_id, dec(2)).unwrap();

        // 2 × 1 × 20 + 2 × 1 × 25 = 90
        assert_eq!(summary.total_cost, dec(90));
    }

    #[test]
    fn test_cascade_rejects_non_positive_quantity() {
        let (operations, ledger) = three_op_fixture();
        let op1_id = operations[0].id;

        let result = CascadeCalculator::preview(&operations, &ledger, op1_id, dec(0));
        assert!(matches!(result, Err(MesError::InvalidQuantity { .. })));

        let result = CascadeCalculator::preview(&operations, &ledger, op1_id, dec(-3));
        assert!(matches!(result, Err(MesError::InvalidQuantity { .. })));
    }

    #[test]
    fn test_cascade_unknown_operation() {
        let (operations, ledger) = three_op_fixture();

        let result =
            CascadeCalculator::preview(&operations, &ledger, Uuid::new_v4(), dec(1));
        assert!(matches!(result, Err(MesError::NotFound { .. })));
    }

    #[test]
    fn test_cascade_with_empty_ledger() {
        let (operations, _) = three_op_fixture();
        let op3_id = operations[2].id;

        let summary = CascadeCalculator::preview(&operations, &[], op3_id, dec(5)).unwrap();

        assert_eq!(summary.operations_affected(), 0);
        assert_eq!(summary.total_cost, Decimal::ZERO);
    }
}
