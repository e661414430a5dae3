//! 工序投入數量解析

use rust_decimal::Decimal;

use mes_core::{Operation, OperationStatus, ProductionOrder};

/// 解析工序的投入數量上限
///
/// 工序依 `sequence` 構成有序陣列，投入數量沿陣列向前繼承：
/// - 首工序取訂單的訂購數量
/// - 上一個未跳過的工序已完工時，取其良品數量
/// - 上一個工序被跳過時，視為直通，繼續往前找
/// - 上游仍在進行中時，保守取訂單的訂購數量
pub fn resolve_input(
    order: &ProductionOrder,
    operations: &[Operation],
    index: usize,
) -> Decimal {
    let mut cursor = index;

    while cursor > 0 {
        let previous = &operations[cursor - 1];
        match previous.status {
            // 跳過的工序直通，繼續往前繼承
            OperationStatus::Skipped => cursor -= 1,
            OperationStatus::Complete => return previous.quantity_completed,
            // 上游未定案，保守取訂購數量
            _ => return order.quantity_ordered,
        }
    }

    order.quantity_ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_of(quantity: i64) -> ProductionOrder {
        ProductionOrder::new(
            "MO-001".to_string(),
            "WIDGET-A".to_string(),
            Decimal::from(quantity),
        )
    }

    fn ops(order: &ProductionOrder, n: u32) -> Vec<Operation> {
        (1..=n)
            .map(|seq| Operation::new(order.id, seq, format!("工序{}", seq)))
            .collect()
    }

    #[test]
    fn test_first_operation_takes_ordered_quantity() {
        let order = order_of(100);
        let operations = ops(&order, 3);

        assert_eq!(
            resolve_input(&order, &operations, 0),
            Decimal::from(100)
        );
    }

    #[test]
    fn test_inherits_completed_quantity_from_previous() {
        let order = order_of(100);
        let mut operations = ops(&order, 3);

        operations[0].status = OperationStatus::Complete;
        operations[0].quantity_completed = Decimal::from(90);

        assert_eq!(
            resolve_input(&order, &operations, 1),
            Decimal::from(90)
        );
    }

    #[test]
    fn test_skipped_operation_passes_through() {
        let order = order_of(100);
        let mut operations = ops(&order, 3);

        // 工序1 完工 80，工序2 跳過 → 工序3 繼承工序1
        operations[0].status = OperationStatus::Complete;
        operations[0].quantity_completed = Decimal::from(80);
        operations[1].status = OperationStatus::Skipped;

        assert_eq!(
            resolve_input(&order, &operations, 2),
            Decimal::from(80)
        );
    }

    #[test]
    fn test_upstream_in_flight_falls_back_to_ordered() {
        let order = order_of(100);
        let mut operations = ops(&order, 3);

        operations[0].status = OperationStatus::Running;

        // 上游進行中，保守取訂購數量
        assert_eq!(
            resolve_input(&order, &operations, 1),
            Decimal::from(100)
        );
    }

    #[test]
    fn test_all_upstream_skipped_takes_ordered_quantity() {
        let order = order_of(60);
        let mut operations = ops(&order, 3);

        operations[0].status = OperationStatus::Skipped;
        operations[1].status = OperationStatus::Skipped;

        assert_eq!(
            resolve_input(&order, &operations, 2),
            Decimal::from(60)
        );
    }
}
