//! 生產訂單模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 生產訂單狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// 草稿
    Draft,
    /// 已下達
    Released,
    /// 生產中
    InProgress,
    /// 完工
    Complete,
    /// 短交（完工數量不足且無法補足）
    Short,
    /// 已取消
    Cancelled,
}

/// 生產訂單
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOrder {
    /// 訂單ID
    pub id: Uuid,

    /// 訂單編號
    pub code: String,

    /// 產品ID
    pub product_id: String,

    /// 訂購數量
    pub quantity_ordered: Decimal,

    /// 完工數量（通過全部工序的數量）
    pub quantity_completed: Decimal,

    /// 報廢數量（各工序報廢的累計）
    pub quantity_scrapped: Decimal,

    /// 訂單狀態
    pub status: OrderStatus,

    /// 需求來源（銷售訂單明細，若有）
    pub sales_order_line: Option<String>,

    /// 被替補的原訂單（報廢補產時回鏈）
    pub replaces_order: Option<Uuid>,
}

impl ProductionOrder {
    /// 創建新的生產訂單（草稿狀態）
    pub fn new(code: String, product_id: String, quantity_ordered: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            product_id,
            quantity_ordered,
            quantity_completed: Decimal::ZERO,
            quantity_scrapped: Decimal::ZERO,
            status: OrderStatus::Draft,
            sales_order_line: None,
            replaces_order: None,
        }
    }

    /// 建構器模式：設置需求來源
    pub fn with_sales_order_line(mut self, sales_order_line: String) -> Self {
        self.sales_order_line = Some(sales_order_line);
        self
    }

    /// 建構器模式：設置被替補的原訂單
    pub fn with_replaces_order(mut self, order_id: Uuid) -> Self {
        self.replaces_order = Some(order_id);
        self
    }

    /// 未完工數量
    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity_ordered - self.quantity_completed).max(Decimal::ZERO)
    }

    /// 檢查是否為終止狀態
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OrderStatus::Complete | OrderStatus::Cancelled)
    }

    /// 檢查是否為補產訂單
    pub fn is_replacement(&self) -> bool {
        self.replaces_order.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order() {
        let order = ProductionOrder::new(
            "MO-2025-001".to_string(),
            "WIDGET-A".to_string(),
            Decimal::from(100),
        );

        assert_eq!(order.code, "MO-2025-001");
        assert_eq!(order.quantity_ordered, Decimal::from(100));
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.remaining_quantity(), Decimal::from(100));
        assert!(!order.is_terminal());
        assert!(!order.is_replacement());
    }

    #[test]
    fn test_order_builder() {
        let original = ProductionOrder::new(
            "MO-2025-001".to_string(),
            "WIDGET-A".to_string(),
            Decimal::from(100),
        );

        let replacement = ProductionOrder::new(
            "MO-2025-001-R1".to_string(),
            "WIDGET-A".to_string(),
            Decimal::from(10),
        )
        .with_sales_order_line("SO-001-1".to_string())
        .with_replaces_order(original.id);

        assert_eq!(replacement.sales_order_line, Some("SO-001-1".to_string()));
        assert_eq!(replacement.replaces_order, Some(original.id));
        assert!(replacement.is_replacement());
    }

    #[test]
    fn test_remaining_quantity_floors_at_zero() {
        let mut order = ProductionOrder::new(
            "MO-2025-002".to_string(),
            "WIDGET-B".to_string(),
            Decimal::from(50),
        );

        order.quantity_completed = Decimal::from(60); // 超交
        assert_eq!(order.remaining_quantity(), Decimal::ZERO);
    }

    #[test]
    fn test_terminal_states() {
        let mut order = ProductionOrder::new(
            "MO-2025-003".to_string(),
            "WIDGET-C".to_string(),
            Decimal::from(10),
        );

        order.status = OrderStatus::Complete;
        assert!(order.is_terminal());

        order.status = OrderStatus::Short;
        assert!(!order.is_terminal());

        order.status = OrderStatus::Cancelled;
        assert!(order.is_terminal());
    }
}
