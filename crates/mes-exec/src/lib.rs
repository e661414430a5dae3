//! # MES Execution
//!
//! 工序狀態機與報廢成本回溯引擎：推進生產訂單的工序生命週期、
//! 守護數量守恆不變量，並在報廢時向上游回溯材料成本。

pub mod availability;
pub mod cascade;
pub mod lifecycle;
pub mod quantity;

// Re-export 主要類型
pub use availability::{
    AvailabilityEvaluator, FulfillmentReport, FulfillmentStatus, IncomingAnnotation,
    MaterialRequirementLine, RequirementStatus,
};
pub use cascade::{CascadeCalculator, CascadeLine, CascadeOperation, CascadeSummary};
pub use lifecycle::ExecutionEngine;

use mes_core::{Operation, ProductionOrder};

/// 完工申報結果
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// 更新後的生產訂單
    pub order: ProductionOrder,

    /// 更新後的工序
    pub operation: Operation,

    /// 報廢成本回溯摘要（有報廢時）
    pub cascade: Option<CascadeSummary>,

    /// 補產訂單（有建立時）
    pub replacement_order: Option<ProductionOrder>,
}
