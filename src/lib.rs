//! # MES
//!
//! 小批量生產的排程與報廢成本回溯引擎：
//! 工作日曆、資源預約、工序狀態機、報廢成本回溯與物料可用性評估。

pub use mes_core::*;
pub use mes_exec::{
    AvailabilityEvaluator, CascadeCalculator, CascadeLine, CascadeOperation, CascadeSummary,
    CompletionOutcome, ExecutionEngine, FulfillmentReport, FulfillmentStatus, IncomingAnnotation,
    MaterialRequirementLine, RequirementStatus,
};
pub use mes_sched::{BookingService, BookingStore, InMemoryBookingStore, SlotScanner};
