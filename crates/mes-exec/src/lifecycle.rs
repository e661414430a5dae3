//! 工序狀態機引擎

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use mes_core::{
    Booking, MaterialConsumption, MesError, Operation, OperationStatus, OrderStatus,
    ProductionOrder, Result, ScrapEvent,
};
use mes_sched::{BookingService, BookingStore};

use crate::cascade::CascadeCalculator;
use crate::quantity;
use crate::{CascadeSummary, CompletionOutcome};

/// 引擎內部狀態
///
/// 訂單、工序、材料消耗帳與報廢事件共用一把鎖：
/// 單次呼叫的全部檢查與寫入都在同一臨界區內完成。
#[derive(Debug, Default)]
struct ExecState {
    orders: HashMap<Uuid, ProductionOrder>,
    /// 各訂單的工序（依 sequence 升冪）
    operations: HashMap<Uuid, Vec<Operation>>,
    /// 工序ID → 訂單ID
    op_index: HashMap<Uuid, Uuid>,
    consumptions: Vec<MaterialConsumption>,
    scrap_events: Vec<ScrapEvent>,
}

/// 工序狀態機引擎
///
/// 推進工序生命週期 `pending → queued → scheduled → running →
/// {complete, skipped}`，強制數量守恆，並在完工申報含報廢時
/// 於同一臨界區內完成成本回溯與事件寫入。
pub struct ExecutionEngine<S: BookingStore> {
    state: Mutex<ExecState>,
    booking: BookingService<S>,
}

impl<S: BookingStore> ExecutionEngine<S> {
    /// 創建新的引擎
    pub fn new(booking: BookingService<S>) -> Self {
        Self {
            state: Mutex::new(ExecState::default()),
            booking,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ExecState>> {
        self.state
            .lock()
            .map_err(|e| MesError::LockPoisoned(e.to_string()))
    }

    /// 定位工序所屬的訂單與陣列索引
    fn locate(state: &ExecState, operation_id: Uuid) -> Result<(Uuid, usize)> {
        let order_id = *state
            .op_index
            .get(&operation_id)
            .ok_or_else(|| MesError::NotFound {
                entity: "工序",
                id: operation_id.to_string(),
            })?;
        let ops = Self::ops_of(state, order_id)?;
        let index = ops
            .iter()
            .position(|o| o.id == operation_id)
            .ok_or_else(|| MesError::NotFound {
                entity: "工序",
                id: operation_id.to_string(),
            })?;
        Ok((order_id, index))
    }

    fn ops_of(state: &ExecState, order_id: Uuid) -> Result<&Vec<Operation>> {
        state
            .operations
            .get(&order_id)
            .ok_or_else(|| MesError::NotFound {
                entity: "生產訂單",
                id: order_id.to_string(),
            })
    }

    fn ops_of_mut(state: &mut ExecState, order_id: Uuid) -> Result<&mut Vec<Operation>> {
        state
            .operations
            .get_mut(&order_id)
            .ok_or_else(|| MesError::NotFound {
                entity: "生產訂單",
                id: order_id.to_string(),
            })
    }

    fn order_of(state: &ExecState, order_id: Uuid) -> Result<ProductionOrder> {
        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| MesError::NotFound {
                entity: "生產訂單",
                id: order_id.to_string(),
            })
    }

    /// 下達生產訂單
    ///
    /// 草稿訂單連同其工序一次進入引擎；工序全數為待排入狀態，
    /// 首工序由呼叫端以 `queue` 排入佇列。
    pub fn release_order(
        &self,
        mut order: ProductionOrder,
        mut operations: Vec<Operation>,
    ) -> Result<ProductionOrder> {
        if order.status != OrderStatus::Draft {
            return Err(MesError::OrderState {
                order_id: order.id,
                status: order.status,
                action: "下達",
            });
        }
        if order.quantity_ordered <= Decimal::ZERO {
            return Err(MesError::InvalidQuantity {
                reason: format!("訂購數量必須為正數，收到 {}", order.quantity_ordered),
            });
        }
        if operations.is_empty() {
            return Err(MesError::InvalidQuantity {
                reason: "生產訂單至少需要一道工序".to_string(),
            });
        }
        if operations.iter().any(|op| op.order_id != order.id) {
            return Err(MesError::InvalidQuantity {
                reason: "工序所屬訂單不一致".to_string(),
            });
        }

        let mut state = self.lock()?;
        if state.orders.contains_key(&order.id) {
            return Err(MesError::OrderState {
                order_id: order.id,
                status: order.status,
                action: "重複下達",
            });
        }

        operations.sort_by_key(|op| op.sequence);
        order.status = OrderStatus::Released;

        tracing::info!(
            "下達生產訂單 {}: 產品 {} × {}，{} 道工序",
            order.code,
            order.product_id,
            order.quantity_ordered,
            operations.len()
        );

        for op in &operations {
            state.op_index.insert(op.id, order.id);
        }
        state.operations.insert(order.id, operations);
        state.orders.insert(order.id, order.clone());

        Ok(order)
    }

    /// 將工序排入佇列（待排入 → 已排入佇列）
    pub fn queue(&self, operation_id: Uuid) -> Result<Operation> {
        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        let order = Self::order_of(&state, order_id)?;
        if order.status == OrderStatus::Cancelled {
            return Err(MesError::OrderState {
                order_id,
                status: order.status,
                action: "排入工序",
            });
        }

        let ops = Self::ops_of_mut(&mut state, order_id)?;
        let op = &mut ops[index];
        if op.status != OperationStatus::Pending {
            return Err(MesError::InvalidTransition {
                operation_id,
                from: op.status,
                action: "排入佇列",
            });
        }

        op.status = OperationStatus::Queued;
        Ok(op.clone())
    }

    /// 為工序預約資源（已排入佇列 → 已預約）
    ///
    /// 待排入的工序會先隱含排入佇列。時長取計劃工時（按目前可
    /// 解析的投入數量），預約成功才寫入工序狀態；衝突原樣上拋，
    /// 錯誤中帶有建議時段。
    pub fn schedule(
        &self,
        operation_id: Uuid,
        resource_id: &str,
        start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Booking> {
        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        let order = Self::order_of(&state, order_id)?;
        if order.status == OrderStatus::Cancelled {
            return Err(MesError::OrderState {
                order_id,
                status: order.status,
                action: "預約資源",
            });
        }

        let ops = Self::ops_of(&state, order_id)?;
        let op = &ops[index];
        if !matches!(
            op.status,
            OperationStatus::Pending | OperationStatus::Queued
        ) {
            return Err(MesError::InvalidTransition {
                operation_id,
                from: op.status,
                action: "預約資源",
            });
        }

        let capacity = op
            .quantity_input
            .unwrap_or_else(|| quantity::resolve_input(&order, ops, index));
        let duration = op.planned_minutes(capacity);

        let booking = self
            .booking
            .book(resource_id, operation_id, start, duration, now)?;

        let ops = Self::ops_of_mut(&mut state, order_id)?;
        let op = &mut ops[index];
        op.status = OperationStatus::Scheduled;
        op.resource_id = Some(resource_id.to_string());
        op.scheduled_slot = Some(booking.slot);

        Ok(booking)
    }

    /// 取消工序的資源預約（已預約 → 已排入佇列）
    ///
    /// 預約採軟釋放，排程歷史保留供稽核。
    pub fn unschedule(&self, operation_id: Uuid) -> Result<Operation> {
        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        {
            let ops = Self::ops_of(&state, order_id)?;
            let op = &ops[index];
            if op.status != OperationStatus::Scheduled {
                return Err(MesError::InvalidTransition {
                    operation_id,
                    from: op.status,
                    action: "取消預約",
                });
            }
        }

        self.booking.cancel_booking(operation_id)?;

        let ops = Self::ops_of_mut(&mut state, order_id)?;
        let op = &mut ops[index];
        op.status = OperationStatus::Queued;
        op.scheduled_slot = None;
        op.resource_id = None;
        Ok(op.clone())
    }

    /// 開工（已排入佇列/已預約 → 執行中）
    ///
    /// 未經預約的工序也可直接開工（臨時上機）；開工時鎖定投入
    /// 數量：取上游最近一個未跳過工序的良品數量，上游未定案時
    /// 保守取訂購數量。
    pub fn start(&self, operation_id: Uuid, now: NaiveDateTime) -> Result<Operation> {
        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        let order = Self::order_of(&state, order_id)?;
        if order.status == OrderStatus::Cancelled {
            return Err(MesError::OrderState {
                order_id,
                status: order.status,
                action: "開工",
            });
        }

        let ops = Self::ops_of(&state, order_id)?;
        let op = &ops[index];
        if !op.is_startable() {
            return Err(MesError::InvalidTransition {
                operation_id,
                from: op.status,
                action: "開工",
            });
        }

        let input = quantity::resolve_input(&order, ops, index);

        let ops = Self::ops_of_mut(&mut state, order_id)?;
        let op = &mut ops[index];
        op.quantity_input = Some(input);
        op.actual_start = Some(now);
        op.status = OperationStatus::Running;
        let snapshot = op.clone();

        if order.status == OrderStatus::Released {
            if let Some(o) = state.orders.get_mut(&order_id) {
                o.status = OrderStatus::InProgress;
            }
        }

        tracing::info!(
            "工序 {} 開工: 投入數量 {} (訂單 {})",
            snapshot.name,
            input,
            order.code
        );

        Ok(snapshot)
    }

    /// 記錄材料消耗（追加式帳目，需在執行中）
    pub fn record_consumption(
        &self,
        operation_id: Uuid,
        component_id: &str,
        quantity_per_unit: Decimal,
        unit_cost: Decimal,
    ) -> Result<MaterialConsumption> {
        if quantity_per_unit <= Decimal::ZERO {
            return Err(MesError::InvalidQuantity {
                reason: format!("單件用量必須為正數，收到 {}", quantity_per_unit),
            });
        }
        if unit_cost < Decimal::ZERO {
            return Err(MesError::InvalidQuantity {
                reason: format!("單位成本不可為負數，收到 {}", unit_cost),
            });
        }

        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        {
            let ops = Self::ops_of(&state, order_id)?;
            let op = &ops[index];
            if op.status != OperationStatus::Running {
                return Err(MesError::InvalidTransition {
                    operation_id,
                    from: op.status,
                    action: "記錄材料消耗",
                });
            }
        }

        let record = MaterialConsumption::new(
            operation_id,
            component_id.to_string(),
            quantity_per_unit,
            unit_cost,
        );
        state.consumptions.push(record.clone());
        Ok(record)
    }

    /// 預覽報廢成本回溯（純查詢，無副作用）
    pub fn preview_scrap_cascade(
        &self,
        operation_id: Uuid,
        scrap_quantity: Decimal,
    ) -> Result<CascadeSummary> {
        let state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        let ops = Self::ops_of(&state, order_id)?;
        let op = &ops[index];
        if op.quantity_input.is_some() && scrap_quantity > op.remaining_quantity() {
            return Err(MesError::InvalidQuantity {
                reason: format!(
                    "報廢數量 {} 超過尚可交代數量 {}",
                    scrap_quantity,
                    op.remaining_quantity()
                ),
            });
        }

        CascadeCalculator::preview(ops, &state.consumptions, operation_id, scrap_quantity)
    }

    /// 完工申報（執行中 → 完工，數量可分多次申報累計）
    ///
    /// 報廢數量 > 0 時必須提供原因代碼；回溯成本從當前消耗帳
    /// 重新計算（不信任呼叫端先前取得的預覽），報廢事件、補產
    /// 訂單與數量更新在同一臨界區內一併提交。投入數量全數交代
    /// 後工序轉為完工並自動排入下一道工序；已完工的工序再次
    /// 申報視為非法轉換。
    pub fn complete(
        &self,
        operation_id: Uuid,
        quantity_good: Decimal,
        quantity_bad: Decimal,
        scrap_reason: Option<&str>,
        notes: Option<String>,
        create_replacement: bool,
        now: NaiveDateTime,
    ) -> Result<CompletionOutcome> {
        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        {
            let ops = Self::ops_of(&state, order_id)?;
            let op = &ops[index];
            if op.status != OperationStatus::Running {
                return Err(MesError::InvalidTransition {
                    operation_id,
                    from: op.status,
                    action: "完工申報",
                });
            }
        }

        let reason_code = if quantity_bad > Decimal::ZERO {
            match scrap_reason {
                Some(r) if !r.trim().is_empty() => Some(r.trim().to_string()),
                _ => return Err(MesError::MissingReason),
            }
        } else {
            None
        };

        // 回溯成本先行計算，數量套用失敗時不留任何寫入
        let cascade_input = if let Some(reason_code) = reason_code {
            let ops = Self::ops_of(&state, order_id)?;
            let summary = CascadeCalculator::preview(
                ops,
                &state.consumptions,
                operation_id,
                quantity_bad,
            )?;
            Some((reason_code, summary, ops.clone()))
        } else {
            None
        };

        // 數量守恆由工序模型強制
        {
            let ops = Self::ops_of_mut(&mut state, order_id)?;
            ops[index]
                .apply_quantities(quantity_good, quantity_bad)
                .map_err(|reason| MesError::InvalidQuantity { reason })?;
        }

        // 報廢回溯：事件與補產訂單跟數量更新同批提交
        let mut cascade = None;
        let mut replacement = None;
        if let Some((reason_code, summary, routing)) = cascade_input {
            let mut event =
                ScrapEvent::new(operation_id, quantity_bad, reason_code, summary.total_cost);
            if let Some(n) = notes {
                event = event.with_notes(n);
            }

            if create_replacement {
                let order = Self::order_of(&state, order_id)?;
                let replica_no = state
                    .orders
                    .values()
                    .filter(|o| o.replaces_order == Some(order_id))
                    .count()
                    + 1;

                let mut new_order = ProductionOrder::new(
                    format!("{}-R{}", order.code, replica_no),
                    order.product_id.clone(),
                    quantity_bad,
                )
                .with_replaces_order(order_id);
                if let Some(so) = order.sales_order_line.clone() {
                    // 補產訂單沿用原始的需求來源
                    new_order = new_order.with_sales_order_line(so);
                }
                new_order.status = OrderStatus::Released;

                let new_ops: Vec<Operation> = routing
                    .iter()
                    .map(|o| {
                        Operation::new(new_order.id, o.sequence, o.name.clone()).with_planned_times(
                            o.planned_setup_minutes,
                            o.planned_run_minutes_per_unit,
                        )
                    })
                    .collect();

                tracing::info!(
                    "建立補產訂單 {}: 產品 {} × {}",
                    new_order.code,
                    new_order.product_id,
                    quantity_bad
                );

                for op in &new_ops {
                    state.op_index.insert(op.id, new_order.id);
                }
                state.operations.insert(new_order.id, new_ops);
                state.orders.insert(new_order.id, new_order.clone());

                event = event.with_replacement_order(new_order.id);
                replacement = Some(new_order);
            }

            tracing::info!(
                "工序報廢 {} 件，回溯 {} 道工序，成本 {}",
                quantity_bad,
                summary.operations_affected(),
                summary.total_cost
            );

            state.scrap_events.push(event);
            cascade = Some(summary);
        }

        // 完工判定與下一道工序排入
        {
            let ops = Self::ops_of_mut(&mut state, order_id)?;
            let op = &mut ops[index];
            if op.is_fully_accounted() {
                op.status = OperationStatus::Complete;
                op.actual_end = Some(now);
                queue_next(ops, index);
            }
        }

        // 訂單數量匯總與結案判定
        {
            let ExecState {
                orders, operations, ..
            } = &mut *state;
            let order = orders.get_mut(&order_id).ok_or_else(|| MesError::NotFound {
                entity: "生產訂單",
                id: order_id.to_string(),
            })?;
            let ops = operations.get(&order_id).ok_or_else(|| MesError::NotFound {
                entity: "生產訂單",
                id: order_id.to_string(),
            })?;
            refresh_order(order, ops);
        }

        let order = Self::order_of(&state, order_id)?;
        let operation = Self::ops_of(&state, order_id)?[index].clone();

        Ok(CompletionOutcome {
            order,
            operation,
            cascade,
            replacement_order: replacement,
        })
    }

    /// 跳過工序（待排入/已排入佇列/已預約 → 已跳過，需提供原因）
    ///
    /// 執行中的工序不可跳過。下游投入數量視跳過的工序為直通。
    pub fn skip(&self, operation_id: Uuid, reason_code: &str) -> Result<Operation> {
        if reason_code.trim().is_empty() {
            return Err(MesError::MissingReason);
        }

        let mut state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;

        let was_scheduled = {
            let ops = Self::ops_of(&state, order_id)?;
            let op = &ops[index];
            if !op.is_skippable() {
                return Err(MesError::InvalidTransition {
                    operation_id,
                    from: op.status,
                    action: "跳過",
                });
            }
            op.status == OperationStatus::Scheduled
        };

        if was_scheduled {
            self.booking.cancel_booking(operation_id)?;
        }

        let ops = Self::ops_of_mut(&mut state, order_id)?;
        let op = &mut ops[index];
        op.status = OperationStatus::Skipped;
        op.skip_reason = Some(reason_code.trim().to_string());
        op.scheduled_slot = None;
        op.resource_id = None;
        let snapshot = op.clone();

        // 若上游已全數定案，跳過即讓出佇列頭，排入下一道工序
        let upstream_done = ops[..index]
            .iter()
            .all(|o| matches!(o.status, OperationStatus::Complete | OperationStatus::Skipped));
        if upstream_done {
            queue_next(ops, index);
        }

        {
            let ExecState {
                orders, operations, ..
            } = &mut *state;
            if let (Some(order), Some(ops)) =
                (orders.get_mut(&order_id), operations.get(&order_id))
            {
                refresh_order(order, ops);
            }
        }

        Ok(snapshot)
    }

    /// 取消生產訂單
    ///
    /// 執行中的工序必須先行完工申報；未開工的工序以取消原因
    /// 跳過並釋放預約。
    pub fn cancel_order(&self, order_id: Uuid, reason_code: &str) -> Result<ProductionOrder> {
        if reason_code.trim().is_empty() {
            return Err(MesError::MissingReason);
        }

        let mut state = self.lock()?;
        let order = Self::order_of(&state, order_id)?;
        if order.is_terminal() {
            return Err(MesError::OrderState {
                order_id,
                status: order.status,
                action: "取消",
            });
        }

        let scheduled_ops: Vec<Uuid> = {
            let ops = Self::ops_of(&state, order_id)?;
            if let Some(running) = ops.iter().find(|o| o.status == OperationStatus::Running) {
                return Err(MesError::InvalidTransition {
                    operation_id: running.id,
                    from: running.status,
                    action: "取消訂單",
                });
            }
            ops.iter()
                .filter(|o| o.status == OperationStatus::Scheduled)
                .map(|o| o.id)
                .collect()
        };

        for op_id in scheduled_ops {
            self.booking.cancel_booking(op_id)?;
        }

        let ops = Self::ops_of_mut(&mut state, order_id)?;
        for op in ops.iter_mut() {
            if op.is_skippable() {
                op.status = OperationStatus::Skipped;
                op.skip_reason = Some(reason_code.trim().to_string());
                op.scheduled_slot = None;
                op.resource_id = None;
            }
        }

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| MesError::NotFound {
                entity: "生產訂單",
                id: order_id.to_string(),
            })?;
        order.status = OrderStatus::Cancelled;

        tracing::info!("生產訂單 {} 已取消: {}", order.code, reason_code);
        Ok(order.clone())
    }

    /// 訂單快照（訂單 + 工序，複製供呈現）
    pub fn order_snapshot(&self, order_id: Uuid) -> Result<(ProductionOrder, Vec<Operation>)> {
        let state = self.lock()?;
        let order = Self::order_of(&state, order_id)?;
        let ops = Self::ops_of(&state, order_id)?.clone();
        Ok((order, ops))
    }

    /// 工序快照
    pub fn operation_snapshot(&self, operation_id: Uuid) -> Result<Operation> {
        let state = self.lock()?;
        let (order_id, index) = Self::locate(&state, operation_id)?;
        Ok(Self::ops_of(&state, order_id)?[index].clone())
    }

    /// 訂單的報廢事件
    pub fn scrap_events_for_order(&self, order_id: Uuid) -> Result<Vec<ScrapEvent>> {
        let state = self.lock()?;
        let ops = Self::ops_of(&state, order_id)?;
        let op_ids: Vec<Uuid> = ops.iter().map(|o| o.id).collect();
        Ok(state
            .scrap_events
            .iter()
            .filter(|e| op_ids.contains(&e.operation_id))
            .cloned()
            .collect())
    }

    /// 工序的材料消耗記錄
    pub fn consumptions_for_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<Vec<MaterialConsumption>> {
        let state = self.lock()?;
        Ok(state
            .consumptions
            .iter()
            .filter(|c| c.operation_id == operation_id)
            .cloned()
            .collect())
    }

    /// 獲取預約服務引用
    pub fn booking(&self) -> &BookingService<S> {
        &self.booking
    }
}

/// 完工/跳過後排入下一道可排入的工序
fn queue_next(operations: &mut [Operation], from_index: usize) {
    for op in operations.iter_mut().skip(from_index + 1) {
        match op.status {
            OperationStatus::Skipped => continue,
            OperationStatus::Pending => {
                op.status = OperationStatus::Queued;
                return;
            }
            _ => return,
        }
    }
}

/// 重算訂單數量匯總並判定結案
///
/// 訂單完工數量 = 最後一道未跳過工序的良品數量（通過全程的
/// 數量）；報廢數量為各工序累計。全部工序定案後，完工數量達
/// 訂購數量則結案為完工，否則為短交。
fn refresh_order(order: &mut ProductionOrder, operations: &[Operation]) {
    order.quantity_scrapped = operations.iter().map(|o| o.quantity_scrapped).sum();
    order.quantity_completed = operations
        .iter()
        .rev()
        .find(|o| o.status != OperationStatus::Skipped)
        .map(|o| o.quantity_completed)
        .unwrap_or(Decimal::ZERO);

    let all_done = operations.iter().all(|o| {
        matches!(
            o.status,
            OperationStatus::Complete | OperationStatus::Skipped
        )
    });
    if all_done && order.status != OrderStatus::Cancelled {
        order.status = if order.quantity_completed >= order.quantity_ordered {
            OrderStatus::Complete
        } else {
            OrderStatus::Short
        };
    }
}
