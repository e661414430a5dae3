//! 列印農場排程與報廢回溯完整範例
//!
//! 展示從下達訂單、資源預約、開工申報到報廢成本回溯與補產的完整流程

use chrono::{NaiveDate, NaiveDateTime};
use mes::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 11, d)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("===== Print Farm Scheduling Example =====\n");

    // 步驟 1: 建立工作日曆（週一到週五 08:00-17:00）
    println!("[1] Create Work Calendar");
    let calendar = WorkCalendar::new("FARM-A".to_string());
    println!("    Calendar: Mon-Fri 08:00-17:00, snap 15 min\n");

    // 步驟 2: 登錄資源
    println!("[2] Register Resources");
    let store = Arc::new(InMemoryBookingStore::new());
    store.upsert_resource(Resource::new(
        "PRINTER-01".to_string(),
        "FDM 列印機 1 號".to_string(),
    ))?;
    store.upsert_resource(Resource::new(
        "PRINTER-02".to_string(),
        "FDM 列印機 2 號".to_string(),
    ))?;
    println!("    PRINTER-01, PRINTER-02\n");

    let engine = ExecutionEngine::new(BookingService::new(store.clone(), calendar));

    // 步驟 3: 下達生產訂單（100 件，三道工序）
    println!("[3] Release Production Order");
    let order = ProductionOrder::new(
        "MO-2025-0412".to_string(),
        "BRACKET-V2".to_string(),
        Decimal::from(100),
    )
    .with_sales_order_line("SO-889-3".to_string());
    let order_id = order.id;

    let operations = vec![
        Operation::new(order_id, 1, "列印".to_string())
            .with_planned_times(20, Decimal::new(45, 1)),
        Operation::new(order_id, 2, "後處理".to_string())
            .with_planned_times(10, Decimal::new(15, 1)),
        Operation::new(order_id, 3, "包裝".to_string())
            .with_planned_times(5, Decimal::new(5, 1)),
    ];
    let op_ids: Vec<_> = operations.iter().map(|o| o.id).collect();

    let order = engine.release_order(order, operations)?;
    println!("    {}: BRACKET-V2 x 100, 3 operations\n", order.code);

    // 步驟 4: 物料可用性檢查
    println!("[4] Check Material Availability");
    let bom = vec![
        BomLine::new(
            "BRACKET-V2".to_string(),
            "PLA-BLACK".to_string(),
            Decimal::new(85, 3), // 0.085 kg/件
            Decimal::from(22),
        ),
        BomLine::new(
            "BRACKET-V2".to_string(),
            "INSERT-M4".to_string(),
            Decimal::from(2),
            Decimal::from(4),
        ),
    ];
    let stocks = vec![
        ItemStock::new("PLA-BLACK".to_string(), Decimal::from(12)),
        ItemStock::new("INSERT-M4".to_string(), Decimal::from(150)),
    ];
    let incoming = vec![IncomingSupply::new(
        "INSERT-M4".to_string(),
        Decimal::from(500),
        NaiveDate::from_ymd_opt(2025, 11, 12).unwrap(),
        "PO-5501".to_string(),
    )];

    let requirement_lines = AvailabilityEvaluator::evaluate_order(&order, &bom, &stocks, &incoming);
    for line in &requirement_lines {
        println!(
            "    {}: required {} / available {} -> {:?}",
            line.component_id, line.required, line.available, line.status
        );
        if let Some(note) = &line.incoming {
            println!(
                "        incoming: {} x {} due {}",
                note.source_ref, note.quantity, note.due_date
            );
        }
    }
    println!();

    // 步驟 5: 預約資源並開工
    println!("[5] Schedule & Start Operation 1");
    let now = dt(3, 8, 0); // 週一 08:00
    let booking = engine.schedule(op_ids[0], "PRINTER-01", dt(3, 9, 0), now)?;
    println!(
        "    PRINTER-01 booked {} ~ {}",
        booking.slot.start, booking.slot.end
    );

    // 衝突示範：另一張訂單搶同一時段
    let other = ProductionOrder::new(
        "MO-2025-0413".to_string(),
        "BRACKET-V2".to_string(),
        Decimal::from(30),
    );
    let other_id = other.id;
    let other_ops = vec![Operation::new(other_id, 1, "列印".to_string())
        .with_planned_times(20, Decimal::new(45, 1))];
    let other_op_id = other_ops[0].id;
    engine.release_order(other, other_ops)?;

    match engine.schedule(other_op_id, "PRINTER-01", dt(3, 9, 0), now) {
        Err(MesError::BookingConflict { suggested, .. }) => {
            let slot = suggested.expect("衝突應附帶建議時段");
            println!(
                "    conflict on PRINTER-01, suggested {} ~ {}",
                slot.start, slot.end
            );
            engine.schedule(other_op_id, "PRINTER-01", slot.start, now)?;
            println!("    accepted suggestion\n");
        }
        other => {
            anyhow::bail!("預期預約衝突，得到 {:?}", other);
        }
    }

    engine.start(op_ids[0], now)?;
    engine.record_consumption(
        op_ids[0],
        "PLA-BLACK",
        Decimal::new(85, 3),
        Decimal::from(22),
    )?;
    let outcome = engine.complete(op_ids[0], Decimal::from(100), Decimal::ZERO, None, None, false, dt(3, 16, 0))?;
    println!("[6] Operation 1 complete: {} good\n", outcome.operation.quantity_completed);

    // 步驟 7: 工序2 報廢 8 件，先預覽回溯成本再提交
    println!("[7] Operation 2 with Scrap");
    engine.start(op_ids[1], dt(4, 8, 0))?;
    engine.record_consumption(op_ids[1], "INSERT-M4", Decimal::from(2), Decimal::from(4))?;

    let preview = engine.preview_scrap_cascade(op_ids[1], Decimal::from(8))?;
    println!(
        "    cascade preview: {} operations affected, total cost {}",
        preview.operations_affected(),
        preview.total_cost
    );
    for group in &preview.operations {
        println!("      op {} ({}): subtotal {}", group.sequence, group.name, group.subtotal);
    }

    let outcome = engine.complete(
        op_ids[1],
        Decimal::from(92),
        Decimal::from(8),
        Some("DELAMINATION"),
        Some("層間剝離".to_string()),
        true,
        dt(4, 15, 0),
    )?;
    let replacement = outcome.replacement_order.expect("應建立補產訂單");
    println!(
        "    scrapped 8, replacement order {} x {}\n",
        replacement.code, replacement.quantity_ordered
    );

    // 步驟 8: 完成包裝，訂單結案
    println!("[8] Finish Packing");
    engine.start(op_ids[2], dt(5, 8, 0))?;
    let outcome = engine.complete(
        op_ids[2],
        Decimal::from(92),
        Decimal::ZERO,
        None,
        None,
        false,
        dt(5, 11, 0),
    )?;
    println!(
        "    order {} -> {:?} (completed {}, scrapped {})",
        outcome.order.code,
        outcome.order.status,
        outcome.order.quantity_completed,
        outcome.order.quantity_scrapped
    );

    println!("\n===== Done =====");
    Ok(())
}
