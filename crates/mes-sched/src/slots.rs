//! 空檔掃描

use chrono::NaiveDateTime;

use mes_core::{Booking, Result, TimeSlot, WorkCalendar};

/// 空檔掃描器
pub struct SlotScanner;

impl SlotScanner {
    /// 從 `after` 起尋找第一個可容納指定時長的空檔
    ///
    /// 依開始時間升冪走訪有效預約，候選時段經工作日曆排定後，
    /// 結束時間不晚於下一個預約的開始時間即採用（端點相接可接受）；
    /// 否則候選點跳到該預約結束後繼續。沒有任何預約時，
    /// 直接取日曆推進後的起點。
    ///
    /// 返回的時段若立即提交預約，必定成功。
    pub fn first_fit(
        bookings: &[Booking],
        duration_minutes: i64,
        after: NaiveDateTime,
        calendar: &WorkCalendar,
        now: NaiveDateTime,
    ) -> Result<TimeSlot> {
        let mut active: Vec<&Booking> = bookings.iter().filter(|b| b.is_active()).collect();
        active.sort_by_key(|b| b.slot.start);

        let mut candidate = calendar.clamp_to_working_start(after, now)?;

        for booking in &active {
            // 已被走過的預約不影響候選點
            if booking.slot.end <= candidate {
                continue;
            }

            let slot = calendar.schedule_within_calendar(candidate, duration_minutes, now)?;
            if slot.end <= booking.slot.start {
                return Ok(slot);
            }

            candidate = calendar.clamp_to_working_start(booking.slot.end, now)?;
        }

        calendar.schedule_within_calendar(candidate, duration_minutes, now)
    }
}
