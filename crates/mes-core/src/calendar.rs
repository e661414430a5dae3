//! 工作日曆模型

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{MesError, Result};

/// 最小排程時段（分鐘），避免產生零長度的排程區間
pub const MIN_SCHEDULE_MINUTES: i64 = 30;

/// 連續掃描工作日的上限（天）
const MAX_DAY_SCAN: u32 = 366;

/// 時段（半開區間 `[start, end)`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// 開始時間
    pub start: NaiveDateTime,
    /// 結束時間
    pub end: NaiveDateTime,
}

impl TimeSlot {
    /// 創建新的時段
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// 檢查兩個時段是否重疊（端點相接不算重疊）
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// 檢查兩個時段是否端點相接
    pub fn abuts(&self, other: &TimeSlot) -> bool {
        self.end == other.start || other.end == self.start
    }

    /// 時段長度（分鐘）
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// 工作日曆
///
/// 將任意時間點映射到每週排班（工作日、每日起訖時間）內的有效工作時間。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCalendar {
    /// 日曆ID
    pub calendar_id: String,

    /// 工作日（週一到週日，true表示工作日）
    /// 索引 0 = 週一, 1 = 週二, ..., 6 = 週日
    pub working_days: [bool; 7],

    /// 節假日列表
    pub holidays: Vec<NaiveDate>,

    /// 每日開工時間
    pub day_start: NaiveTime,

    /// 每日收工時間（不含，到點即收工）
    pub day_end: NaiveTime,

    /// 排程對齊粒度（分鐘）
    pub snap_minutes: u32,
}

impl WorkCalendar {
    /// 創建新的工作日曆（預設週一到週五 08:00-17:00，粒度 15 分鐘）
    pub fn new(calendar_id: String) -> Self {
        Self {
            calendar_id,
            working_days: [true, true, true, true, true, false, false], // 週一到週五
            holidays: Vec::new(),
            day_start: NaiveTime::from_hms_opt(8, 0, 0).expect("時間溢出"),
            day_end: NaiveTime::from_hms_opt(17, 0, 0).expect("時間溢出"),
            snap_minutes: 15,
        }
    }

    /// 建構器模式：設置工作日
    pub fn with_working_days(mut self, working_days: [bool; 7]) -> Self {
        self.working_days = working_days;
        self
    }

    /// 建構器模式：設置每日起訖時間
    pub fn with_day_window(mut self, day_start: NaiveTime, day_end: NaiveTime) -> Self {
        self.day_start = day_start;
        self.day_end = day_end;
        self
    }

    /// 建構器模式：設置對齊粒度
    pub fn with_snap_minutes(mut self, snap_minutes: u32) -> Self {
        self.snap_minutes = snap_minutes;
        self
    }

    /// 建構器模式：添加節假日
    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    /// 添加節假日
    pub fn add_holiday(&mut self, date: NaiveDate) {
        if !self.holidays.contains(&date) {
            self.holidays.push(date);
            self.holidays.sort();
        }
    }

    /// 檢查是否為工作日
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        if self.holidays.contains(&date) {
            return false;
        }

        let weekday_index = date.weekday().num_days_from_monday() as usize;
        self.working_days[weekday_index]
    }

    /// 驗證排班配置（零工作日或起訖顛倒視為配置錯誤，直接失敗）
    pub fn validate(&self) -> Result<()> {
        if !self.working_days.iter().any(|&d| d) {
            return Err(MesError::InvalidCalendar(format!(
                "日曆 {} 沒有任何工作日",
                self.calendar_id
            )));
        }
        if self.day_start >= self.day_end {
            return Err(MesError::InvalidCalendar(format!(
                "日曆 {} 每日起訖時間顛倒: {} >= {}",
                self.calendar_id, self.day_start, self.day_end
            )));
        }
        if self.snap_minutes == 0 {
            return Err(MesError::InvalidCalendar(format!(
                "日曆 {} 對齊粒度不可為 0",
                self.calendar_id
            )));
        }
        Ok(())
    }

    /// 對齊到最近的粒度格點（格點以午夜為基準）
    pub fn snap(&self, instant: NaiveDateTime) -> NaiveDateTime {
        let snap = self.snap_minutes.max(1);
        let minutes = instant.time().hour() * 60 + instant.time().minute();
        let rounded = ((minutes + snap / 2) / snap) * snap;

        if rounded >= 24 * 60 {
            // 四捨五入跨日，落到次日零點
            return instant
                .date()
                .succ_opt()
                .expect("日期溢出")
                .and_time(NaiveTime::from_hms_opt(0, 0, 0).expect("時間溢出"));
        }

        instant
            .date()
            .and_time(NaiveTime::from_hms_opt(rounded / 60, rounded % 60, 0).expect("時間溢出"))
    }

    /// 將時間點推進到下一個有效的工作開始時間
    ///
    /// 規則：
    /// - 早於 `now` 的時間點先推進到 `now`
    /// - 非工作日/節假日推進到下一個工作日的開工時間
    /// - 早於開工時間推進到當日開工時間；到達或超過收工時間推進到下一個工作日
    pub fn clamp_to_working_start(
        &self,
        instant: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime> {
        self.validate()?;

        let floor = if instant < now { now } else { instant };
        let mut cursor = self.snap(floor);
        if cursor < now {
            cursor += Duration::minutes(self.snap_minutes as i64);
        }

        for _ in 0..MAX_DAY_SCAN {
            if !self.is_working_day(cursor.date()) {
                cursor = self.next_day_start(cursor.date());
                continue;
            }
            if cursor.time() < self.day_start {
                cursor = cursor.date().and_time(self.day_start);
                continue;
            }
            if cursor.time() >= self.day_end {
                cursor = self.next_day_start(cursor.date());
                continue;
            }
            return Ok(cursor);
        }

        Err(MesError::InvalidCalendar(format!(
            "日曆 {} 連續 {} 天內找不到工作時段",
            self.calendar_id, MAX_DAY_SCAN
        )))
    }

    /// 從有效的工作開始時間起消耗指定的工作時長（分鐘）
    ///
    /// 只在工作時段內消耗時間，跨日時自動延續到下一個工作日；
    /// 時長不足 `MIN_SCHEDULE_MINUTES` 時以最小時段計。
    pub fn add_work_duration(
        &self,
        start: NaiveDateTime,
        duration_minutes: i64,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime> {
        let mut remaining = duration_minutes.max(MIN_SCHEDULE_MINUTES);
        let mut cursor = self.clamp_to_working_start(start, now)?;

        for _ in 0..MAX_DAY_SCAN {
            let day_close = cursor.date().and_time(self.day_end);
            let available = (day_close - cursor).num_minutes();

            if remaining <= available {
                return Ok(cursor + Duration::minutes(remaining));
            }

            remaining -= available;
            cursor = self.clamp_to_working_start(self.next_day_start(cursor.date()), now)?;
        }

        Err(MesError::InvalidCalendar(format!(
            "日曆 {} 無法在 {} 天內容納 {} 分鐘的工作時長",
            self.calendar_id, MAX_DAY_SCAN, duration_minutes
        )))
    }

    /// 在日曆內排定一個完整時段
    ///
    /// 返回的 `{start, end}` 保證完全落在工作時段內且不早於 `now`。
    pub fn schedule_within_calendar(
        &self,
        start: NaiveDateTime,
        duration_minutes: i64,
        now: NaiveDateTime,
    ) -> Result<TimeSlot> {
        let slot_start = self.clamp_to_working_start(start, now)?;
        let slot_end = self.add_work_duration(slot_start, duration_minutes, now)?;
        Ok(TimeSlot::new(slot_start, slot_end))
    }

    /// 次日開工時間
    fn next_day_start(&self, date: NaiveDate) -> NaiveDateTime {
        date.succ_opt().expect("日期溢出").and_time(self.day_start)
    }
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::new("DEFAULT".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_slot_overlap_and_abut() {
        let a = TimeSlot::new(dt(2025, 11, 3, 9, 0), dt(2025, 11, 3, 10, 0));
        let b = TimeSlot::new(dt(2025, 11, 3, 10, 0), dt(2025, 11, 3, 11, 0));
        let c = TimeSlot::new(dt(2025, 11, 3, 9, 30), dt(2025, 11, 3, 10, 30));

        // 端點相接不算重疊
        assert!(!a.overlaps(&b));
        assert!(a.abuts(&b));
        assert!(a.overlaps(&c));
        assert_eq!(a.duration_minutes(), 60);
    }

    #[rstest]
    #[case(dt(2025, 11, 3, 9, 7), dt(2025, 11, 3, 9, 0))]
    #[case(dt(2025, 11, 3, 9, 8), dt(2025, 11, 3, 9, 15))]
    #[case(dt(2025, 11, 3, 23, 55), dt(2025, 11, 4, 0, 0))]
    fn test_snap_to_grid(#[case] input: NaiveDateTime, #[case] expected: NaiveDateTime) {
        let calendar = WorkCalendar::default();
        assert_eq!(calendar.snap(input), expected);
    }

    #[test]
    fn test_clamp_within_working_hours() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 8, 0); // 週一

        // 工作時段內的時間點不動
        let t = calendar
            .clamp_to_working_start(dt(2025, 11, 3, 10, 0), now)
            .unwrap();
        assert_eq!(t, dt(2025, 11, 3, 10, 0));
    }

    #[test]
    fn test_clamp_before_now_advances_to_now() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 10, 0);

        let t = calendar
            .clamp_to_working_start(dt(2025, 11, 3, 9, 0), now)
            .unwrap();
        assert_eq!(t, dt(2025, 11, 3, 10, 0));
    }

    #[test]
    fn test_clamp_weekend_rolls_to_monday() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 1, 0, 0); // 週六

        let t = calendar
            .clamp_to_working_start(dt(2025, 11, 1, 10, 0), now)
            .unwrap();
        // 推進到週一開工時間
        assert_eq!(t, dt(2025, 11, 3, 8, 0));
    }

    #[test]
    fn test_clamp_exactly_at_closing_rolls_over() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 8, 0);

        // 正好在收工時間點，推進到次日開工
        let t = calendar
            .clamp_to_working_start(dt(2025, 11, 3, 17, 0), now)
            .unwrap();
        assert_eq!(t, dt(2025, 11, 4, 8, 0));
    }

    #[test]
    fn test_clamp_skips_holiday() {
        let mut calendar = WorkCalendar::default();
        calendar.add_holiday(NaiveDate::from_ymd_opt(2025, 11, 4).unwrap());
        let now = dt(2025, 11, 3, 17, 0);

        let t = calendar
            .clamp_to_working_start(dt(2025, 11, 3, 17, 0), now)
            .unwrap();
        // 11/4 是節假日，跳到 11/5
        assert_eq!(t, dt(2025, 11, 5, 8, 0));
    }

    #[test]
    fn test_add_duration_within_day() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 8, 0);

        let end = calendar
            .add_work_duration(dt(2025, 11, 3, 9, 0), 120, now)
            .unwrap();
        assert_eq!(end, dt(2025, 11, 3, 11, 0));
    }

    #[test]
    fn test_add_duration_spans_multiple_days() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 8, 0);

        // 週一 15:00 起 6 小時：當日剩 2 小時，剩餘 4 小時落到週二
        let end = calendar
            .add_work_duration(dt(2025, 11, 3, 15, 0), 360, now)
            .unwrap();
        assert_eq!(end, dt(2025, 11, 4, 12, 0));
    }

    #[test]
    fn test_add_duration_spans_weekend() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 7, 8, 0); // 週五

        // 週五 16:00 起 3 小時：當日剩 1 小時，剩餘 2 小時跳過週末落到週一
        let end = calendar
            .add_work_duration(dt(2025, 11, 7, 16, 0), 180, now)
            .unwrap();
        assert_eq!(end, dt(2025, 11, 10, 10, 0));
    }

    #[test]
    fn test_minimum_schedule_chunk() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 8, 0);

        // 10 分鐘的需求仍以最小時段 30 分鐘排定
        let slot = calendar
            .schedule_within_calendar(dt(2025, 11, 3, 9, 0), 10, now)
            .unwrap();
        assert_eq!(slot.duration_minutes(), MIN_SCHEDULE_MINUTES);
    }

    #[test]
    fn test_zero_working_days_fails_fast() {
        let calendar = WorkCalendar::new("EMPTY".to_string()).with_working_days([false; 7]);
        let now = dt(2025, 11, 3, 8, 0);

        let result = calendar.clamp_to_working_start(dt(2025, 11, 3, 9, 0), now);
        assert!(matches!(result, Err(MesError::InvalidCalendar(_))));
    }

    #[test]
    fn test_inverted_day_window_fails_fast() {
        let calendar = WorkCalendar::new("BAD".to_string()).with_day_window(
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        );
        let now = dt(2025, 11, 3, 8, 0);

        assert!(calendar
            .clamp_to_working_start(dt(2025, 11, 3, 9, 0), now)
            .is_err());
    }

    #[test]
    fn test_schedule_within_calendar_not_before_now() {
        let calendar = WorkCalendar::default();
        let now = dt(2025, 11, 3, 13, 0);

        let slot = calendar
            .schedule_within_calendar(dt(2025, 11, 3, 9, 0), 60, now)
            .unwrap();
        assert!(slot.start >= now);
        assert_eq!(slot.end, slot.start + Duration::minutes(60));
    }
}
