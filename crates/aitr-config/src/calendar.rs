//! Trading session calendar.
//!
//! Deterministic, pure logic: no IO, no wall-clock sampling beyond the
//! instant passed in. A [`TradingCalendar`] answers "is `at` inside this
//! trader's trading window" given its `ScheduleConfig`.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use aitr_schemas::{parse_hhmm, ScheduleConfig};

#[derive(Clone, Debug, PartialEq)]
pub struct TradingCalendar {
    tz: Tz,
    trading_days: Vec<Weekday>,
    start: (u32, u32),
    end: (u32, u32),
    avoid_open_min: i64,
    avoid_close_min: i64,
    trading_hours_only: bool,
}

impl TradingCalendar {
    /// Builds a calendar from a trader's [`ScheduleConfig`]. Fails only if
    /// the config carries an invalid timezone or time string — callers
    /// should already have run `Personality::validate`.
    pub fn from_schedule(cfg: &ScheduleConfig) -> Result<Self, CalendarError> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|_| CalendarError::UnknownTimezone(cfg.timezone.clone()))?;
        let start = parse_hhmm(&cfg.trading_start)
            .ok_or_else(|| CalendarError::BadTime(cfg.trading_start.clone()))?;
        let end = parse_hhmm(&cfg.trading_end)
            .ok_or_else(|| CalendarError::BadTime(cfg.trading_end.clone()))?;
        let trading_days = cfg
            .trading_days
            .iter()
            .map(|d| weekday_from_sunday(*d))
            .collect::<Option<Vec<_>>>()
            .ok_or(CalendarError::BadWeekday)?;
        Ok(Self {
            tz,
            trading_days,
            start,
            end,
            avoid_open_min: cfg.avoid_open_min,
            avoid_close_min: cfg.avoid_close_min,
            trading_hours_only: cfg.trading_hours_only,
        })
    }

    /// True if `at` falls within this calendar's trading window: a
    /// configured trading day, inside start/end local time, and outside the
    /// avoid-open/avoid-close buffers around the session edges.
    pub fn is_trading_time(&self, at: DateTime<Utc>) -> bool {
        if !self.trading_hours_only {
            return self.is_trading_day(at);
        }
        let local = at.with_timezone(&self.tz);
        if !self.trading_days.contains(&local.weekday()) {
            return false;
        }
        if is_us_market_holiday(local.year(), local.month(), local.day()) {
            return false;
        }
        let minute_of_day = local.hour() as i64 * 60 + local.minute() as i64;
        let start_min = self.start.0 as i64 * 60 + self.start.1 as i64;
        let end_min = self.end.0 as i64 * 60 + self.end.1 as i64;
        minute_of_day >= start_min + self.avoid_open_min
            && minute_of_day <= end_min - self.avoid_close_min
    }

    fn is_trading_day(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);
        self.trading_days.contains(&local.weekday())
            && !is_us_market_holiday(local.year(), local.month(), local.day())
    }

    /// The next instant at or after `from` that begins a trading window,
    /// used by the scheduler to decide how long to sleep when ticking
    /// outside trading hours.
    pub fn next_open(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let mut probe = from;
        for _ in 0..14 * 24 * 60 {
            if self.is_trading_time(probe) {
                return probe;
            }
            probe += chrono::Duration::minutes(1);
        }
        probe
    }
}

fn weekday_from_sunday(n: u8) -> Option<Weekday> {
    match n {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

/// US market holidays, 2024-2027. Extend as needed; the calendar degrades to
/// weekday-only checks for years outside this table.
fn is_us_market_holiday(year: i32, month: u32, day: u32) -> bool {
    const HOLIDAYS: &[(i32, u32, u32)] = &[
        (2024, 1, 1),
        (2024, 1, 15),
        (2024, 2, 19),
        (2024, 3, 29),
        (2024, 5, 27),
        (2024, 6, 19),
        (2024, 7, 4),
        (2024, 9, 2),
        (2024, 11, 28),
        (2024, 12, 25),
        (2025, 1, 1),
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
        (2027, 1, 1),
    ];
    HOLIDAYS.contains(&(year, month, day))
}

#[derive(Clone, Debug, PartialEq)]
pub enum CalendarError {
    UnknownTimezone(String),
    BadTime(String),
    BadWeekday,
}

impl std::fmt::Display for CalendarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTimezone(s) => write!(f, "unknown IANA timezone: {s}"),
            Self::BadTime(s) => write!(f, "bad HH:MM time: {s}"),
            Self::BadWeekday => write!(f, "trading_days entries must be in 0..=6"),
        }
    }
}

impl std::error::Error for CalendarError {}
