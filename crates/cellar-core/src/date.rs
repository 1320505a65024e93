//! Date serial numbers
//!
//! Spreadsheets store dates as a count of days since an epoch, with the time
//! of day as the fractional part. The 1900 system counts 1900-01-01 as day 1
//! and reproduces the historical leap-year bug: day 60 is the nonexistent
//! 1900-02-29, so every later date is one day further from the epoch than
//! the calendar says. The 1904 system counts 1904-01-01 as day 0.
//!
//! [`CalendarDateTime`] can represent 1900-02-29, which makes
//! [`serial_to_calendar`] and [`calendar_to_serial`] exact inverses. The
//! chrono bridges report that one date as an error.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Error, Result};

const MS_PER_DAY: i64 = 86_400_000;

/// Largest serial that maps to a date (9999-12-31 in the 1900 system)
pub const MAX_SERIAL_1900: f64 = 2_958_466.0;

/// Which epoch a workbook's serial numbers count from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DateSystem {
    /// Day 1 is 1900-01-01, with the fictitious 1900-02-29 as day 60
    #[default]
    V1900,
    /// Day 0 is 1904-01-01
    V1904,
}

/// A calendar date and time that can also hold 1900-02-29
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CalendarDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

impl CalendarDateTime {
    /// Midnight on the given date
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
            millisecond: 0,
        }
    }

    /// Check if this is the fictitious 1900-02-29
    pub fn is_phantom_leap_day(&self) -> bool {
        (self.year, self.month, self.day) == (1900, 2, 29)
    }

    /// Convert to chrono; fails for 1900-02-29 and invalid fields
    pub fn to_naive(&self) -> Result<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .ok_or_else(|| Error::DateOutOfRange(self.to_string()))?;
        let time = NaiveTime::from_hms_milli_opt(self.hour, self.minute, self.second, self.millisecond)
            .ok_or_else(|| Error::DateOutOfRange(self.to_string()))?;
        Ok(date.and_time(time))
    }

    fn from_naive(dt: NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            millisecond: dt.nanosecond() / 1_000_000,
        }
    }

    fn time_ms(&self) -> i64 {
        ((self.hour as i64 * 60 + self.minute as i64) * 60 + self.second as i64) * 1000
            + self.millisecond as i64
    }
}

impl std::fmt::Display for CalendarDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    // Constant epoch dates are always valid.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Convert a serial number to a calendar date and time (millisecond precision)
pub fn serial_to_calendar(serial: f64, system: DateSystem) -> Result<CalendarDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial >= MAX_SERIAL_1900 {
        return Err(Error::DateOutOfRange(format!("serial {}", serial)));
    }

    let total_ms = (serial * MS_PER_DAY as f64).round() as i64;
    let days = total_ms.div_euclid(MS_PER_DAY);
    let ms = total_ms.rem_euclid(MS_PER_DAY);

    let date = match system {
        DateSystem::V1900 if days == 60 => None,
        DateSystem::V1900 if days < 60 => Some(ymd(1899, 12, 31) + Duration::days(days)),
        DateSystem::V1900 => Some(ymd(1899, 12, 30) + Duration::days(days)),
        DateSystem::V1904 => Some(ymd(1904, 1, 1) + Duration::days(days)),
    };

    let mut cal = match date {
        Some(date) => CalendarDateTime::date(date.year(), date.month(), date.day()),
        None => CalendarDateTime::date(1900, 2, 29),
    };
    cal.hour = (ms / 3_600_000) as u32;
    cal.minute = (ms / 60_000 % 60) as u32;
    cal.second = (ms / 1000 % 60) as u32;
    cal.millisecond = (ms % 1000) as u32;
    Ok(cal)
}

/// Convert a calendar date and time to a serial number
pub fn calendar_to_serial(cal: &CalendarDateTime, system: DateSystem) -> Result<f64> {
    let days = match system {
        DateSystem::V1900 if cal.is_phantom_leap_day() => 60,
        DateSystem::V1900 => {
            let date = cal.to_naive()?.date();
            let days = (date - ymd(1899, 12, 30)).num_days();
            if date < ymd(1899, 12, 31) {
                return Err(Error::DateOutOfRange(cal.to_string()));
            }
            if date < ymd(1900, 3, 1) {
                days - 1
            } else {
                days
            }
        }
        DateSystem::V1904 => {
            let date = cal.to_naive()?.date();
            let days = (date - ymd(1904, 1, 1)).num_days();
            if days < 0 {
                return Err(Error::DateOutOfRange(cal.to_string()));
            }
            days
        }
    };
    if cal.time_ms() >= MS_PER_DAY {
        return Err(Error::DateOutOfRange(cal.to_string()));
    }
    Ok(days as f64 + cal.time_ms() as f64 / MS_PER_DAY as f64)
}

/// Convert a serial number to a chrono date-time
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> Result<NaiveDateTime> {
    serial_to_calendar(serial, system)?.to_naive()
}

/// Convert a chrono date-time to a serial number
pub fn datetime_to_serial(dt: NaiveDateTime, system: DateSystem) -> Result<f64> {
    calendar_to_serial(&CalendarDateTime::from_naive(dt), system)
}
