//! Clock-string and duration helpers shared by the attendance, break and
//! reporting code. The duration strings are part of the API surface, so the
//! formats here are exact.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid clock time '{0}', expected HH:mm")]
pub struct TimeFormatError(pub String);

pub fn parse_clock(value: &str) -> Result<NaiveTime, TimeFormatError> {
    let (hours, minutes) = value
        .split_once(':')
        .ok_or_else(|| TimeFormatError(value.to_string()))?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(TimeFormatError(value.to_string()));
    }
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| TimeFormatError(value.to_string()))
}

pub fn time_to_minutes(value: &str) -> Result<i32, TimeFormatError> {
    parse_clock(value).map(minutes_of)
}

pub fn minutes_of(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

/// Drops seconds so stored clock times compare the same way their "HH:mm"
/// renderings do.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// `750.0` -> `"12:30 PM"`. Fractional minutes (averages) round first.
pub fn minutes_to_clock_12h(minutes: f64) -> String {
    let total = minutes.round().max(0.0) as i64 % (24 * 60);
    let hours = total / 60;
    let mins = total % 60;
    let period = if hours >= 12 { "PM" } else { "AM" };
    let display_hours = match hours {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    format!("{}:{:02} {}", display_hours, mins, period)
}

pub fn minutes_to_duration(minutes: i64) -> String {
    if minutes <= 0 {
        return "0h 0m".to_string();
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Break dashboard flavour: "0 min", "22 min", "3 hr", "1 hr 30 min".
pub fn format_break_minutes(minutes: i64) -> String {
    if minutes <= 0 {
        return "0 min".to_string();
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("{} min", m),
        (h, 0) => format!("{} hr", h),
        (h, m) => format!("{} hr {} min", h, m),
    }
}

/// Hours with one decimal, as plotted by the charts.
pub fn hours_one_decimal(minutes: i64) -> f64 {
    (minutes as f64 / 60.0 * 10.0).round() / 10.0
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn weekday_short(date: NaiveDate) -> &'static str {
    &weekday_name(date)[..3]
}

/// Serde adapter rendering `Option<NaiveTime>` as `"HH:mm"` / `null`.
pub mod hhmm_option {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&super::format_clock(*time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse_clock(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
