use crate::domain::time_utils::format_break_minutes;
use crate::models::{BreakSession, BreakType};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BreakError {
    #[error("Break type '{0}' not found")]
    UnknownBreakType(String),
    #[error("You already have an ongoing break")]
    BreakAlreadyActive,
    #[error("No ongoing break")]
    NoOpenBreak,
    #[error("Break duration must be at least one minute")]
    InvalidAllotment,
    #[error("Invalid break history filter: {0}")]
    InvalidFilter(String),
}

impl BreakError {
    pub fn code(&self) -> &'static str {
        match self {
            BreakError::UnknownBreakType(_) => "UNKNOWN_BREAK_TYPE",
            BreakError::BreakAlreadyActive => "BREAK_ALREADY_ACTIVE",
            BreakError::NoOpenBreak => "NO_OPEN_BREAK",
            BreakError::InvalidAllotment => "INVALID_BREAK_DURATION",
            BreakError::InvalidFilter(_) => "INVALID_FILTER",
        }
    }
}

pub fn validate_allotment(minutes: i32) -> Result<i32, BreakError> {
    if minutes < 1 {
        return Err(BreakError::InvalidAllotment);
    }
    Ok(minutes)
}

/// Wall-clock minutes rounded to the nearest whole minute.
pub fn rounded_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let millis = (end - start).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as i32
}

pub fn is_exceeded(duration_minutes: i32, allotted_minutes: i32) -> bool {
    duration_minutes > allotted_minutes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakOutcome {
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub exceeded: bool,
}

pub fn close_break(
    session: &BreakSession,
    allotted_minutes: i32,
    now: DateTime<Utc>,
) -> Result<BreakOutcome, BreakError> {
    if !session.is_open() {
        return Err(BreakError::NoOpenBreak);
    }
    let duration_minutes = rounded_minutes(session.start_time, now);
    Ok(BreakOutcome {
        end_time: now,
        duration_minutes,
        exceeded: is_exceeded(duration_minutes, allotted_minutes),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakAlert {
    Warning,
    Exceeded,
}

/// One minute before the allotment runs out; breaks of a minute or less get no warning.
pub fn warning_due_at(start: DateTime<Utc>, allotted_minutes: i32) -> Option<DateTime<Utc>> {
    if allotted_minutes <= 1 {
        return None;
    }
    Some(start + Duration::minutes(i64::from(allotted_minutes - 1)))
}

pub fn exceeded_due_at(start: DateTime<Utc>, allotted_minutes: i32) -> DateTime<Utc> {
    start + Duration::minutes(i64::from(allotted_minutes))
}

/// Which alert, if any, the sweeper owes this session at `now`. Closed
/// sessions never alert; once the exceeded alert is due the warning is stale
/// and is skipped.
pub fn due_alert(
    session: &BreakSession,
    allotted_minutes: i32,
    now: DateTime<Utc>,
) -> Option<BreakAlert> {
    if !session.is_open() {
        return None;
    }
    if now >= exceeded_due_at(session.start_time, allotted_minutes) {
        return session.exceeded_sent_at.is_none().then_some(BreakAlert::Exceeded);
    }
    match warning_due_at(session.start_time, allotted_minutes) {
        Some(due) if now >= due && session.warning_sent_at.is_none() => Some(BreakAlert::Warning),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakTypeUsage {
    pub break_type: String,
    pub count: i64,
    pub total_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakUsageSummary {
    pub today_minutes: i64,
    pub most_used: Option<String>,
    pub avg_per_day_minutes: i64,
    pub over_limit: i64,
    pub usage: Vec<BreakTypeUsage>,
}

/// `today` and `last_week` hold closed sessions only.
pub fn summarize_usage(
    active_types: &[BreakType],
    today: &[BreakSession],
    last_week: &[BreakSession],
) -> BreakUsageSummary {
    let minutes = |s: &BreakSession| i64::from(s.duration_minutes.unwrap_or(0));

    let usage: Vec<BreakTypeUsage> = active_types
        .iter()
        .map(|t| {
            let of_type = last_week.iter().filter(|s| s.break_type == t.name);
            BreakTypeUsage {
                break_type: t.name.clone(),
                count: of_type.clone().count() as i64,
                total_minutes: of_type.map(minutes).sum(),
            }
        })
        .collect();

    let mut most_used: Option<&BreakTypeUsage> = None;
    for entry in &usage {
        if entry.count > most_used.map_or(0, |m| m.count) {
            most_used = Some(entry);
        }
    }

    let week_total: i64 = last_week.iter().map(minutes).sum();

    BreakUsageSummary {
        today_minutes: today.iter().map(minutes).sum(),
        most_used: most_used.map(|m| m.break_type.clone()),
        avg_per_day_minutes: (week_total as f64 / 7.0).round() as i64,
        over_limit: last_week.iter().filter(|s| s.exceeded).count() as i64,
        usage,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedUsage {
    pub break_type: String,
    pub count: i64,
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakDashboard {
    pub todays_break_time: String,
    pub most_used_break: Option<String>,
    pub avg_break_per_day: String,
    pub breaks_over_limit: i64,
    pub break_type_usage: Vec<FormattedUsage>,
}

impl From<BreakUsageSummary> for BreakDashboard {
    fn from(summary: BreakUsageSummary) -> Self {
        BreakDashboard {
            todays_break_time: format_break_minutes(summary.today_minutes),
            most_used_break: summary.most_used,
            avg_break_per_day: format_break_minutes(summary.avg_per_day_minutes),
            breaks_over_limit: summary.over_limit,
            break_type_usage: summary
                .usage
                .into_iter()
                .map(|u| FormattedUsage {
                    break_type: u.break_type,
                    count: u.count,
                    total: format_break_minutes(u.total_minutes),
                })
                .collect(),
        }
    }
}

// --- History listing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakSort {
    #[default]
    Newest,
    Oldest,
    Longest,
    Shortest,
}

impl BreakSort {
    pub const ALL: [BreakSort; 4] = [
        BreakSort::Newest,
        BreakSort::Oldest,
        BreakSort::Longest,
        BreakSort::Shortest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakSort::Newest => "newest",
            BreakSort::Oldest => "oldest",
            BreakSort::Longest => "longest",
            BreakSort::Shortest => "shortest",
        }
    }
}

/// Narrowing applied to a break history listing. Blank query values mean
/// "no filter".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BreakHistoryFilter {
    pub sort: BreakSort,
    pub date: Option<NaiveDate>,
    pub break_type: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl BreakHistoryFilter {
    pub fn parse(
        sort_by: Option<&str>,
        date: Option<&str>,
        break_type: Option<&str>,
    ) -> Result<Self, BreakError> {
        let sort = match non_blank(sort_by) {
            None => BreakSort::default(),
            Some(raw) => BreakSort::ALL
                .into_iter()
                .find(|s| s.as_str().eq_ignore_ascii_case(raw))
                .ok_or_else(|| BreakError::InvalidFilter(format!("unknown sort '{}'", raw)))?,
        };
        let date = non_blank(date)
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                    BreakError::InvalidFilter(format!("date '{}' is not YYYY-MM-DD", raw))
                })
            })
            .transpose()?;

        Ok(BreakHistoryFilter {
            sort,
            date,
            break_type: non_blank(break_type).map(str::to_string),
        })
    }
}

/// One row of the break history as the client renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakHistoryEntry {
    pub id: Uuid,
    pub date: String,
    pub day: String,
    pub break_type: String,
    pub duration: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub exceeded: bool,
}

pub fn history_entry(session: &BreakSession, offset: FixedOffset) -> BreakHistoryEntry {
    let local = session.start_time.with_timezone(&offset);
    BreakHistoryEntry {
        id: session.id,
        date: local.format("%d %B %Y").to_string(),
        day: local.format("%A").to_string(),
        break_type: session.break_type.clone(),
        duration: match session.duration_minutes {
            Some(minutes) => format!("{} min", minutes),
            None => "In progress".to_string(),
        },
        start_time: session.start_time,
        end_time: session.end_time,
        exceeded: session.exceeded,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableBreakFilters {
    pub sort_options: Vec<&'static str>,
    pub break_types: Vec<String>,
}

impl AvailableBreakFilters {
    pub fn new(break_types: Vec<String>) -> Self {
        AvailableBreakFilters {
            sort_options: BreakSort::ALL.iter().map(BreakSort::as_str).collect(),
            break_types,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use uuid::Uuid;

    pub fn break_type(name: &str, minutes: i32) -> BreakType {
        BreakType {
            id: Uuid::new_v4(),
            name: name.to_string(),
            duration_minutes: minutes,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn open_session(break_type: &str, start: DateTime<Utc>) -> BreakSession {
        BreakSession {
            id: Uuid::new_v4(),
            employee_id: Uuid::nil(),
            break_type: break_type.to_string(),
            start_time: start,
            end_time: None,
            duration_minutes: None,
            exceeded: false,
            warning_sent_at: None,
            exceeded_sent_at: None,
            created_at: start,
            updated_at: start,
        }
    }

    pub fn closed_session(break_type: &str, start: DateTime<Utc>, minutes: i32, exceeded: bool) -> BreakSession {
        BreakSession {
            end_time: Some(start + Duration::minutes(i64::from(minutes))),
            duration_minutes: Some(minutes),
            exceeded,
            ..open_session(break_type, start)
        }
    }
}
