//! Focus-session state machine.
//!
//! Transitions take the current row and return the next one; persistence
//! writes the result back with an update filtered on the status that was
//! read, so a lost race looks exactly like the rejection below.

use crate::models::{TimerSession, TimerStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_PLANNED_MINUTES: i32 = 240;
pub const HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("You already have an active timer")]
    AlreadyActive,
    #[error("Timer is not running")]
    NotRunning,
    #[error("Timer is not paused")]
    NotPaused,
    #[error("Timer is already finished")]
    AlreadyFinished,
    #[error("Timer duration must be between 0 and {MAX_PLANNED_MINUTES} minutes, got {0}")]
    InvalidDuration(i32),
    #[error("Timer tag cannot be empty")]
    EmptyTag,
}

impl TimerError {
    pub fn code(&self) -> &'static str {
        match self {
            TimerError::AlreadyActive => "TIMER_ALREADY_ACTIVE",
            TimerError::NotRunning => "TIMER_NOT_RUNNING",
            TimerError::NotPaused => "TIMER_NOT_PAUSED",
            TimerError::AlreadyFinished => "TIMER_FINISHED",
            TimerError::InvalidDuration(_) => "INVALID_TIMER_DURATION",
            TimerError::EmptyTag => "INVALID_TIMER_TAG",
        }
    }
}

/// Returns the trimmed tag. A planned duration of 0 means an open-ended stopwatch.
pub fn validate_start(tag: &str, planned_minutes: i32) -> Result<String, TimerError> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(TimerError::EmptyTag);
    }
    if !(0..=MAX_PLANNED_MINUTES).contains(&planned_minutes) {
        return Err(TimerError::InvalidDuration(planned_minutes));
    }
    Ok(tag.to_string())
}

fn planned_seconds(timer: &TimerSession) -> i64 {
    i64::from(timer.planned_minutes) * 60
}

/// Focused seconds so far, never negative.
pub fn elapsed_seconds(timer: &TimerSession, now: DateTime<Utc>) -> i64 {
    let raw = match timer.status {
        TimerStatus::Running => (now - timer.start_time).num_seconds() - timer.paused_seconds,
        TimerStatus::Paused => {
            let paused_at = timer.paused_at.unwrap_or(now);
            (paused_at - timer.start_time).num_seconds() - timer.paused_seconds
        }
        TimerStatus::Completed | TimerStatus::Cancelled => timer.actual_seconds.unwrap_or(0),
    };
    raw.max(0)
}

fn ensure_not_finished(timer: &TimerSession) -> Result<(), TimerError> {
    if timer.status.is_active() {
        Ok(())
    } else {
        Err(TimerError::AlreadyFinished)
    }
}

pub fn pause(timer: &TimerSession, now: DateTime<Utc>) -> Result<TimerSession, TimerError> {
    ensure_not_finished(timer)?;
    if timer.status != TimerStatus::Running {
        return Err(TimerError::NotRunning);
    }
    Ok(TimerSession {
        status: TimerStatus::Paused,
        paused_at: Some(now),
        updated_at: now,
        ..timer.clone()
    })
}

pub fn resume(timer: &TimerSession, now: DateTime<Utc>) -> Result<TimerSession, TimerError> {
    ensure_not_finished(timer)?;
    if timer.status != TimerStatus::Paused {
        return Err(TimerError::NotPaused);
    }
    Ok(TimerSession {
        status: TimerStatus::Running,
        paused_seconds: paused_total_at(timer, now),
        paused_at: None,
        updated_at: now,
        ..timer.clone()
    })
}

/// Accumulated pause including an interval still in progress.
fn paused_total_at(timer: &TimerSession, now: DateTime<Utc>) -> i64 {
    match timer.paused_at {
        Some(paused_at) if timer.status == TimerStatus::Paused => {
            timer.paused_seconds + (now - paused_at).num_seconds().max(0)
        }
        _ => timer.paused_seconds,
    }
}

fn finish(
    timer: &TimerSession,
    status: TimerStatus,
    now: DateTime<Utc>,
    note: Option<String>,
) -> Result<TimerSession, TimerError> {
    ensure_not_finished(timer)?;
    let actual = elapsed_seconds(timer, now);
    Ok(TimerSession {
        status,
        end_time: Some(now),
        actual_seconds: Some(actual),
        paused_seconds: paused_total_at(timer, now),
        paused_at: None,
        note: note.or_else(|| timer.note.clone()),
        updated_at: now,
        ..timer.clone()
    })
}

/// Actual duration is the true focused time, even past the planned duration.
pub fn complete(
    timer: &TimerSession,
    now: DateTime<Utc>,
    note: Option<String>,
) -> Result<TimerSession, TimerError> {
    finish(timer, TimerStatus::Completed, now, note)
}

pub fn cancel(
    timer: &TimerSession,
    now: DateTime<Utc>,
    note: Option<String>,
) -> Result<TimerSession, TimerError> {
    finish(timer, TimerStatus::Cancelled, now, note)
}

pub fn auto_completion_due(timer: &TimerSession, now: DateTime<Utc>) -> bool {
    timer.status == TimerStatus::Running
        && timer.planned_minutes > 0
        && elapsed_seconds(timer, now) >= planned_seconds(timer)
}

/// Completion stamped at the instant the planned time ran out, however late
/// the sweep noticed it.
pub fn auto_complete(timer: &TimerSession, now: DateTime<Utc>) -> Option<TimerSession> {
    if !auto_completion_due(timer, now) {
        return None;
    }
    let end = timer.start_time
        + Duration::seconds(timer.paused_seconds)
        + Duration::seconds(planned_seconds(timer));
    Some(TimerSession {
        status: TimerStatus::Completed,
        end_time: Some(end),
        actual_seconds: Some(planned_seconds(timer)),
        paused_at: None,
        updated_at: now,
        ..timer.clone()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerProgress {
    pub id: Uuid,
    pub tag: String,
    pub status: TimerStatus,
    pub planned_minutes: i32,
    pub start_time: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub elapsed_minutes: i64,
    pub remaining_seconds: i64,
    pub progress_percent: i64,
    pub is_overtime: bool,
    pub due_for_completion: bool,
}

/// Live read-only projection.
pub fn progress(timer: &TimerSession, now: DateTime<Utc>) -> TimerProgress {
    let elapsed = elapsed_seconds(timer, now);
    let planned = planned_seconds(timer);
    let progress_percent = if planned > 0 {
        ((elapsed as f64 / planned as f64) * 100.0).round().min(100.0) as i64
    } else {
        0
    };
    TimerProgress {
        id: timer.id,
        tag: timer.tag.clone(),
        status: timer.status,
        planned_minutes: timer.planned_minutes,
        start_time: timer.start_time,
        elapsed_seconds: elapsed,
        elapsed_minutes: elapsed / 60,
        remaining_seconds: (planned - elapsed).max(0),
        progress_percent,
        is_overtime: planned > 0 && elapsed > planned,
        due_for_completion: auto_completion_due(timer, now),
    }
}

fn actual_minutes(timer: &TimerSession) -> i64 {
    (timer.actual_seconds.unwrap_or(0) as f64 / 60.0).round() as i64
}

/// Share of the planned time actually focused, capped at 100.
pub fn efficiency(timer: &TimerSession) -> i64 {
    let actual = actual_minutes(timer);
    if actual == 0 || timer.planned_minutes == 0 {
        return 0;
    }
    let planned = i64::from(timer.planned_minutes);
    ((actual.min(planned) as f64 / planned as f64) * 100.0).round() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerHistoryEntry {
    pub id: Uuid,
    pub tag: String,
    pub planned_minutes: i32,
    pub actual_minutes: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TimerStatus,
    pub note: Option<String>,
    pub efficiency: i64,
}

impl From<&TimerSession> for TimerHistoryEntry {
    fn from(timer: &TimerSession) -> Self {
        TimerHistoryEntry {
            id: timer.id,
            tag: timer.tag.clone(),
            planned_minutes: timer.planned_minutes,
            actual_minutes: actual_minutes(timer),
            start_time: timer.start_time,
            end_time: timer.end_time,
            status: timer.status,
            note: timer.note.clone(),
            efficiency: efficiency(timer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerStats {
    pub total_timers: i64,
    pub completed_timers: i64,
    pub cancelled_timers: i64,
    pub total_focus_minutes: i64,
    pub total_focus_time: String,
    pub average_session_minutes: i64,
    pub today_focus_minutes: i64,
    pub today_focus_time: String,
    pub completion_rate: i64,
}

/// Focus time counts completed sessions only. `today_start` is the UTC
/// instant of the employee's local midnight.
pub fn stats(timers: &[TimerSession], today_start: DateTime<Utc>) -> TimerStats {
    use crate::domain::time_utils::minutes_to_duration;

    let completed: Vec<&TimerSession> = timers
        .iter()
        .filter(|t| t.status == TimerStatus::Completed)
        .collect();
    let total_timers = timers.len() as i64;
    let completed_timers = completed.len() as i64;
    let total_focus: i64 = completed.iter().map(|t| actual_minutes(t)).sum();
    let today_focus: i64 = completed
        .iter()
        .filter(|t| t.start_time >= today_start)
        .map(|t| actual_minutes(t))
        .sum();

    TimerStats {
        total_timers,
        completed_timers,
        cancelled_timers: timers
            .iter()
            .filter(|t| t.status == TimerStatus::Cancelled)
            .count() as i64,
        total_focus_minutes: total_focus,
        total_focus_time: minutes_to_duration(total_focus),
        average_session_minutes: if completed_timers > 0 {
            (total_focus as f64 / completed_timers as f64).round() as i64
        } else {
            0
        },
        today_focus_minutes: today_focus,
        today_focus_time: minutes_to_duration(today_focus),
        completion_rate: if total_timers > 0 {
            ((completed_timers as f64 / total_timers as f64) * 100.0).round() as i64
        } else {
            0
        },
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn running(planned_minutes: i32, start: DateTime<Utc>) -> TimerSession {
        TimerSession {
            id: Uuid::new_v4(),
            employee_id: Uuid::nil(),
            tag: "Deep work".to_string(),
            planned_minutes,
            start_time: start,
            end_time: None,
            status: TimerStatus::Running,
            paused_seconds: 0,
            paused_at: None,
            actual_seconds: None,
            note: None,
            created_at: start,
            updated_at: start,
        }
    }
}
