// WorkHole/backend-api/src/services/timer_service.rs
use crate::domain::time_utils::minutes_to_duration;
use crate::domain::timer::{
    self, TimerError, TimerHistoryEntry, TimerProgress, TimerStats, HISTORY_LIMIT,
};
use crate::error_handler::{is_unique_violation, ServiceError};
use crate::models::{
    Employee, NewTimerSession, StartTimerPayload, TimerSession, TimerStateChangeset, TimerStatus,
};
use crate::notify::{Mail, MailEvent, Notification, NotificationKind};
use crate::schema::timer_sessions;
use crate::services::employee_directory::{employee_with_policy, find_employee};
use crate::services::AppContext;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::json;
use uuid::Uuid;

async fn load_owned(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    timer_id: Uuid,
) -> Result<TimerSession, ServiceError> {
    timer_sessions::table
        .filter(timer_sessions::id.eq(timer_id))
        .filter(timer_sessions::employee_id.eq(employee_id))
        .select(TimerSession::as_select())
        .first::<TimerSession>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Timer with id {} not found", timer_id)))
}

/// Writes `after` only if the row still holds `before`'s state.
async fn compare_and_swap(
    conn: &mut AsyncPgConnection,
    before: &TimerSession,
    after: &TimerSession,
) -> Result<Option<TimerSession>, ServiceError> {
    Ok(diesel::update(
        timer_sessions::table
            .filter(timer_sessions::id.eq(before.id))
            .filter(timer_sessions::status.eq(before.status))
            .filter(timer_sessions::updated_at.eq(before.updated_at)),
    )
    .set(&TimerStateChangeset::from(after))
    .returning(TimerSession::as_returning())
    .get_result::<TimerSession>(conn)
    .await
    .optional()?)
}

async fn transition<F>(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    timer_id: Uuid,
    op: F,
) -> Result<TimerSession, ServiceError>
where
    F: Fn(&TimerSession) -> Result<TimerSession, TimerError>,
{
    let before = load_owned(conn, employee_id, timer_id).await?;
    let after = op(&before)?;
    if let Some(saved) = compare_and_swap(conn, &before, &after).await? {
        log::info!(
            "Timer {} for employee {}: {} -> {}",
            timer_id,
            employee_id,
            before.status,
            saved.status
        );
        return Ok(saved);
    }

    // Lost a race: report what the rule says about the state that won.
    let current = load_owned(conn, employee_id, timer_id).await?;
    log::warn!(
        "Timer {} changed concurrently (now {})",
        timer_id,
        current.status
    );
    Err(lost_race_error(&current, &op))
}

/// Error for a compare-and-swap that matched nothing. If the operation is
/// invalid for the state that won, its own error is reported; otherwise the
/// client is asked to retry.
fn lost_race_error<F>(current: &TimerSession, op: &F) -> ServiceError
where
    F: Fn(&TimerSession) -> Result<TimerSession, TimerError>,
{
    match op(current) {
        Err(e) => e.into(),
        Ok(_) => ServiceError::Conflict {
            code: "TIMER_CHANGED",
            message: "The timer was modified by another request. Please retry.".to_string(),
        },
    }
}

fn announce_completion(ctx: &AppContext, employee: &Employee, finished: &TimerSession) {
    let focused = minutes_to_duration(finished.actual_seconds.unwrap_or(0) / 60);
    ctx.notifier.dispatch(
        Notification::new(
            employee.id,
            NotificationKind::Timer,
            "Focus session completed",
            format!("'{}' is done. You focused for {}.", finished.tag, focused),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::TimerComplete,
            json!({
                "name": employee.full_name(),
                "tag": finished.tag,
                "planned": finished.planned_minutes,
                "focused": focused,
            }),
        )),
    );
}

pub async fn start(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    payload: StartTimerPayload,
    now: DateTime<Utc>,
) -> Result<TimerSession, ServiceError> {
    let tag = timer::validate_start(&payload.tag, payload.duration)?;
    let employee = find_employee(conn, employee_id).await?;

    let new_timer = NewTimerSession {
        employee_id,
        tag,
        planned_minutes: payload.duration,
        start_time: now,
        status: TimerStatus::Running,
        note: payload.note.filter(|n| !n.trim().is_empty()),
    };
    let created = match diesel::insert_into(timer_sessions::table)
        .values(&new_timer)
        .returning(TimerSession::as_returning())
        .get_result::<TimerSession>(conn)
        .await
    {
        Ok(t) => t,
        Err(e) if is_unique_violation(&e) => return Err(TimerError::AlreadyActive.into()),
        Err(e) => return Err(e.into()),
    };

    log::info!(
        "Employee {} started timer {} '{}' for {} minutes",
        employee_id,
        created.id,
        created.tag,
        created.planned_minutes
    );

    ctx.notifier.dispatch(
        Notification::new(
            employee_id,
            NotificationKind::Timer,
            "Focus session started",
            format!("'{}' started for {} minutes.", created.tag, created.planned_minutes),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::TimerStart,
            json!({
                "name": employee.full_name(),
                "tag": created.tag,
                "planned": created.planned_minutes,
            }),
        )),
    );

    Ok(created)
}

pub async fn pause(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    timer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TimerSession, ServiceError> {
    transition(conn, employee_id, timer_id, |t| timer::pause(t, now)).await
}

pub async fn resume(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    timer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TimerSession, ServiceError> {
    transition(conn, employee_id, timer_id, |t| timer::resume(t, now)).await
}

pub async fn complete(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    timer_id: Uuid,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<TimerSession, ServiceError> {
    let employee = find_employee(conn, employee_id).await?;
    let finished = transition(conn, employee_id, timer_id, |t| {
        timer::complete(t, now, note.clone())
    })
    .await?;
    announce_completion(ctx, &employee, &finished);
    Ok(finished)
}

pub async fn cancel(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    timer_id: Uuid,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<TimerSession, ServiceError> {
    transition(conn, employee_id, timer_id, |t| {
        timer::cancel(t, now, note.clone())
    })
    .await
}

async fn active_timer(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Option<TimerSession>, ServiceError> {
    Ok(timer_sessions::table
        .filter(timer_sessions::employee_id.eq(employee_id))
        .filter(
            timer_sessions::status
                .eq(TimerStatus::Running)
                .or(timer_sessions::status.eq(TimerStatus::Paused)),
        )
        .select(TimerSession::as_select())
        .first::<TimerSession>(conn)
        .await
        .optional()?)
}

/// Read-only view of the active session. Overdue sessions are reported as
/// due; completing them is the sweeper's job.
pub async fn current(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<TimerProgress>, ServiceError> {
    Ok(active_timer(conn, employee_id)
        .await?
        .map(|t| timer::progress(&t, now)))
}

pub async fn history(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Vec<TimerHistoryEntry>, ServiceError> {
    let timers = timer_sessions::table
        .filter(timer_sessions::employee_id.eq(employee_id))
        .order(timer_sessions::start_time.desc())
        .limit(HISTORY_LIMIT)
        .select(TimerSession::as_select())
        .load::<TimerSession>(conn)
        .await?;
    Ok(timers.iter().map(TimerHistoryEntry::from).collect())
}

pub async fn stats(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TimerStats, ServiceError> {
    let (_, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let today_start = policy.day_start(policy.today(now));

    let timers = timer_sessions::table
        .filter(timer_sessions::employee_id.eq(employee_id))
        .select(TimerSession::as_select())
        .load::<TimerSession>(conn)
        .await?;
    log::debug!("Computing timer stats over {} sessions for {}", timers.len(), employee_id);
    Ok(timer::stats(&timers, today_start))
}

// --- Sweeper support ---

pub async fn running_with_target(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<TimerSession>, ServiceError> {
    Ok(timer_sessions::table
        .filter(timer_sessions::status.eq(TimerStatus::Running))
        .filter(timer_sessions::planned_minutes.gt(0))
        .select(TimerSession::as_select())
        .load::<TimerSession>(conn)
        .await?)
}

/// Persists an auto-completion unless the user acted on the timer first.
/// Returns whether this call completed it.
pub async fn persist_auto_completion(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    before: &TimerSession,
    after: &TimerSession,
) -> Result<bool, ServiceError> {
    let Some(saved) = compare_and_swap(conn, before, after).await? else {
        log::debug!("Timer {} changed before auto-completion; skipped", before.id);
        return Ok(false);
    };
    log::info!(
        "Timer {} for employee {} auto-completed after {} planned minutes",
        saved.id,
        saved.employee_id,
        saved.planned_minutes
    );
    match find_employee(conn, saved.employee_id).await {
        Ok(employee) => announce_completion(ctx, &employee, &saved),
        Err(e) => log::warn!("Timer {} completed but owner lookup failed: {}", saved.id, e),
    }
    Ok(true)
}
