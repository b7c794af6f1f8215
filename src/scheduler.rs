// WorkHole/backend-api/src/scheduler.rs
//! Periodic sweep over stored state: break alerts that have come due and
//! running timers whose planned time has run out. Every write is a
//! conditional update, so overlapping sweeps (or several instances) deliver
//! each alert at most once and complete each timer once.

use crate::db::DbPool;
use crate::domain::breaks::{due_alert, BreakAlert};
use crate::domain::timer::auto_complete;
use crate::error_handler::ServiceError;
use crate::models::{BreakSession, Employee, TimerSession};
use crate::notify::{Mail, MailEvent, Notification, NotificationKind};
use crate::services::employee_directory::find_employee;
use crate::services::{break_service, timer_service, AppContext};
use chrono::{DateTime, Utc};
use diesel_async::AsyncPgConnection;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub warnings_sent: usize,
    pub exceeded_sent: usize,
    pub timers_completed: usize,
    pub failures: usize,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        *self == SweepReport::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DueAlert<'a> {
    pub session: &'a BreakSession,
    pub allotted_minutes: i32,
    pub alert: BreakAlert,
}

pub fn pending_alerts(sessions: &[(BreakSession, i32)], now: DateTime<Utc>) -> Vec<DueAlert<'_>> {
    sessions
        .iter()
        .filter_map(|(session, allotted)| {
            due_alert(session, *allotted, now).map(|alert| DueAlert {
                session,
                allotted_minutes: *allotted,
                alert,
            })
        })
        .collect()
}

/// Pairs each overdue timer with its completed form.
pub fn timers_to_complete(
    timers: &[TimerSession],
    now: DateTime<Utc>,
) -> Vec<(&TimerSession, TimerSession)> {
    timers
        .iter()
        .filter_map(|t| auto_complete(t, now).map(|done| (t, done)))
        .collect()
}

fn deliver_alert(ctx: &AppContext, employee: &Employee, due: &DueAlert<'_>) {
    let break_type = &due.session.break_type;

    let (title, message, event) = match due.alert {
        BreakAlert::Warning => (
            "Break ending soon",
            format!("Your {} break ends in 1 minute.", break_type),
            MailEvent::BreakWarning,
        ),
        BreakAlert::Exceeded => (
            "Break time exceeded",
            format!(
                "Your {} break has passed its {} minutes.",
                break_type, due.allotted_minutes
            ),
            MailEvent::BreakExceeded,
        ),
    };

    ctx.notifier.dispatch(
        Notification::new(employee.id, NotificationKind::Break, title, message),
        Some(Mail::new(
            employee.email.clone(),
            event,
            json!({
                "name": employee.full_name(),
                "breakType": break_type,
                "duration": due.allotted_minutes,
                "startTime": due.session.start_time,
            }),
        )),
    );
}

async fn sweep_breaks(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) -> Result<(), ServiceError> {
    let open = break_service::open_sessions_with_allotments(conn).await?;
    for due in pending_alerts(&open, now) {
        // Resolve the recipient before claiming, so a failed lookup leaves the
        // alert due for the next sweep.
        let employee = match find_employee(conn, due.session.employee_id).await {
            Ok(employee) => employee,
            Err(e) => {
                log::warn!("Break alert for session {} postponed: {}", due.session.id, e);
                report.failures += 1;
                continue;
            }
        };
        // Only the sweep that flips the marker delivers.
        if !break_service::mark_alert_sent(conn, due.session.id, due.alert, now).await? {
            continue;
        }
        deliver_alert(ctx, &employee, &due);
        match due.alert {
            BreakAlert::Warning => report.warnings_sent += 1,
            BreakAlert::Exceeded => report.exceeded_sent += 1,
        }
    }
    Ok(())
}

async fn sweep_timers(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) -> Result<(), ServiceError> {
    let running = timer_service::running_with_target(conn).await?;
    for (before, after) in timers_to_complete(&running, now) {
        match timer_service::persist_auto_completion(conn, ctx, before, &after).await {
            Ok(true) => report.timers_completed += 1,
            Ok(false) => {}
            Err(e) => {
                log::warn!("Auto-completion of timer {} failed: {}", before.id, e);
                report.failures += 1;
            }
        }
    }
    Ok(())
}

pub async fn sweep_once(
    pool: &DbPool,
    ctx: &AppContext,
    now: DateTime<Utc>,
) -> Result<SweepReport, ServiceError> {
    let mut conn = pool.get().await?;
    Ok(sweep_with(&mut conn, ctx, now).await)
}

/// One sweep over an open connection. A failing half is logged and counted;
/// the other half still runs.
pub async fn sweep_with(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();

    if let Err(e) = sweep_breaks(conn, ctx, now, &mut report).await {
        log::error!("Break sweep failed: {}", e);
        report.failures += 1;
    }
    if let Err(e) = sweep_timers(conn, ctx, now, &mut report).await {
        log::error!("Timer sweep failed: {}", e);
        report.failures += 1;
    }
    report
}

pub fn spawn_sweeper(pool: DbPool, ctx: Arc<AppContext>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("Sweeper running every {:?}", every);

        loop {
            ticker.tick().await;
            match sweep_once(&pool, &ctx, Utc::now()).await {
                Ok(report) if report.is_idle() => log::debug!("Sweep found nothing due"),
                Ok(report) => log::info!("Sweep finished: {:?}", report),
                Err(e) => log::error!("Sweep could not start: {}", e),
            }
        }
    })
}
