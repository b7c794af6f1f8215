// WorkHole/backend-api/src/services/report_service.rs
use crate::domain::reporting::{
    attendance_dashboard as build_attendance_dashboard, attendance_stats as build_attendance_stats,
    home_dashboard as build_home_dashboard, overtime_window_start, AttendanceDashboard,
    AttendanceInputs, AttendanceStats, DashboardWindow, HomeDashboard,
};
use crate::error_handler::ServiceError;
use crate::models::{AttendanceDay, BreakSession, PaginationParams};
use crate::schema::{attendance_days, break_sessions};
use crate::services::attendance_service::days_between;
use crate::services::employee_directory::employee_with_policy;
use crate::services::leave_service::latest_request;
use crate::services::AppContext;
use chrono::{DateTime, Datelike, Duration, Months, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

pub async fn attendance_dashboard(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    filter: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AttendanceDashboard, ServiceError> {
    let window = DashboardWindow::from_filter(filter)?;
    let (_, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let today = policy.today(now);

    // The overtime window is the widest one the dashboard looks at.
    let earliest = overtime_window_start(today).min(window.first_day(today));
    let recent_days = days_between(conn, employee_id, earliest, today).await?;

    let (day_start, day_end) = policy.day_bounds(today);
    let today_breaks = break_sessions::table
        .filter(break_sessions::employee_id.eq(employee_id))
        .filter(break_sessions::end_time.is_not_null())
        .filter(break_sessions::start_time.ge(day_start))
        .filter(break_sessions::start_time.lt(day_end))
        .select(BreakSession::as_select())
        .load::<BreakSession>(conn)
        .await?;

    let inputs = AttendanceInputs {
        today,
        shift_hours: policy.hours,
        today_row: recent_days.iter().find(|d| d.work_date == today),
        recent_days: &recent_days,
        today_breaks: &today_breaks,
    };
    Ok(build_attendance_dashboard(window, &inputs))
}

/// Counts over the employee's current month with one page of its rows,
/// newest first.
pub async fn attendance_stats(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    params: PaginationParams,
    now: DateTime<Utc>,
) -> Result<AttendanceStats, ServiceError> {
    let params = params.normalized();
    let (_, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let today = policy.today(now);
    let month_start = today.with_day(1).unwrap_or(today);

    let month = attendance_days::table
        .filter(attendance_days::employee_id.eq(employee_id))
        .filter(attendance_days::work_date.ge(month_start))
        .filter(attendance_days::work_date.le(today))
        .order(attendance_days::work_date.desc())
        .select(AttendanceDay::as_select())
        .load::<AttendanceDay>(conn)
        .await?;

    let start = usize::try_from(params.offset()).unwrap_or(usize::MAX).min(month.len());
    let end = start
        .saturating_add(usize::try_from(params.per_page).unwrap_or(0))
        .min(month.len());
    Ok(build_attendance_stats(&month, &month[start..end], params))
}

pub async fn home_dashboard(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    now: DateTime<Utc>,
) -> Result<HomeDashboard, ServiceError> {
    let (_, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let today = policy.today(now);
    let month_start = today.with_day(1).unwrap_or(today);

    // Heat-chart weeks spill into neighbouring months by up to six days.
    let from = month_start - Duration::days(6);
    let to = month_start
        .checked_add_months(Months::new(1))
        .unwrap_or(today)
        + Duration::days(6);
    let days = days_between(conn, employee_id, from, to).await?;
    let latest_leave = latest_request(conn, employee_id).await?;

    Ok(build_home_dashboard(
        today,
        ctx.settings.heat_chart_week_start,
        days.iter().find(|d| d.work_date == today),
        latest_leave.as_ref(),
        &days,
    ))
}
