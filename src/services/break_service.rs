// WorkHole/backend-api/src/services/break_service.rs
use crate::domain::breaks::{
    close_break, history_entry, summarize_usage, validate_allotment, AvailableBreakFilters,
    BreakAlert, BreakDashboard, BreakError, BreakHistoryEntry, BreakHistoryFilter, BreakSort,
};
use crate::domain::time_utils::format_break_minutes;
use crate::error_handler::{is_unique_violation, ServiceError};
use crate::models::{
    BreakSession, BreakType, CloseBreakChangeset, CreateBreakTypePayload, NewBreakSession,
    NewBreakType, PaginatedResponse, PaginationParams, StartBreakPayload,
    UpdateBreakTypeChangeset, UpdateBreakTypePayload,
};
use crate::notify::{Mail, MailEvent, Notification, NotificationKind};
use crate::schema::{attendance_days, break_sessions, break_types};
use crate::services::employee_directory::employee_with_policy;
use crate::services::AppContext;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct BreakHistoryPage {
    #[serde(flatten)]
    pub page: PaginatedResponse<BreakHistoryEntry>,
    pub available_filters: AvailableBreakFilters,
}

// --- Break type catalog ---

pub async fn list_active_types(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<BreakType>, ServiceError> {
    Ok(break_types::table
        .filter(break_types::is_active.eq(true))
        .order(break_types::name.asc())
        .select(BreakType::as_select())
        .load::<BreakType>(conn)
        .await?)
}

fn clean_type_name(name: &str) -> Result<String, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::bad_request("break type name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

pub async fn create_break_type(
    conn: &mut AsyncPgConnection,
    payload: CreateBreakTypePayload,
) -> Result<BreakType, ServiceError> {
    let new_type = NewBreakType {
        name: clean_type_name(&payload.name)?,
        duration_minutes: validate_allotment(payload.duration_minutes)?,
        is_active: payload.is_active.unwrap_or(true),
    };

    let created = diesel::insert_into(break_types::table)
        .values(&new_type)
        .returning(BreakType::as_returning())
        .get_result::<BreakType>(conn)
        .await?;
    log::info!(
        "Break type '{}' created ({} minutes)",
        created.name,
        created.duration_minutes
    );
    Ok(created)
}

pub async fn update_break_type(
    conn: &mut AsyncPgConnection,
    type_id: Uuid,
    payload: UpdateBreakTypePayload,
    now: DateTime<Utc>,
) -> Result<BreakType, ServiceError> {
    let changes = UpdateBreakTypeChangeset {
        name: payload.name.as_deref().map(clean_type_name).transpose()?,
        duration_minutes: payload.duration_minutes.map(validate_allotment).transpose()?,
        is_active: payload.is_active,
        updated_at: Some(now),
    };

    diesel::update(break_types::table.find(type_id))
        .set(&changes)
        .returning(BreakType::as_returning())
        .get_result::<BreakType>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Break type with id {} not found", type_id)))
}

pub async fn delete_break_type(
    conn: &mut AsyncPgConnection,
    type_id: Uuid,
) -> Result<(), ServiceError> {
    let deleted = diesel::delete(break_types::table.find(type_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ServiceError::NotFound(format!(
            "Break type with id {} not found",
            type_id
        )));
    }
    log::info!("Break type {} deleted", type_id);
    Ok(())
}

/// Allotment for a session's type, inactive types included. A type deleted
/// while a break was running yields `None`.
async fn allotment_for(
    conn: &mut AsyncPgConnection,
    type_name: &str,
) -> Result<Option<i32>, ServiceError> {
    Ok(break_types::table
        .filter(break_types::name.eq(type_name))
        .select(break_types::duration_minutes)
        .first::<i32>(conn)
        .await
        .optional()?)
}

// --- Sessions ---

pub async fn find_open_session(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Option<BreakSession>, ServiceError> {
    Ok(break_sessions::table
        .filter(break_sessions::employee_id.eq(employee_id))
        .filter(break_sessions::end_time.is_null())
        .select(BreakSession::as_select())
        .first::<BreakSession>(conn)
        .await
        .optional()?)
}

pub async fn start_break(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    payload: StartBreakPayload,
    now: DateTime<Utc>,
) -> Result<BreakSession, ServiceError> {
    let (employee, _) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let type_name = payload.break_type.trim();

    let break_type = break_types::table
        .filter(break_types::name.eq(type_name))
        .filter(break_types::is_active.eq(true))
        .select(BreakType::as_select())
        .first::<BreakType>(conn)
        .await
        .optional()?
        .ok_or_else(|| BreakError::UnknownBreakType(type_name.to_string()))?;

    let new_session = NewBreakSession {
        employee_id,
        break_type: break_type.name.clone(),
        start_time: now,
    };
    // The partial unique index on open sessions decides concurrent starts.
    let session = match diesel::insert_into(break_sessions::table)
        .values(&new_session)
        .returning(BreakSession::as_returning())
        .get_result::<BreakSession>(conn)
        .await
    {
        Ok(session) => session,
        Err(e) if is_unique_violation(&e) => return Err(BreakError::BreakAlreadyActive.into()),
        Err(e) => return Err(e.into()),
    };

    log::info!(
        "Employee {} started a {} break ({} minutes allotted)",
        employee_id,
        break_type.name,
        break_type.duration_minutes
    );

    ctx.notifier.dispatch(
        Notification::new(
            employee_id,
            NotificationKind::Break,
            "Break started",
            format!(
                "Your {} break has started. You have {} minutes.",
                break_type.name, break_type.duration_minutes
            ),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::BreakStart,
            json!({
                "name": employee.full_name(),
                "breakType": break_type.name,
                "duration": break_type.duration_minutes,
            }),
        )),
    );

    Ok(session)
}

async fn close_open_session(
    conn: &mut AsyncPgConnection,
    session_id: Uuid,
    changes: &CloseBreakChangeset,
) -> Result<BreakSession, ServiceError> {
    diesel::update(
        break_sessions::table
            .filter(break_sessions::id.eq(session_id))
            .filter(break_sessions::end_time.is_null()),
    )
    .set(changes)
    .returning(BreakSession::as_returning())
    .get_result::<BreakSession>(conn)
    .await
    .optional()?
    .ok_or_else(|| BreakError::NoOpenBreak.into())
}

/// Returns whether a day row existed to receive the minutes.
async fn add_break_minutes(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    work_date: NaiveDate,
    minutes: i32,
    now: DateTime<Utc>,
) -> Result<bool, ServiceError> {
    let touched = diesel::update(
        attendance_days::table
            .filter(attendance_days::employee_id.eq(employee_id))
            .filter(attendance_days::work_date.eq(work_date)),
    )
    .set((
        attendance_days::break_minutes.eq(attendance_days::break_minutes + minutes),
        attendance_days::updated_at.eq(now),
    ))
    .execute(conn)
    .await?;
    Ok(touched > 0)
}

pub async fn stop_break(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    now: DateTime<Utc>,
) -> Result<BreakSession, ServiceError> {
    let (employee, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let session = find_open_session(conn, employee_id)
        .await?
        .ok_or(BreakError::NoOpenBreak)?;

    let allotted = match allotment_for(conn, &session.break_type).await? {
        Some(minutes) => minutes,
        None => {
            log::warn!(
                "Break type '{}' no longer exists; session {} cannot exceed",
                session.break_type,
                session.id
            );
            i32::MAX
        }
    };
    let outcome = close_break(&session, allotted, now)?;

    let changes = CloseBreakChangeset {
        end_time: Some(outcome.end_time),
        duration_minutes: Some(outcome.duration_minutes),
        exceeded: outcome.exceeded,
        updated_at: now,
    };
    let break_day = policy.today(session.start_time);
    let session_id = session.id;
    let minutes = outcome.duration_minutes;
    // Closing the session and adding its minutes to the day commit together.
    let closed = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let closed = close_open_session(conn, session_id, &changes).await?;
                let rolled_up =
                    add_break_minutes(conn, employee_id, break_day, minutes, now).await?;
                if !rolled_up {
                    log::debug!(
                        "No attendance day {} for employee {}; break minutes not rolled up",
                        break_day,
                        employee_id
                    );
                }
                Ok(closed)
            }
            .scope_boxed()
        })
        .await?;

    log::info!(
        "Employee {} ended a {} break after {} minutes (exceeded: {})",
        employee_id,
        closed.break_type,
        outcome.duration_minutes,
        outcome.exceeded
    );

    let taken = format_break_minutes(i64::from(outcome.duration_minutes));
    let message = if outcome.exceeded {
        format!("Your {} break lasted {}, over the allowed time.", closed.break_type, taken)
    } else {
        format!("Your {} break lasted {}.", closed.break_type, taken)
    };
    ctx.notifier.dispatch(
        Notification::new(employee_id, NotificationKind::Break, "Break ended", message),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::BreakEnd,
            json!({
                "name": employee.full_name(),
                "breakType": closed.break_type,
                "duration": taken,
                "exceeded": outcome.exceeded,
            }),
        )),
    );

    Ok(closed)
}

/// Dashboard over today's and the trailing week's closed breaks.
pub async fn break_dashboard(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    now: DateTime<Utc>,
) -> Result<BreakDashboard, ServiceError> {
    let (_, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let today = policy.today(now);
    let (today_start, today_end) = policy.day_bounds(today);
    let week_start = policy.day_start(today - Duration::days(6));

    let last_week = break_sessions::table
        .filter(break_sessions::employee_id.eq(employee_id))
        .filter(break_sessions::end_time.is_not_null())
        .filter(break_sessions::start_time.ge(week_start))
        .filter(break_sessions::start_time.lt(today_end))
        .order(break_sessions::start_time.asc())
        .select(BreakSession::as_select())
        .load::<BreakSession>(conn)
        .await?;
    let todays: Vec<BreakSession> = last_week
        .iter()
        .filter(|s| s.start_time >= today_start)
        .cloned()
        .collect();
    let types = list_active_types(conn).await?;

    log::debug!(
        "Break dashboard for {}: {} sessions this week, {} today",
        employee_id,
        last_week.len(),
        todays.len()
    );
    Ok(summarize_usage(&types, &todays, &last_week).into())
}

/// Break sessions of `employee_id`, narrowed and ordered by `filter`, with
/// the types that employee has used for the filter picker.
pub async fn history(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    filter: BreakHistoryFilter,
    params: PaginationParams,
) -> Result<BreakHistoryPage, ServiceError> {
    let params = params.normalized();
    let (_, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let day = filter.date.map(|date| policy.day_bounds(date));

    let total_items = filtered_sessions(employee_id, day, filter.break_type.as_deref())
        .count()
        .get_result::<i64>(conn)
        .await?;

    let query = filtered_sessions(employee_id, day, filter.break_type.as_deref());
    let query = match filter.sort {
        BreakSort::Newest => query.order(break_sessions::start_time.desc()),
        BreakSort::Oldest => query.order(break_sessions::start_time.asc()),
        BreakSort::Longest => query.order((
            break_sessions::duration_minutes.desc(),
            break_sessions::start_time.desc(),
        )),
        BreakSort::Shortest => query.order((
            break_sessions::duration_minutes.asc(),
            break_sessions::start_time.desc(),
        )),
    };
    let sessions = query
        .limit(params.per_page)
        .offset(params.offset())
        .select(BreakSession::as_select())
        .load::<BreakSession>(conn)
        .await?;

    let used_types = break_sessions::table
        .filter(break_sessions::employee_id.eq(employee_id))
        .select(break_sessions::break_type)
        .distinct()
        .order(break_sessions::break_type.asc())
        .load::<String>(conn)
        .await?;

    log::debug!(
        "Break history for {}: {} of {} sessions ({:?})",
        employee_id,
        sessions.len(),
        total_items,
        filter
    );
    let entries = sessions
        .iter()
        .map(|s| history_entry(s, policy.offset))
        .collect();
    Ok(BreakHistoryPage {
        page: PaginatedResponse::new(entries, total_items, params),
        available_filters: AvailableBreakFilters::new(used_types),
    })
}

fn filtered_sessions<'a>(
    employee_id: Uuid,
    day: Option<(DateTime<Utc>, DateTime<Utc>)>,
    break_type: Option<&'a str>,
) -> break_sessions::BoxedQuery<'a, Pg> {
    let mut query = break_sessions::table
        .filter(break_sessions::employee_id.eq(employee_id))
        .into_boxed();
    if let Some((start, end)) = day {
        query = query
            .filter(break_sessions::start_time.ge(start))
            .filter(break_sessions::start_time.lt(end));
    }
    if let Some(name) = break_type {
        query = query.filter(break_sessions::break_type.eq(name));
    }
    query
}

/// Number of breaks open right now across all employees.
pub async fn active_count(conn: &mut AsyncPgConnection) -> Result<i64, ServiceError> {
    Ok(break_sessions::table
        .filter(break_sessions::end_time.is_null())
        .count()
        .get_result::<i64>(conn)
        .await?)
}

// --- Sweeper support ---

/// Every open session paired with its type's allotment. Sessions whose type
/// has since been deleted are left out.
pub async fn open_sessions_with_allotments(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<(BreakSession, i32)>, ServiceError> {
    let open = break_sessions::table
        .filter(break_sessions::end_time.is_null())
        .select(BreakSession::as_select())
        .load::<BreakSession>(conn)
        .await?;
    if open.is_empty() {
        return Ok(Vec::new());
    }

    let allotments: HashMap<String, i32> = break_types::table
        .select((break_types::name, break_types::duration_minutes))
        .load::<(String, i32)>(conn)
        .await?
        .into_iter()
        .collect();

    Ok(open
        .into_iter()
        .filter_map(|session| {
            let minutes = allotments.get(&session.break_type).copied()?;
            Some((session, minutes))
        })
        .collect())
}

/// Claims an alert for delivery. Only the caller whose update flips the
/// column from NULL gets `true`.
pub async fn mark_alert_sent(
    conn: &mut AsyncPgConnection,
    session_id: Uuid,
    alert: BreakAlert,
    now: DateTime<Utc>,
) -> Result<bool, ServiceError> {
    let open_session = break_sessions::table
        .filter(break_sessions::id.eq(session_id))
        .filter(break_sessions::end_time.is_null());

    let claimed = match alert {
        BreakAlert::Warning => {
            diesel::update(open_session.filter(break_sessions::warning_sent_at.is_null()))
                .set(break_sessions::warning_sent_at.eq(Some(now)))
                .execute(conn)
                .await?
        }
        BreakAlert::Exceeded => {
            diesel::update(open_session.filter(break_sessions::exceeded_sent_at.is_null()))
                .set(break_sessions::exceeded_sent_at.eq(Some(now)))
                .execute(conn)
                .await?
        }
    };
    Ok(claimed == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geofence::Coordinates;
    use crate::services::attendance_service::{clock_in, find_day};
    use crate::test_support::{insert_break_type, insert_employee, test_connection, test_context};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn take(name: &str) -> StartBreakPayload {
        StartBreakPayload {
            break_type: name.to_string(),
        }
    }

    fn first_page() -> PaginationParams {
        PaginationParams {
            page: 1,
            per_page: 8,
        }
    }

    #[actix_web::test]
    async fn stopped_breaks_add_up_on_the_attendance_day() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Ada").await;
        insert_break_type(&mut conn, "Lunch", 30).await;
        clock_in(&mut conn, &ctx, employee.id, Coordinates::new(0.0, 0.0), at(9, 0))
            .await
            .unwrap();

        start_break(&mut conn, &ctx, employee.id, take("Lunch"), at(12, 0)).await.unwrap();
        let closed = stop_break(&mut conn, &ctx, employee.id, at(12, 20)).await.unwrap();
        assert_eq!(closed.duration_minutes, Some(20));
        assert!(!closed.exceeded);

        start_break(&mut conn, &ctx, employee.id, take("Lunch"), at(15, 0)).await.unwrap();
        stop_break(&mut conn, &ctx, employee.id, at(15, 5)).await.unwrap();

        let day = find_day(&mut conn, employee.id, at(0, 0).date_naive())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(day.break_minutes, 25);

        let err = stop_break(&mut conn, &ctx, employee.id, at(15, 10)).await.unwrap_err();
        assert_eq!(err.code(), "NO_OPEN_BREAK");
    }

    #[actix_web::test]
    async fn break_without_a_day_row_still_closes() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Grace").await;
        insert_break_type(&mut conn, "Coffee", 10).await;

        start_break(&mut conn, &ctx, employee.id, take("Coffee"), at(10, 0)).await.unwrap();
        let closed = stop_break(&mut conn, &ctx, employee.id, at(10, 12)).await.unwrap();
        assert!(closed.exceeded);
        assert!(find_day(&mut conn, employee.id, at(0, 0).date_naive())
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn history_filters_sorts_and_lists_used_types() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Linus").await;
        insert_break_type(&mut conn, "Coffee", 15).await;
        insert_break_type(&mut conn, "Lunch", 45).await;

        start_break(&mut conn, &ctx, employee.id, take("Coffee"), at(10, 0)).await.unwrap();
        stop_break(&mut conn, &ctx, employee.id, at(10, 10)).await.unwrap();
        start_break(&mut conn, &ctx, employee.id, take("Lunch"), at(12, 0)).await.unwrap();
        stop_break(&mut conn, &ctx, employee.id, at(12, 30)).await.unwrap();
        start_break(&mut conn, &ctx, employee.id, take("Coffee"), at(15, 0)).await.unwrap();

        let newest = BreakHistoryFilter::default();
        let newest = history(&mut conn, &ctx, employee.id, newest, first_page())
            .await
            .unwrap();
        assert_eq!(newest.page.total_items, 3);
        assert_eq!(newest.page.items[0].duration, "In progress");
        assert_eq!(newest.available_filters.break_types, vec!["Coffee", "Lunch"]);

        let oldest = BreakHistoryFilter::parse(Some("oldest"), None, None).unwrap();
        let page = history(&mut conn, &ctx, employee.id, oldest, first_page()).await.unwrap();
        assert_eq!(page.page.items[0].start_time, at(10, 0));

        let lunches = BreakHistoryFilter::parse(None, Some("2024-03-04"), Some("Lunch")).unwrap();
        let page = history(&mut conn, &ctx, employee.id, lunches, first_page()).await.unwrap();
        assert_eq!(page.page.total_items, 1);
        assert_eq!(page.page.items[0].duration, "30 min");

        let next_day = BreakHistoryFilter::parse(None, Some("2024-03-05"), None).unwrap();
        let page = history(&mut conn, &ctx, employee.id, next_day, first_page()).await.unwrap();
        assert_eq!(page.page.total_items, 0);
        assert!(page.page.items.is_empty());

        assert_eq!(active_count(&mut conn).await.unwrap(), 1);
    }
}
