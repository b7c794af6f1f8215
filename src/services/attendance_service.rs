// WorkHole/backend-api/src/services/attendance_service.rs
use crate::domain::attendance::{
    offset_from_minutes, plan_clock_in, plan_clock_out, AttendanceError, ClockInPlan, ShiftPolicy,
};
use crate::domain::geofence::{classify, Coordinates, GeofenceVerdict};
use crate::domain::reporting::{team_attendance, TeamAttendanceEntry};
use crate::domain::time_utils::{format_clock, minutes_to_duration};
use crate::error_handler::ServiceError;
use crate::models::{
    AttendanceDay, ClockInChangeset, ClockOutChangeset, DeviceEventPayload, DeviceEventType,
    Employee, NewAttendanceDay, NewDeviceEvent, WorkLocation,
};
use crate::notify::{Mail, MailEvent, Notification, NotificationKind};
use crate::schema::{attendance_days, device_events, employees};
use crate::services::employee_directory::employee_with_policy;
use crate::services::AppContext;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ClockResponse {
    pub record: AttendanceDay,
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceEventOutcome {
    pub duplicate: bool,
    pub record: Option<AttendanceDay>,
}

pub async fn find_day(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    date: NaiveDate,
) -> Result<Option<AttendanceDay>, ServiceError> {
    Ok(attendance_days::table
        .filter(attendance_days::employee_id.eq(employee_id))
        .filter(attendance_days::work_date.eq(date))
        .select(AttendanceDay::as_select())
        .first::<AttendanceDay>(conn)
        .await
        .optional()?)
}

fn office_name_for(ctx: &AppContext, location: WorkLocation) -> Option<String> {
    match location {
        WorkLocation::Office => ctx.office.current().map(|o| o.name.clone()),
        WorkLocation::Home => None,
    }
}

/// Inserts today's row, or fills the clock-in of a placeholder row. Both
/// statements only succeed when no clock-in exists yet, so of two racing
/// requests exactly one wins.
async fn write_clock_in(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    plan: &ClockInPlan,
    office_name: Option<String>,
    now: DateTime<Utc>,
) -> Result<AttendanceDay, ServiceError> {
    let new_day = NewAttendanceDay {
        employee_id,
        work_date: plan.work_date,
        day_name: plan.day_name.clone(),
        clock_in: Some(plan.clock_in),
        status: plan.status,
        location: plan.location,
        office_name: office_name.clone(),
    };

    let inserted = diesel::insert_into(attendance_days::table)
        .values(&new_day)
        .on_conflict((attendance_days::employee_id, attendance_days::work_date))
        .do_nothing()
        .returning(AttendanceDay::as_returning())
        .get_result::<AttendanceDay>(conn)
        .await
        .optional()?;
    if let Some(day) = inserted {
        return Ok(day);
    }

    let changes = ClockInChangeset {
        day_name: plan.day_name.clone(),
        clock_in: Some(plan.clock_in),
        status: plan.status,
        location: plan.location,
        office_name: Some(office_name),
        updated_at: now,
    };
    diesel::update(
        attendance_days::table
            .filter(attendance_days::employee_id.eq(employee_id))
            .filter(attendance_days::work_date.eq(plan.work_date))
            .filter(attendance_days::clock_in.is_null()),
    )
    .set(&changes)
    .returning(AttendanceDay::as_returning())
    .get_result::<AttendanceDay>(conn)
    .await
    .optional()?
    .ok_or_else(|| AttendanceError::AlreadyClockedIn.into())
}

async fn record_clock_in(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee: &Employee,
    policy: &ShiftPolicy,
    verdict: GeofenceVerdict,
    now: DateTime<Utc>,
) -> Result<ClockResponse, ServiceError> {
    let today = policy.today(now);
    let existing = find_day(conn, employee.id, today).await?;
    let plan = plan_clock_in(existing.as_ref(), policy, now, verdict)?;
    let office_name = office_name_for(ctx, plan.location);

    let record = write_clock_in(conn, employee.id, &plan, office_name, now).await?;
    log::info!(
        "Employee {} clocked in at {} ({}, {})",
        employee.id,
        format_clock(plan.clock_in),
        record.status,
        record.location
    );
    Ok(ClockResponse {
        record,
        warning: plan.warning,
    })
}

fn announce_clock_in(ctx: &AppContext, employee: &Employee, record: &AttendanceDay) {
    let clock_in_text = record.clock_in.map(format_clock).unwrap_or_default();
    ctx.notifier.dispatch(
        Notification::new(
            employee.id,
            NotificationKind::Attendance,
            "Clocked in",
            format!("You clocked in at {} ({}).", clock_in_text, record.location),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::ClockIn,
            json!({
                "name": employee.full_name(),
                "time": clock_in_text,
                "date": record.work_date,
                "status": record.status,
                "location": record.location,
            }),
        )),
    );
}

async fn record_clock_out(
    conn: &mut AsyncPgConnection,
    employee: &Employee,
    policy: &ShiftPolicy,
    verdict: GeofenceVerdict,
    now: DateTime<Utc>,
) -> Result<ClockResponse, ServiceError> {
    let today = policy.today(now);
    let existing = find_day(conn, employee.id, today).await?;
    let plan = plan_clock_out(existing.as_ref(), policy, now, verdict)?;

    let changes = ClockOutChangeset {
        clock_out: Some(plan.clock_out),
        work_minutes: Some(plan.work_minutes),
        is_overtime: plan.is_overtime,
        location: plan.location,
        updated_at: now,
    };
    let record = diesel::update(
        attendance_days::table
            .filter(attendance_days::employee_id.eq(employee.id))
            .filter(attendance_days::work_date.eq(today))
            .filter(attendance_days::clock_in.is_not_null())
            .filter(attendance_days::clock_out.is_null()),
    )
    .set(&changes)
    .returning(AttendanceDay::as_returning())
    .get_result::<AttendanceDay>(conn)
    .await
    .optional()?
    .ok_or(AttendanceError::AlreadyClockedOut)?;

    log::info!(
        "Employee {} clocked out at {} after {} minutes (overtime: {})",
        employee.id,
        format_clock(plan.clock_out),
        plan.work_minutes,
        plan.is_overtime
    );
    Ok(ClockResponse {
        record,
        warning: plan.warning,
    })
}

fn announce_clock_out(ctx: &AppContext, employee: &Employee, record: &AttendanceDay) {
    let clock_out_text = record.clock_out.map(format_clock).unwrap_or_default();
    let worked = minutes_to_duration(i64::from(record.work_minutes.unwrap_or(0)));
    ctx.notifier.dispatch(
        Notification::new(
            employee.id,
            NotificationKind::Attendance,
            "Clocked out",
            format!("You clocked out at {}. Worked {}.", clock_out_text, worked),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::ClockOut,
            json!({
                "name": employee.full_name(),
                "time": clock_out_text,
                "worked": worked,
                "overtime": record.is_overtime,
            }),
        )),
    );
}

pub async fn clock_in(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    position: Coordinates,
    now: DateTime<Utc>,
) -> Result<ClockResponse, ServiceError> {
    let (employee, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let verdict = classify(position, ctx.geofence().as_ref());
    let response = record_clock_in(conn, ctx, &employee, &policy, verdict, now).await?;
    announce_clock_in(ctx, &employee, &response.record);
    Ok(response)
}

pub async fn clock_out(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    position: Coordinates,
    now: DateTime<Utc>,
) -> Result<ClockResponse, ServiceError> {
    let (employee, policy) = employee_with_policy(conn, &ctx.settings, employee_id).await?;
    let verdict = classify(position, ctx.geofence().as_ref());
    let response = record_clock_out(conn, &employee, &policy, verdict, now).await?;
    announce_clock_out(ctx, &employee, &response.record);
    Ok(response)
}

fn derived_idempotency_key(payload: &DeviceEventPayload) -> String {
    format!(
        "{}:{}:{}:{}",
        payload.camera_id,
        payload.employee_id,
        payload.event_type,
        payload.timestamp.timestamp_millis()
    )
}

/// A camera on the premises saw the employee. The event's own timestamp is
/// the clock time and the location is always the office. The idempotency
/// key and the attendance write commit together: a repeat is acknowledged
/// without re-applying, and a rejected event leaves no key behind.
pub async fn process_device_event(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    payload: DeviceEventPayload,
    idempotency_key: Option<String>,
) -> Result<DeviceEventOutcome, ServiceError> {
    if payload.camera_id.trim().is_empty() {
        return Err(ServiceError::bad_request("camera_id cannot be empty"));
    }
    let key = idempotency_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| derived_idempotency_key(&payload));
    let (employee, policy) = employee_with_policy(conn, &ctx.settings, payload.employee_id).await?;

    log::info!(
        "Device event {} from camera {}: {} for employee {} (confidence {:?})",
        key,
        payload.camera_id,
        payload.event_type,
        employee.id,
        payload.confidence
    );

    let event = NewDeviceEvent {
        idempotency_key: key.clone(),
        employee_id: employee.id,
        event_type: payload.event_type,
        camera_id: payload.camera_id.clone(),
        occurred_at: payload.timestamp,
    };
    let (employee_ref, policy_ref) = (&employee, &policy);
    let on_premises = GeofenceVerdict {
        location: WorkLocation::Office,
        warning: None,
        distance_meters: None,
    };

    let applied = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let recorded = diesel::insert_into(device_events::table)
                    .values(&event)
                    .on_conflict(device_events::idempotency_key)
                    .do_nothing()
                    .execute(conn)
                    .await?;
                if recorded == 0 {
                    return Ok(None);
                }
                let at = event.occurred_at;
                let response = match event.event_type {
                    DeviceEventType::ClockIn => {
                        record_clock_in(conn, ctx, employee_ref, policy_ref, on_premises, at)
                            .await?
                    }
                    DeviceEventType::ClockOut => {
                        record_clock_out(conn, employee_ref, policy_ref, on_premises, at).await?
                    }
                };
                Ok(Some(response))
            }
            .scope_boxed()
        })
        .await;

    match applied {
        Ok(Some(response)) => {
            match payload.event_type {
                DeviceEventType::ClockIn => announce_clock_in(ctx, &employee, &response.record),
                DeviceEventType::ClockOut => announce_clock_out(ctx, &employee, &response.record),
            }
            Ok(DeviceEventOutcome {
                duplicate: false,
                record: Some(response.record),
            })
        }
        Ok(None) => {
            log::info!("Device event {} already processed, skipping", key);
            Ok(DeviceEventOutcome {
                duplicate: true,
                record: None,
            })
        }
        Err(e) => {
            log::warn!("Device event {} rejected, key released: {}", key, e);
            Err(e)
        }
    }
}

/// Today's rows for every employee, with names, for the admin board.
pub async fn all_attendance_today(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    now: DateTime<Utc>,
) -> Result<Vec<TeamAttendanceEntry>, ServiceError> {
    let today = ShiftPolicy {
        offset: offset_from_minutes(ctx.settings.default_utc_offset_minutes),
        ..ShiftPolicy::default()
    }
    .today(now);

    let rows = attendance_days::table
        .inner_join(employees::table)
        .filter(attendance_days::work_date.eq(today))
        .order((employees::last_name.asc(), employees::first_name.asc()))
        .select((AttendanceDay::as_select(), Employee::as_select()))
        .load::<(AttendanceDay, Employee)>(conn)
        .await?;

    log::debug!("Loaded {} attendance rows for {}", rows.len(), today);
    Ok(team_attendance(&rows))
}

/// Rows for one employee between two local dates inclusive, oldest first.
pub async fn days_between(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AttendanceDay>, ServiceError> {
    Ok(attendance_days::table
        .filter(attendance_days::employee_id.eq(employee_id))
        .filter(attendance_days::work_date.ge(from))
        .filter(attendance_days::work_date.le(to))
        .order(attendance_days::work_date.asc())
        .select(AttendanceDay::as_select())
        .load::<AttendanceDay>(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn derived_keys_identify_camera_employee_event_and_instant() {
        let payload = DeviceEventPayload {
            employee_id: Uuid::nil(),
            event_type: DeviceEventType::ClockIn,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 8, 55, 0).unwrap(),
            camera_id: "lobby-1".to_string(),
            confidence: Some(0.97),
        };
        let key = derived_idempotency_key(&payload);
        assert_eq!(
            key,
            "lobby-1:00000000-0000-0000-0000-000000000000:CLOCK_IN:1709542500000"
        );
    }

    use crate::models::AttendanceStatus;
    use crate::test_support::{insert_employee, test_connection, test_context};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn lobby() -> Coordinates {
        Coordinates::new(0.0, 0.0)
    }

    fn camera_event(
        employee_id: Uuid,
        event_type: DeviceEventType,
        h: u32,
        m: u32,
    ) -> DeviceEventPayload {
        DeviceEventPayload {
            employee_id,
            event_type,
            timestamp: at(h, m),
            camera_id: "lobby-1".to_string(),
            confidence: Some(0.91),
        }
    }

    async fn rows_for(conn: &mut AsyncPgConnection, employee_id: Uuid) -> i64 {
        attendance_days::table
            .filter(attendance_days::employee_id.eq(employee_id))
            .count()
            .get_result::<i64>(conn)
            .await
            .unwrap()
    }

    async fn stored_keys(conn: &mut AsyncPgConnection, key: &str) -> i64 {
        device_events::table
            .filter(device_events::idempotency_key.eq(key))
            .count()
            .get_result::<i64>(conn)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn second_clock_in_keeps_a_single_row() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Ada").await;

        let first = clock_in(&mut conn, &ctx, employee.id, lobby(), at(8, 55)).await.unwrap();
        assert_eq!(first.record.status, AttendanceStatus::Present);

        let err = clock_in(&mut conn, &ctx, employee.id, lobby(), at(9, 30)).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_CLOCKED_IN");
        assert_eq!(rows_for(&mut conn, employee.id).await, 1);
    }

    #[actix_web::test]
    async fn racing_writer_loses_on_the_conditional_update() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Grace").await;
        let policy = ShiftPolicy::default();

        // Both requests planned against an empty day; the first one commits.
        let plan = plan_clock_in(None, &policy, at(8, 58), classify(lobby(), None)).unwrap();
        clock_in(&mut conn, &ctx, employee.id, lobby(), at(8, 57)).await.unwrap();

        let err = write_clock_in(&mut conn, employee.id, &plan, None, at(8, 58))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_CLOCKED_IN");
        assert_eq!(rows_for(&mut conn, employee.id).await, 1);
    }

    #[actix_web::test]
    async fn clock_in_fills_a_placeholder_row() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Linus").await;

        let placeholder = diesel::insert_into(attendance_days::table)
            .values(&NewAttendanceDay {
                employee_id: employee.id,
                work_date: at(0, 0).date_naive(),
                day_name: "Monday".to_string(),
                clock_in: None,
                status: AttendanceStatus::Absent,
                location: WorkLocation::Office,
                office_name: None,
            })
            .returning(AttendanceDay::as_returning())
            .get_result::<AttendanceDay>(&mut conn)
            .await
            .unwrap();

        let response = clock_in(&mut conn, &ctx, employee.id, lobby(), at(9, 20)).await.unwrap();
        assert_eq!(response.record.id, placeholder.id);
        assert_eq!(response.record.status, AttendanceStatus::Late);
        assert!(response.record.clock_in.is_some());
        assert_eq!(rows_for(&mut conn, employee.id).await, 1);
    }

    #[actix_web::test]
    async fn repeated_device_event_is_applied_once() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Edsger").await;
        let key = Some("lobby-1-0001".to_string());

        let first = process_device_event(
            &mut conn,
            &ctx,
            camera_event(employee.id, DeviceEventType::ClockIn, 8, 50),
            key.clone(),
        )
        .await
        .unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.record.unwrap().location, WorkLocation::Office);

        let again = process_device_event(
            &mut conn,
            &ctx,
            camera_event(employee.id, DeviceEventType::ClockIn, 8, 50),
            key,
        )
        .await
        .unwrap();
        assert!(again.duplicate);
        assert!(again.record.is_none());
        assert_eq!(rows_for(&mut conn, employee.id).await, 1);
        assert_eq!(stored_keys(&mut conn, "lobby-1-0001").await, 1);
    }

    #[actix_web::test]
    async fn rejected_device_event_releases_its_key() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Barbara").await;
        let key = Some("lobby-1-0002".to_string());

        let err = process_device_event(
            &mut conn,
            &ctx,
            camera_event(employee.id, DeviceEventType::ClockOut, 17, 5),
            key.clone(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "NOT_CLOCKED_IN");
        assert_eq!(stored_keys(&mut conn, "lobby-1-0002").await, 0);
        assert_eq!(rows_for(&mut conn, employee.id).await, 0);

        // A corrected retry under the same key goes through.
        let retried = process_device_event(
            &mut conn,
            &ctx,
            camera_event(employee.id, DeviceEventType::ClockIn, 8, 59),
            key,
        )
        .await
        .unwrap();
        assert!(!retried.duplicate);
        assert_eq!(stored_keys(&mut conn, "lobby-1-0002").await, 1);
    }
}
