// WorkHole/backend-api/src/services/leave_service.rs
use crate::domain::leave::{
    self, decide, ensure_editable, inclusive_days, plan_update, validate_reason, LeaveBalance,
    LeaveError, LeaveStats,
};
use crate::domain::reporting::EmployeeSummary;
use crate::error_handler::ServiceError;
use crate::models::{
    CreateLeavePayload, Employee, LeaveActionChangeset, LeaveActionPayload, LeaveRequest,
    LeaveStatus, NewLeaveRequest, PaginatedResponse, PaginationParams, UpdateLeaveChangeset,
    UpdateLeavePayload,
};
use crate::notify::{Mail, MailEvent, Notification, NotificationKind};
use crate::schema::{employees, leave_requests};
use crate::services::employee_directory::{annual_entitlement, find_employee, lock_employee};
use crate::services::AppContext;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// A request as the admin list shows it, with who asked.
#[derive(Debug, Serialize)]
pub struct AdminLeaveEntry {
    pub employee: EmployeeSummary,
    #[serde(flatten)]
    pub request: LeaveRequest,
}

async fn requests_of(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Vec<LeaveRequest>, ServiceError> {
    Ok(leave_requests::table
        .filter(leave_requests::employee_id.eq(employee_id))
        .order(leave_requests::created_at.desc())
        .select(LeaveRequest::as_select())
        .load::<LeaveRequest>(conn)
        .await?)
}

async fn balance_of(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee: &Employee,
) -> Result<LeaveBalance, ServiceError> {
    let requests = requests_of(conn, employee.id).await?;
    Ok(LeaveBalance::from_requests(
        annual_entitlement(employee, &ctx.settings),
        &requests,
    ))
}

async fn find_request(
    conn: &mut AsyncPgConnection,
    leave_id: Uuid,
) -> Result<LeaveRequest, ServiceError> {
    leave_requests::table
        .find(leave_id)
        .select(LeaveRequest::as_select())
        .first::<LeaveRequest>(conn)
        .await
        .optional()?
        .ok_or_else(|| ServiceError::NotFound(format!("Leave request with id {} not found", leave_id)))
}

/// Other employees' requests look the same as missing ones.
async fn find_owned(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    leave_id: Uuid,
) -> Result<LeaveRequest, ServiceError> {
    let request = find_request(conn, leave_id).await?;
    if request.employee_id != employee_id {
        log::warn!(
            "Employee {} tried to access leave request {} owned by {}",
            employee_id,
            leave_id,
            request.employee_id
        );
        return Err(ServiceError::NotFound(format!(
            "Leave request with id {} not found",
            leave_id
        )));
    }
    Ok(request)
}

pub async fn create(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    payload: CreateLeavePayload,
) -> Result<LeaveRequest, ServiceError> {
    let days = inclusive_days(payload.start_date, payload.end_date)?;
    let reason = validate_reason(&payload.reason)?;

    let (created, employee) = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let employee = lock_employee(conn, employee_id).await?;
                balance_of(conn, ctx, &employee)
                    .await?
                    .check(payload.leave_type, days)?;

                let new_request = NewLeaveRequest {
                    employee_id,
                    leave_type: payload.leave_type,
                    start_date: payload.start_date,
                    end_date: payload.end_date,
                    days,
                    reason,
                    attachment_url: payload.attachment_url,
                    status: LeaveStatus::Pending,
                };
                let created = diesel::insert_into(leave_requests::table)
                    .values(&new_request)
                    .returning(LeaveRequest::as_returning())
                    .get_result::<LeaveRequest>(conn)
                    .await?;
                Ok((created, employee))
            }
            .scope_boxed()
        })
        .await?;

    log::info!(
        "Employee {} requested {} days of {} ({} to {})",
        employee_id,
        created.days,
        created.leave_type,
        created.start_date,
        created.end_date
    );

    ctx.notifier.dispatch(
        Notification::new(
            employee_id,
            NotificationKind::Leave,
            "Leave request submitted",
            format!(
                "Your {} request for {} day(s) from {} is pending review.",
                created.leave_type, created.days, created.start_date
            ),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::LeaveSubmitted,
            json!({
                "name": employee.full_name(),
                "leaveType": created.leave_type,
                "startDate": created.start_date,
                "endDate": created.end_date,
                "days": created.days,
            }),
        )),
    );

    Ok(created)
}

pub async fn my_leaves(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    params: PaginationParams,
) -> Result<PaginatedResponse<LeaveRequest>, ServiceError> {
    let params = params.normalized();

    let total_items = leave_requests::table
        .filter(leave_requests::employee_id.eq(employee_id))
        .count()
        .get_result::<i64>(conn)
        .await?;

    let items = leave_requests::table
        .filter(leave_requests::employee_id.eq(employee_id))
        .order(leave_requests::created_at.desc())
        .limit(params.per_page)
        .offset(params.offset())
        .select(LeaveRequest::as_select())
        .load::<LeaveRequest>(conn)
        .await?;

    Ok(PaginatedResponse::new(items, total_items, params))
}

pub async fn update(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
    leave_id: Uuid,
    payload: UpdateLeavePayload,
    now: DateTime<Utc>,
) -> Result<LeaveRequest, ServiceError> {
    let updated = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let employee = lock_employee(conn, employee_id).await?;
                let request = find_owned(conn, employee_id, leave_id).await?;
                ensure_editable(&request)?;
                let balance = balance_of(conn, ctx, &employee).await?;
                let edit = plan_update(&request, &payload, &balance)?;

                let changes = UpdateLeaveChangeset {
                    leave_type: Some(edit.leave_type),
                    start_date: Some(edit.start_date),
                    end_date: Some(edit.end_date),
                    days: Some(edit.days),
                    reason: Some(edit.reason),
                    attachment_url: Some(edit.attachment_url),
                    updated_at: Some(now),
                };
                let updated = diesel::update(
                    leave_requests::table
                        .filter(leave_requests::id.eq(leave_id))
                        .filter(leave_requests::status.eq(LeaveStatus::Pending)),
                )
                .set(&changes)
                .returning(LeaveRequest::as_returning())
                .get_result::<LeaveRequest>(conn)
                .await
                .optional()?
                .ok_or(LeaveError::NotPending)?;
                Ok(updated)
            }
            .scope_boxed()
        })
        .await?;

    log::info!("Leave request {} updated by {}", leave_id, employee_id);
    Ok(updated)
}

pub async fn delete(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
    leave_id: Uuid,
) -> Result<(), ServiceError> {
    let request = find_owned(conn, employee_id, leave_id).await?;
    ensure_editable(&request)?;

    let deleted = diesel::delete(
        leave_requests::table
            .filter(leave_requests::id.eq(leave_id))
            .filter(leave_requests::status.eq(LeaveStatus::Pending)),
    )
    .execute(conn)
    .await?;
    if deleted == 0 {
        return Err(LeaveError::NotPending.into());
    }
    log::info!("Leave request {} withdrawn by {}", leave_id, employee_id);
    Ok(())
}

pub async fn stats(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    employee_id: Uuid,
) -> Result<LeaveStats, ServiceError> {
    let employee = find_employee(conn, employee_id).await?;
    let requests = requests_of(conn, employee_id).await?;
    Ok(leave::stats(annual_entitlement(&employee, &ctx.settings), &requests))
}

pub async fn latest_request(
    conn: &mut AsyncPgConnection,
    employee_id: Uuid,
) -> Result<Option<LeaveRequest>, ServiceError> {
    Ok(leave_requests::table
        .filter(leave_requests::employee_id.eq(employee_id))
        .order(leave_requests::created_at.desc())
        .select(LeaveRequest::as_select())
        .first::<LeaveRequest>(conn)
        .await
        .optional()?)
}

pub async fn all_leaves(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<AdminLeaveEntry>, ServiceError> {
    let rows = leave_requests::table
        .inner_join(employees::table)
        .order(leave_requests::created_at.desc())
        .select((LeaveRequest::as_select(), Employee::as_select()))
        .load::<(LeaveRequest, Employee)>(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(request, employee)| AdminLeaveEntry {
            employee: EmployeeSummary::from(&employee),
            request,
        })
        .collect())
}

pub async fn admin_action(
    conn: &mut AsyncPgConnection,
    ctx: &AppContext,
    admin_id: Uuid,
    leave_id: Uuid,
    payload: LeaveActionPayload,
    now: DateTime<Utc>,
) -> Result<LeaveRequest, ServiceError> {
    let decision = payload.status;
    let action_note = payload.action_note.filter(|n| !n.trim().is_empty());
    let (decided, employee) = conn
        .transaction::<_, ServiceError, _>(|conn| {
            async move {
                let owner = find_request(conn, leave_id).await?.employee_id;
                let employee = lock_employee(conn, owner).await?;
                // Re-read under the lock so the decision sees committed approvals.
                let request = find_request(conn, leave_id).await?;
                let balance = balance_of(conn, ctx, &employee).await?;
                let status = decide(&request, decision, &balance)?;

                let changes = LeaveActionChangeset {
                    status,
                    action_by: Some(admin_id),
                    action_note,
                    action_date: Some(now),
                    updated_at: now,
                };
                let decided = diesel::update(
                    leave_requests::table
                        .filter(leave_requests::id.eq(leave_id))
                        .filter(leave_requests::status.eq(LeaveStatus::Pending)),
                )
                .set(&changes)
                .returning(LeaveRequest::as_returning())
                .get_result::<LeaveRequest>(conn)
                .await
                .optional()?;

                match decided {
                    Some(decided) => Ok((decided, employee)),
                    None => {
                        let current = find_request(conn, leave_id).await?;
                        Err(LeaveError::AlreadyProcessed(current.status).into())
                    }
                }
            }
            .scope_boxed()
        })
        .await?;

    log::info!(
        "Leave request {} {} by admin {}",
        leave_id,
        decided.status,
        admin_id
    );

    let note = decided.action_note.clone().unwrap_or_default();
    ctx.notifier.dispatch(
        Notification::new(
            employee.id,
            NotificationKind::Leave,
            format!("Leave request {}", decided.status),
            format!(
                "Your {} request from {} to {} was {}.",
                decided.leave_type, decided.start_date, decided.end_date, decided.status
            ),
        ),
        Some(Mail::new(
            employee.email.clone(),
            MailEvent::LeaveDecided,
            json!({
                "name": employee.full_name(),
                "leaveType": decided.leave_type,
                "status": decided.status,
                "note": note,
            }),
        )),
    );

    Ok(decided)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeaveDecision, LeaveType};
    use crate::test_support::{insert_employee, test_connection, test_context};
    use chrono::{NaiveDate, TimeZone};

    fn annual(from: u32, to: u32) -> CreateLeavePayload {
        CreateLeavePayload {
            leave_type: LeaveType::Annual,
            start_date: NaiveDate::from_ymd_opt(2024, 4, from).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, to).unwrap(),
            reason: "Family trip".to_string(),
            attachment_url: None,
        }
    }

    fn approve() -> LeaveActionPayload {
        LeaveActionPayload {
            status: LeaveDecision::Approved,
            action_note: None,
        }
    }

    #[actix_web::test]
    async fn approvals_cannot_overdraw_the_entitlement() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Ada").await;
        let admin = insert_employee(&mut conn, "Grace").await;
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

        // Both fit while pending; 15 + 15 days exceed the 21 day entitlement.
        let first = create(&mut conn, &ctx, employee.id, annual(1, 15)).await.unwrap();
        let second = create(&mut conn, &ctx, employee.id, annual(16, 30)).await.unwrap();

        let approved = admin_action(&mut conn, &ctx, admin.id, first.id, approve(), now)
            .await
            .unwrap();
        assert_eq!(approved.status, LeaveStatus::Approved);
        assert_eq!(approved.action_by, Some(admin.id));

        let err = admin_action(&mut conn, &ctx, admin.id, second.id, approve(), now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        let still = find_request(&mut conn, second.id).await.unwrap();
        assert_eq!(still.status, LeaveStatus::Pending);

        let err = admin_action(&mut conn, &ctx, admin.id, first.id, approve(), now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LEAVE_ALREADY_PROCESSED");
    }

    #[actix_web::test]
    async fn new_requests_see_approved_days() {
        let Some(mut conn) = test_connection().await else {
            return;
        };
        let (ctx, _) = test_context();
        let employee = insert_employee(&mut conn, "Linus").await;
        let admin = insert_employee(&mut conn, "Barbara").await;
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

        let first = create(&mut conn, &ctx, employee.id, annual(1, 15)).await.unwrap();
        admin_action(&mut conn, &ctx, admin.id, first.id, approve(), now)
            .await
            .unwrap();

        let err = create(&mut conn, &ctx, employee.id, annual(20, 29)).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        let fits = create(&mut conn, &ctx, employee.id, annual(20, 25)).await.unwrap();
        assert_eq!(fits.days, 6);
        assert_eq!(requests_of(&mut conn, employee.id).await.unwrap().len(), 2);
    }
}
