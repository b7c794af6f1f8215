// WorkHole/backend-api/src/handlers/attendance_handlers.rs
use crate::auth_utils::{AdminUser, AuthenticatedUser, DeviceClient};
use crate::db::DbPool;
use crate::domain::geofence::Coordinates;
use crate::error_handler::ServiceError;
use crate::models::{
    ClockPayload, DashboardQuery, DeviceEventPayload, PaginationParams, SetOfficeLocationPayload,
};
use crate::services::{attendance_service, office_service, report_service, AppContext};
use actix_web::{get, post, web, HttpRequest, HttpResponse, Result as ActixResult};
use chrono::Utc;
use serde_json::json;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[post("/clock-in")]
pub async fn clock_in_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<ClockPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!(
        "User {} clocking in from ({}, {})",
        authenticated_user.id,
        payload.latitude,
        payload.longitude
    );

    let mut conn = pool.get().await?;
    let position = Coordinates::new(payload.latitude, payload.longitude);
    let response =
        attendance_service::clock_in(&mut conn, &ctx, authenticated_user.id, position, Utc::now())
            .await?;

    Ok(HttpResponse::Created().json(response))
}

#[post("/clock-out")]
pub async fn clock_out_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<ClockPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!(
        "User {} clocking out from ({}, {})",
        authenticated_user.id,
        payload.latitude,
        payload.longitude
    );

    let mut conn = pool.get().await?;
    let position = Coordinates::new(payload.latitude, payload.longitude);
    let response =
        attendance_service::clock_out(&mut conn, &ctx, authenticated_user.id, position, Utc::now())
            .await?;

    Ok(HttpResponse::Ok().json(response))
}

#[get("/me")]
pub async fn attendance_dashboard_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<DashboardQuery>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::debug!(
        "Attendance dashboard for user {} (filter {:?})",
        authenticated_user.id,
        query.filter
    );

    let mut conn = pool.get().await?;
    let dashboard = report_service::attendance_dashboard(
        &mut conn,
        &ctx,
        authenticated_user.id,
        query.filter.as_deref(),
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(dashboard))
}

#[get("/stats")]
pub async fn attendance_stats_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let stats = report_service::attendance_stats(
        &mut conn,
        &ctx,
        authenticated_user.id,
        query.into_inner(),
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(stats))
}

/// Camera integration. Callers authenticate as a device service account (or
/// an admin); the employee comes from the payload.
#[post("/events")]
pub async fn device_event_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    device: DeviceClient,
    req: HttpRequest,
    payload: web::Json<DeviceEventPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let idempotency_key = req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    log::info!(
        "Device event from {} via {} (key {:?})",
        payload.camera_id,
        device.id(),
        idempotency_key
    );

    let mut conn = pool.get().await?;
    let outcome = attendance_service::process_device_event(
        &mut conn,
        &ctx,
        payload.into_inner(),
        idempotency_key,
    )
    .await?;

    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/all")]
pub async fn all_attendance_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    admin: AdminUser,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Admin {} listing today's attendance", admin.id());

    let mut conn = pool.get().await?;
    let entries = attendance_service::all_attendance_today(&mut conn, &ctx, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(entries))
}

#[get("/office-location")]
pub async fn get_office_location_handler(
    ctx: web::Data<AppContext>,
    _authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    match ctx.office.current() {
        Some(office) => Ok(HttpResponse::Ok().json(office.as_ref())),
        None => Err(ServiceError::NotFound(
            "No office location has been set".to_string(),
        )),
    }
}

#[post("/office-location")]
pub async fn set_office_location_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    admin: AdminUser,
    payload: web::Json<SetOfficeLocationPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Admin {} setting office location: {:?}", admin.id(), payload);

    let mut conn = pool.get().await?;
    let office = office_service::set_office_location(
        &mut conn,
        &ctx.office,
        payload.into_inner(),
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Office location set to {}", office.name),
        "office": office,
    })))
}
