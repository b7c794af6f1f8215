// WorkHole/backend-api/src/handlers/leave_handlers.rs
use crate::auth_utils::{AdminUser, AuthenticatedUser};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{CreateLeavePayload, LeaveActionPayload, PaginationParams, UpdateLeavePayload};
use crate::services::{leave_service, AppContext};
use actix_web::{delete, get, post, put, web, HttpResponse, Result as ActixResult};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

#[post("")]
pub async fn create_leave_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<CreateLeavePayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!(
        "User {} requesting leave: {:?}",
        authenticated_user.id,
        payload
    );

    let mut conn = pool.get().await?;
    let request =
        leave_service::create(&mut conn, &ctx, authenticated_user.id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(request))
}

#[get("/me")]
pub async fn my_leaves_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let page = leave_service::my_leaves(&mut conn, authenticated_user.id, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/stats")]
pub async fn leave_stats_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let stats = leave_service::stats(&mut conn, &ctx, authenticated_user.id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/admin/all")]
pub async fn all_leaves_handler(
    pool: web::Data<DbPool>,
    admin: AdminUser,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Admin {} listing all leave requests", admin.id());

    let mut conn = pool.get().await?;
    let requests = leave_service::all_leaves(&mut conn).await?;
    Ok(HttpResponse::Ok().json(requests))
}

#[put("/admin/{leave_id}/action")]
pub async fn leave_action_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    admin: AdminUser,
    leave_id: web::Path<Uuid>,
    payload: web::Json<LeaveActionPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let leave_id = leave_id.into_inner();
    log::info!(
        "Admin {} acting on leave request {}: {:?}",
        admin.id(),
        leave_id,
        payload
    );

    let mut conn = pool.get().await?;
    let decided = leave_service::admin_action(
        &mut conn,
        &ctx,
        admin.id(),
        leave_id,
        payload.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(decided))
}

#[put("/{leave_id}")]
pub async fn update_leave_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    leave_id: web::Path<Uuid>,
    payload: web::Json<UpdateLeavePayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let leave_id = leave_id.into_inner();
    log::info!(
        "User {} updating leave request {}: {:?}",
        authenticated_user.id,
        leave_id,
        payload
    );

    let mut conn = pool.get().await?;
    let updated = leave_service::update(
        &mut conn,
        &ctx,
        authenticated_user.id,
        leave_id,
        payload.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[delete("/{leave_id}")]
pub async fn delete_leave_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    leave_id: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let leave_id = leave_id.into_inner();

    let mut conn = pool.get().await?;
    leave_service::delete(&mut conn, authenticated_user.id, leave_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Leave request with id {} deleted successfully", leave_id)
    })))
}
