// WorkHole/backend-api/src/handlers/timer_handlers.rs
use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::models::{StartTimerPayload, TimerNotePayload};
use crate::services::{timer_service, AppContext};
use actix_web::{get, post, put, web, HttpResponse, Result as ActixResult};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

#[post("/start")]
pub async fn start_timer_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<StartTimerPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!(
        "User {} starting timer '{}' for {} minutes",
        authenticated_user.id,
        payload.tag,
        payload.duration
    );

    let mut conn = pool.get().await?;
    let timer = timer_service::start(
        &mut conn,
        &ctx,
        authenticated_user.id,
        payload.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Created().json(timer))
}

#[put("/{timer_id}/pause")]
pub async fn pause_timer_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    timer_id: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let timer = timer_service::pause(
        &mut conn,
        authenticated_user.id,
        timer_id.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(timer))
}

#[put("/{timer_id}/resume")]
pub async fn resume_timer_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    timer_id: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let timer = timer_service::resume(
        &mut conn,
        authenticated_user.id,
        timer_id.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(timer))
}

// The note body is optional; an empty request completes without one.
#[put("/{timer_id}/complete")]
pub async fn complete_timer_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    timer_id: web::Path<Uuid>,
    payload: Option<web::Json<TimerNotePayload>>,
) -> ActixResult<HttpResponse, ServiceError> {
    let note = payload.and_then(|p| p.into_inner().note);
    let mut conn = pool.get().await?;
    let timer = timer_service::complete(
        &mut conn,
        &ctx,
        authenticated_user.id,
        timer_id.into_inner(),
        note,
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(timer))
}

#[put("/{timer_id}/cancel")]
pub async fn cancel_timer_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
    timer_id: web::Path<Uuid>,
    payload: Option<web::Json<TimerNotePayload>>,
) -> ActixResult<HttpResponse, ServiceError> {
    let note = payload.and_then(|p| p.into_inner().note);
    let mut conn = pool.get().await?;
    let timer = timer_service::cancel(
        &mut conn,
        authenticated_user.id,
        timer_id.into_inner(),
        note,
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(timer))
}

#[get("/current")]
pub async fn current_timer_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let current = timer_service::current(&mut conn, authenticated_user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "timer": current })))
}

#[get("/me")]
pub async fn timer_history_handler(
    pool: web::Data<DbPool>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let history = timer_service::history(&mut conn, authenticated_user.id).await?;
    Ok(HttpResponse::Ok().json(history))
}

#[get("/stats")]
pub async fn timer_stats_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let stats = timer_service::stats(&mut conn, &ctx, authenticated_user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(stats))
}
