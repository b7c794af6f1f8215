// WorkHole/backend-api/src/handlers/dashboard_handlers.rs
use crate::auth_utils::AuthenticatedUser;
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::services::{report_service, AppContext};
use actix_web::{get, web, HttpResponse, Result as ActixResult};
use chrono::Utc;

#[get("")]
pub async fn home_dashboard_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let dashboard =
        report_service::home_dashboard(&mut conn, &ctx, authenticated_user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}
