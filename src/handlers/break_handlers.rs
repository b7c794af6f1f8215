// WorkHole/backend-api/src/handlers/break_handlers.rs
use crate::auth_utils::{AdminUser, AuthenticatedUser};
use crate::db::DbPool;
use crate::error_handler::ServiceError;
use crate::domain::breaks::BreakHistoryFilter;
use crate::models::{
    BreakHistoryQuery, CreateBreakTypePayload, StartBreakPayload, UpdateBreakTypePayload,
};
use crate::services::{break_service, AppContext};
use actix_web::{delete, get, post, put, routes, web, HttpResponse, Result as ActixResult};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

#[get("/types")]
pub async fn list_break_types_handler(
    pool: web::Data<DbPool>,
    _authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let types = break_service::list_active_types(&mut conn).await?;
    Ok(HttpResponse::Ok().json(types))
}

#[post("/types")]
pub async fn create_break_type_handler(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    payload: web::Json<CreateBreakTypePayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("Admin {} creating break type: {:?}", admin.id(), payload);

    let mut conn = pool.get().await?;
    let created = break_service::create_break_type(&mut conn, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

#[put("/types/{type_id}")]
pub async fn update_break_type_handler(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    type_id: web::Path<Uuid>,
    payload: web::Json<UpdateBreakTypePayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    let type_id = type_id.into_inner();
    log::info!("Admin {} updating break type {}: {:?}", admin.id(), type_id, payload);

    let mut conn = pool.get().await?;
    let updated =
        break_service::update_break_type(&mut conn, type_id, payload.into_inner(), Utc::now())
            .await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[delete("/types/{type_id}")]
pub async fn delete_break_type_handler(
    pool: web::Data<DbPool>,
    admin: AdminUser,
    type_id: web::Path<Uuid>,
) -> ActixResult<HttpResponse, ServiceError> {
    let type_id = type_id.into_inner();
    log::info!("Admin {} deleting break type {}", admin.id(), type_id);

    let mut conn = pool.get().await?;
    break_service::delete_break_type(&mut conn, type_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Break type with id {} deleted successfully", type_id)
    })))
}

#[post("/start")]
pub async fn start_break_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    payload: web::Json<StartBreakPayload>,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!(
        "User {} starting break '{}'",
        authenticated_user.id,
        payload.break_type
    );

    let mut conn = pool.get().await?;
    let session = break_service::start_break(
        &mut conn,
        &ctx,
        authenticated_user.id,
        payload.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Created().json(session))
}

#[post("/stop")]
pub async fn stop_break_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    log::info!("User {} ending break", authenticated_user.id);

    let mut conn = pool.get().await?;
    let session =
        break_service::stop_break(&mut conn, &ctx, authenticated_user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(session))
}

#[get("/me")]
pub async fn break_dashboard_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
) -> ActixResult<HttpResponse, ServiceError> {
    let mut conn = pool.get().await?;
    let dashboard =
        break_service::break_dashboard(&mut conn, &ctx, authenticated_user.id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(dashboard))
}

/// Whose history to list: admins may name another employee with `userId`;
/// anyone else always gets their own.
fn history_subject(caller: &AuthenticatedUser, requested: Option<Uuid>) -> Uuid {
    match requested {
        Some(other) if caller.is_admin() => other,
        Some(other) if other != caller.id => {
            log::warn!(
                "User {} asked for the break history of {} without admin role; using their own",
                caller.id,
                other
            );
            caller.id
        }
        _ => caller.id,
    }
}

#[routes]
#[get("/history")]
#[get("/stats")]
pub async fn break_history_handler(
    pool: web::Data<DbPool>,
    ctx: web::Data<AppContext>,
    authenticated_user: AuthenticatedUser,
    query: web::Query<BreakHistoryQuery>,
) -> ActixResult<HttpResponse, ServiceError> {
    let query = query.into_inner();
    let subject = history_subject(&authenticated_user, query.user_id);
    let filter = BreakHistoryFilter::parse(
        query.sort_by.as_deref(),
        query.date.as_deref(),
        query.break_type.as_deref(),
    )?;

    let mut conn = pool.get().await?;
    let page =
        break_service::history(&mut conn, &ctx, subject, filter, query.pagination()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/active-count")]
pub async fn active_break_count_handler(
    pool: web::Data<DbPool>,
    admin: AdminUser,
) -> ActixResult<HttpResponse, ServiceError> {
    log::debug!("Admin {} reading the active break count", admin.id());
    let mut conn = pool.get().await?;
    let count = break_service::active_count(&mut conn).await?;
    Ok(HttpResponse::Ok().json(json!({ "active_count": count })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_utils::Role;

    fn caller(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn only_admins_may_read_another_employees_history() {
        let other = Uuid::new_v4();

        let admin = caller(Role::Admin);
        assert_eq!(history_subject(&admin, Some(other)), other);
        assert_eq!(history_subject(&admin, None), admin.id);

        let employee = caller(Role::Employee);
        assert_eq!(history_subject(&employee, Some(other)), employee.id);
        assert_eq!(history_subject(&employee, Some(employee.id)), employee.id);
    }
}
