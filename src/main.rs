// WorkHole/backend-api/src/main.rs
mod auth_utils;
mod config;
mod db;
mod domain;
mod error_handler;
mod handlers;
mod models;
mod notify;
mod scheduler;
pub mod schema;
mod services;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{
    http::header::{self, HeaderName},
    middleware::Logger,
    web, App, HttpResponse, HttpServer,
};
use config::AppConfig;
use db::DbPool;
use notify::Notifier;
use services::{office_service, AppContext, Settings};
use std::io;
use std::sync::Arc;

async fn health_check_handler(
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, error_handler::ServiceError> {
    match pool.get().await {
        Ok(_conn) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "message": "Backend is running and DB pool accessible"
        }))),
        Err(e) => {
            log::error!("Failed to get connection from pool: {:?}", e);
            Err(error_handler::ServiceError::InternalServerError(
                "Failed to check DB pool".to_string(),
            ))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    if cfg!(debug_assertions) {
        match dotenvy::dotenv() {
            Ok(path) => log::info!(".env file loaded from path: {}", path.display()),
            Err(e) => log::warn!(
                "Could not load .env file: {}, using environment variables.",
                e
            ),
        }
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let pool = db::create_pool(&config.database_url, config.db_pool_size)
        .await
        .map_err(|e| {
            log::error!("Failed to create database connection pool: {}", e);
            io::Error::new(io::ErrorKind::Other, e.to_string())
        })?;

    let ctx = Arc::new(AppContext::new(Settings::from(&config), Notifier::logging()));
    match pool.get().await {
        Ok(mut conn) => {
            if let Err(e) = office_service::load_office(&mut conn, &ctx.office).await {
                log::error!("Could not load the office location: {}", e);
            }
        }
        Err(e) => log::error!("No connection available to load the office location: {:?}", e),
    }

    scheduler::spawn_sweeper(pool.clone(), Arc::clone(&ctx), config.sweep_interval);

    log::info!("WorkHole Backend Service starting...");
    let bind_address = config.bind_address();
    log::info!("Server will start at http://{}", bind_address);

    let cors_origins = config.cors_origins.clone();
    let app_ctx = web::Data::from(ctx);

    HttpServer::new(move || {
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-user-id"),
                HeaderName::from_static("x-user-role"),
                HeaderName::from_static("idempotency-key"),
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(pool.clone()))
            .app_data(app_ctx.clone())
            .service(web::resource("/health").route(web::get().to(health_check_handler)))
            .configure(handlers::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
