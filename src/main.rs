mod config;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;

use actix_cors::Cors;
use actix_web::{
    http::header,
    middleware::{Logger, NormalizePath},
    web, HttpResponse,
};
use config::AppConfig;
use handlers::{
    auth::TokenService,
    b2_storage::B2Client,
    db::Database,
    user_store::{PgUserStore, UserStore},
};
use log::{error, info};
use middleware::{rate_limit::RateLimit, request_logger::RequestLogger};
use routes::{config_api_routes, json_config};
use serde_json::json;
use shuttle_actix_web::ShuttleActixWeb;
use shuttle_runtime::SecretStore;
use std::sync::Arc;

const CORS_MAX_AGE_SECS: usize = 12 * 60 * 60;

fn startup_error(context: &str, err: impl std::fmt::Display) -> shuttle_runtime::Error {
    error!("{}: {}", context, err);
    shuttle_runtime::Error::Custom(anyhow::anyhow!("{}: {}", context, err))
}

async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "pong" }))
}

#[shuttle_runtime::main]
async fn main(
    #[shuttle_runtime::Secrets] secrets: SecretStore,
) -> ShuttleActixWeb<impl FnOnce(&mut web::ServiceConfig) + Send + Clone + 'static> {
    info!("=== Jobly API Server Starting ===");

    let config = AppConfig::from_secrets(&secrets)
        .map_err(|e| startup_error("Invalid configuration", e))?;

    let tokens = TokenService::new(
        &config.jwt_secret,
        config.access_token_ttl,
        config.refresh_token_ttl,
    )
    .map_err(|e| startup_error("Token service initialization failed", e))?;

    let database = Database::connect(&config.database_url, config.db_timeout)
        .await
        .map_err(|e| startup_error("Failed to connect to Postgres", e))?;

    if database.check_connection().await {
        info!("Database connection established and verified");
    } else {
        database.close().await;
        return Err(startup_error(
            "Database connection check failed",
            "no connection could be acquired",
        ));
    }

    if let Err(e) = database.migrate().await {
        database.close().await;
        return Err(startup_error("Database migration failed", e));
    }

    let b2_client = match B2Client::new(&config.b2, config.db_timeout) {
        Ok(client) => client,
        Err(e) => {
            database.close().await;
            return Err(startup_error("B2 storage initialization failed", e));
        }
    };
    info!("B2 storage client initialized");

    let rate_limit = RateLimit::new(config.rate_limit_per_second, config.rate_limit_burst);
    info!(
        "Rate limiting clients to {} req/s (burst {})",
        config.rate_limit_per_second, config.rate_limit_burst
    );

    let user_store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(database.clone()));
    let user_store = web::Data::from(user_store);
    let cors_origin = config.cors_origin.clone();

    info!("Starting Jobly API Server with Shuttle...");

    let service_config = move |cfg: &mut web::ServiceConfig| {
        let cors = Cors::default()
            .allowed_origin(&cors_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("refreshtoken"),
            ])
            .expose_headers(vec![
                header::HeaderName::from_static("x-access-token"),
                header::HeaderName::from_static("x-request-id"),
            ])
            .supports_credentials()
            .max_age(CORS_MAX_AGE_SECS);

        cfg.app_data(json_config());
        cfg.app_data(web::Data::new(database));
        cfg.app_data(web::Data::new(tokens));
        cfg.app_data(web::Data::new(b2_client));
        cfg.app_data(user_store);
        cfg.service(
            web::scope("")
                .wrap(Logger::new(
                    "%t [%s] \"%r\" %b %D ms \"%{Referer}i\" \"%{User-Agent}i\" %a",
                ))
                .wrap(RequestLogger)
                .wrap(rate_limit)
                .wrap(NormalizePath::trim())
                .wrap(cors)
                .service(
                    web::scope("/api/v1")
                        .route("/ping", web::get().to(ping))
                        .configure(config_api_routes),
                )
                .route(
                    "/",
                    web::get().to(|| async { HttpResponse::Ok().body("Welcome to the Jobly API") }),
                ),
        );
    };

    Ok(service_config.into())
}
