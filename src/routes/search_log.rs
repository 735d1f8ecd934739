use crate::errors::AppResult;
use crate::handlers::auth::AuthUser;
use crate::handlers::db::Database;
use crate::middleware::auth_middleware::AuthMiddleware;
use crate::models::all_models::{SearchLog, UserRole};
use crate::routes::jobs::find_job;
use actix_web::{web, HttpResponse};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SEARCH_LOG_COLUMNS: &str = "search_log_id, user_id, job_id, created_at";

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchLogRequest {
    pub job_id: Uuid,
}

// Records that the caller opened a job.
pub async fn record_search(
    db: web::Data<Database>,
    user: AuthUser,
    payload: web::Json<SearchLogRequest>,
) -> AppResult<HttpResponse> {
    let job = find_job(&db, payload.job_id).await?;

    let query = format!(
        "INSERT INTO search_logs (search_log_id, user_id, job_id) VALUES ($1, $2, $3) RETURNING {}",
        SEARCH_LOG_COLUMNS
    );
    let log = db
        .run(
            sqlx::query_as::<_, SearchLog>(&query)
                .bind(Uuid::new_v4())
                .bind(user.id)
                .bind(job.job_id)
                .fetch_one(db.pool()),
        )
        .await?;

    debug!("Search log {} recorded for {}", log.search_log_id, user.id);
    Ok(HttpResponse::Created().json(log))
}

// Admins see every log, job seekers only their own.
pub async fn list_searches(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    let logs = match user.role {
        UserRole::Admin => {
            let query = format!(
                "SELECT {} FROM search_logs ORDER BY created_at DESC",
                SEARCH_LOG_COLUMNS
            );
            db.run(sqlx::query_as::<_, SearchLog>(&query).fetch_all(db.pool()))
                .await?
        }
        UserRole::User => {
            let query = format!(
                "SELECT {} FROM search_logs WHERE user_id = $1 ORDER BY created_at DESC",
                SEARCH_LOG_COLUMNS
            );
            db.run(
                sqlx::query_as::<_, SearchLog>(&query)
                    .bind(user.id)
                    .fetch_all(db.pool()),
            )
            .await?
        }
    };
    Ok(HttpResponse::Ok().json(logs))
}

pub fn config_search_log_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/search")
            .wrap(AuthMiddleware)
            .route("", web::post().to(record_search))
            .route("", web::get().to(list_searches)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::auth::tests::service;
    use crate::handlers::db::tests::lazy_database;
    use crate::routes::json_config;
    use crate::routes::tests::status_of;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn recording_a_search_requires_a_token() {
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .app_data(web::Data::new(lazy_database()))
                .app_data(web::Data::new(service()))
                .configure(config_search_log_routes),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({ "job_id": Uuid::new_v4() }))
            .to_request();
        assert_eq!(status_of(test::try_call_service(&app, req).await), StatusCode::UNAUTHORIZED);
    }
}
