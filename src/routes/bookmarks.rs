use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::handlers::auth::AuthUser;
use crate::handlers::db::Database;
use crate::middleware::auth_middleware::AuthMiddleware;
use crate::models::all_models::{Bookmark, Job, UserRole};
use crate::routes::jobs::{find_job, JOB_COLUMNS};
use actix_web::{web, HttpResponse};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize)]
pub struct BookmarkRequest {
    pub job_id: Uuid,
}

//Add Bookmark
//Add Bookmark Input: BookmarkRequest
//Add Bookmark Output: Bookmark
pub async fn add_bookmark(
    db: web::Data<Database>,
    user: AuthUser,
    payload: web::Json<BookmarkRequest>,
) -> AppResult<HttpResponse> {
    let job = find_job(&db, payload.job_id).await?;

    let result = db
        .run(
            sqlx::query_as::<_, Bookmark>(
                "INSERT INTO bookmarks (bookmark_id, job_id, user_id) VALUES ($1, $2, $3) \
                 RETURNING bookmark_id, job_id, user_id, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(job.job_id)
            .bind(user.id)
            .fetch_one(db.pool()),
        )
        .await;

    let bookmark = match result {
        Err(AppError::Database(e)) => Err(conflict_on_unique(e, "Job already bookmarked")),
        other => other,
    }?;

    info!("User {} bookmarked job {}", user.id, job.job_id);
    Ok(HttpResponse::Created().json(bookmark))
}

//Bookmarked Jobs
pub async fn list_bookmarks(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    let query = format!(
        "SELECT {} FROM jobs WHERE job_id IN (SELECT job_id FROM bookmarks WHERE user_id = $1) \
         ORDER BY created_at DESC",
        JOB_COLUMNS
    );
    let jobs = db
        .run(
            sqlx::query_as::<_, Job>(&query)
                .bind(user.id)
                .fetch_all(db.pool()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//Remove Bookmark
pub async fn remove_bookmark(
    db: web::Data<Database>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::User)?;
    let job_id = path.into_inner();

    let result = db
        .run(
            sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND job_id = $2")
                .bind(user.id)
                .bind(job_id)
                .execute(db.pool()),
        )
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Bookmark not found"));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Bookmark removed successfully" })))
}

//Config Bookmark Routes
pub fn config_bookmark_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookmarks")
            .wrap(AuthMiddleware)
            .route("", web::post().to(add_bookmark))
            .route("", web::get().to(list_bookmarks))
            .route("/{job_id}", web::delete().to(remove_bookmark)),
    );
}
