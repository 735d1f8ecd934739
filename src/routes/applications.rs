use crate::errors::{AppError, AppResult};
use crate::handlers::auth::AuthUser;
use crate::handlers::b2_storage::{B2Client, StoredObject};
use crate::handlers::db::Database;
use crate::middleware::auth_middleware::AuthMiddleware;
use crate::models::all_models::{
    Application, ApplicationStatus, ApplicationUserResponse, UserRole,
};
use crate::routes::{jobs::find_job, like_pattern};
use actix_multipart::{Field, Multipart};
use actix_web::{
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web, HttpResponse,
};
use futures::{StreamExt, TryStreamExt};
use log::{info, warn};
use mime_guess::from_path;
use sanitize_filename::sanitize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

const MAX_RESUME_BYTES: usize = 5 * 1024 * 1024;
const MAX_TEXT_FIELD_BYTES: usize = 1024;

const APPLICATION_COLUMNS: &str = "a.application_id, a.job_id, a.job_name, a.company, a.user_id, \
     a.name, a.email, a.status, a.resume_file_name, a.resume_content_type, a.resume_file_id, \
     a.resume_object_name, a.created_at";

// Resume as received from the multipart form.
struct ResumeUpload {
    file_name: String,
    content_type: String,
    data: Vec<u8>,
}

// Parsed application form.
struct ApplicationForm {
    job_id: Uuid,
    status: ApplicationStatus,
    resume: ResumeUpload,
}

//Update Application Request
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct UpdateApplicationRequest {
    pub status: Option<ApplicationStatus>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UpdateApplicationRequest {
    fn is_empty(&self) -> bool {
        self.status.is_none() && self.name.is_none() && self.email.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

// Dashboard counters for an admin.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminApplicationInfo {
    pub active_jobs: i64,
    pub total_applications: i64,
    pub pending_applications: i64,
}

async fn read_field_limited(mut field: Field, limit: usize, what: &str) -> AppResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let bytes = chunk
            .map_err(|e| AppError::bad_request(format!("Failed to read {}: {}", what, e)))?;
        if data.len() + bytes.len() > limit {
            return Err(AppError::bad_request(format!(
                "{} exceeds {} bytes",
                what, limit
            )));
        }
        data.extend_from_slice(&bytes);
    }
    Ok(data)
}

async fn read_text_field(field: Field, name: &str) -> AppResult<String> {
    let bytes = read_field_limited(field, MAX_TEXT_FIELD_BYTES, name).await?;
    String::from_utf8(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|_| AppError::bad_request(format!("{} must be UTF-8 text", name)))
}

// Only PDFs are accepted, judged by file extension.
fn check_resume(file_name: &str, size: usize) -> AppResult<String> {
    let content_type = from_path(file_name).first_or_octet_stream();
    if content_type != mime::APPLICATION_PDF {
        return Err(AppError::bad_request("Resume must be a PDF file"));
    }
    if size == 0 {
        return Err(AppError::bad_request("Resume file is empty"));
    }
    Ok(content_type.to_string())
}

fn resume_object_name(user_id: Uuid, file_name: &str) -> String {
    format!("resumes/{}/{}_{}", user_id, Uuid::new_v4(), file_name)
}

async fn parse_application_form(mut payload: Multipart) -> AppResult<ApplicationForm> {
    let mut job_id = None;
    let mut status = None;
    let mut resume = None;

    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            "job_id" => {
                let raw = read_text_field(field, "job_id").await?;
                let parsed = Uuid::parse_str(&raw)
                    .map_err(|_| AppError::bad_request("job_id must be a UUID"))?;
                job_id = Some(parsed);
            }
            "status" => {
                let raw = read_text_field(field, "status").await?;
                if !raw.is_empty() {
                    let parsed = ApplicationStatus::from_str(&raw)
                        .map_err(|_| AppError::bad_request(format!("Unknown status {}", raw)))?;
                    status = Some(parsed);
                }
            }
            "resume" => {
                let file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(sanitize)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| AppError::bad_request("Resume file name is missing"))?;
                let data = read_field_limited(field, MAX_RESUME_BYTES, "resume").await?;
                let content_type = check_resume(&file_name, data.len())?;
                resume = Some(ResumeUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => {
                info!("Ignoring unexpected form field {}", other);
            }
        }
    }

    Ok(ApplicationForm {
        job_id: job_id.ok_or_else(|| AppError::bad_request("job_id is required"))?,
        status: status.unwrap_or_default(),
        resume: resume.ok_or_else(|| AppError::bad_request("resume is required"))?,
    })
}

async fn find_application(db: &Database, application_id: Uuid) -> AppResult<Application> {
    let query = format!(
        "SELECT {} FROM applications a WHERE a.application_id = $1",
        APPLICATION_COLUMNS
    );
    db.run(
        sqlx::query_as::<_, Application>(&query)
            .bind(application_id)
            .fetch_optional(db.pool()),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Application not found"))
}

async fn job_owner(db: &Database, job_id: Uuid) -> AppResult<Option<Uuid>> {
    db.run(
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(db.pool()),
    )
    .await
}

// Loads an application on one of the caller's jobs.
async fn owned_application(
    db: &Database,
    user: &AuthUser,
    application_id: Uuid,
) -> AppResult<Application> {
    let application = find_application(db, application_id).await?;
    let owner = job_owner(db, application.job_id)
        .await?
        .ok_or_else(|| AppError::not_found("Job not found"))?;
    user.require_owner(owner)?;
    Ok(application)
}

// Resume location columns of an application row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ResumeRef {
    pub resume_file_id: String,
    pub resume_object_name: String,
}

impl From<ResumeRef> for StoredObject {
    fn from(resume: ResumeRef) -> Self {
        StoredObject {
            file_id: resume.resume_file_id,
            file_name: resume.resume_object_name,
        }
    }
}

/// Best-effort removal; a failure is logged and otherwise ignored.
pub(crate) async fn discard_resume(b2: &B2Client, object: &StoredObject) {
    if let Err(e) = b2.delete_file(object).await {
        warn!("Failed to delete resume {} from B2: {}", object.file_name, e);
    }
}

//Create Application
//Create Application Input: multipart (job_id, status?, resume)
//Create Application Output: Application
pub async fn create_application(
    db: web::Data<Database>,
    b2: web::Data<B2Client>,
    user: AuthUser,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::User)?;

    let form = parse_application_form(payload).await?;
    let job = find_job(&db, form.job_id).await?;

    let object_name = resume_object_name(user.id, &form.resume.file_name);
    let stored = b2
        .upload_file(&form.resume.data, &object_name, &form.resume.content_type)
        .await?;

    let query = format!(
        "INSERT INTO applications AS a (application_id, job_id, job_name, company, user_id, name, \
         email, status, resume_file_name, resume_content_type, resume_file_id, resume_object_name) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {}",
        APPLICATION_COLUMNS
    );
    let inserted = db
        .run(
            sqlx::query_as::<_, Application>(&query)
                .bind(Uuid::new_v4())
                .bind(job.job_id)
                .bind(&job.job_name)
                .bind(&job.company)
                .bind(user.id)
                .bind(&user.name)
                .bind(&user.email)
                .bind(form.status)
                .bind(&form.resume.file_name)
                .bind(&form.resume.content_type)
                .bind(&stored.file_id)
                .bind(&stored.file_name)
                .fetch_one(db.pool()),
        )
        .await;

    match inserted {
        Ok(application) => {
            info!(
                "User {} applied to job {} ({})",
                user.id, job.job_id, application.application_id
            );
            Ok(HttpResponse::Created().json(application))
        }
        Err(e) => {
            discard_resume(&b2, &stored).await;
            Err(e)
        }
    }
}

//User Applications
pub async fn user_applications(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    user.require_role(UserRole::User)?;
    let query = format!(
        "SELECT {} FROM applications a WHERE a.user_id = $1 ORDER BY a.created_at DESC",
        APPLICATION_COLUMNS
    );
    let applications: Vec<ApplicationUserResponse> = db
        .run(
            sqlx::query_as::<_, Application>(&query)
                .bind(user.id)
                .fetch_all(db.pool()),
        )
        .await?
        .into_iter()
        .map(ApplicationUserResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(applications))
}

//Admin Applications
pub async fn admin_applications(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let query = format!(
        "SELECT {} FROM applications a JOIN jobs j ON j.job_id = a.job_id \
         WHERE j.user_id = $1 ORDER BY a.created_at DESC",
        APPLICATION_COLUMNS
    );
    let applications = db
        .run(
            sqlx::query_as::<_, Application>(&query)
                .bind(user.id)
                .fetch_all(db.pool()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(applications))
}

//Admin Info
pub async fn admin_info(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let query = "
        SELECT
            (SELECT COUNT(*) FROM jobs WHERE user_id = $1) AS active_jobs,
            (SELECT COUNT(*) FROM applications a JOIN jobs j ON j.job_id = a.job_id
              WHERE j.user_id = $1) AS total_applications,
            (SELECT COUNT(*) FROM applications a JOIN jobs j ON j.job_id = a.job_id
              WHERE j.user_id = $1 AND a.status = 'pending') AS pending_applications
    ";
    let info = db
        .run(
            sqlx::query_as::<_, AdminApplicationInfo>(query)
                .bind(user.id)
                .fetch_one(db.pool()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(info))
}

//Admin Search By Email
pub async fn admin_search_applications(
    db: web::Data<Database>,
    user: AuthUser,
    query: web::Query<EmailQuery>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let email = query
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::bad_request("email is required"))?;

    let sql = format!(
        "SELECT {} FROM applications a JOIN jobs j ON j.job_id = a.job_id \
         WHERE j.user_id = $1 AND a.email ILIKE $2 ORDER BY a.created_at DESC",
        APPLICATION_COLUMNS
    );
    let applications = db
        .run(
            sqlx::query_as::<_, Application>(&sql)
                .bind(user.id)
                .bind(like_pattern(email))
                .fetch_all(db.pool()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(applications))
}

//Update Application
//Update Application Input: Application ID, UpdateApplicationRequest
//Update Application Output: Application
pub async fn update_application(
    db: web::Data<Database>,
    user: AuthUser,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateApplicationRequest>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    if payload.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }
    let application_id = path.into_inner();
    owned_application(&db, &user, application_id).await?;

    let query = format!(
        "UPDATE applications AS a SET \
            status = COALESCE($2, a.status), \
            name = COALESCE($3, a.name), \
            email = COALESCE($4, a.email) \
         WHERE a.application_id = $1 RETURNING {}",
        APPLICATION_COLUMNS
    );
    let application = db
        .run(
            sqlx::query_as::<_, Application>(&query)
                .bind(application_id)
                .bind(payload.status)
                .bind(&payload.name)
                .bind(&payload.email)
                .fetch_optional(db.pool()),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Application not found"))?;

    Ok(HttpResponse::Ok().json(application))
}

//Download Resume
pub async fn download_resume(
    db: web::Data<Database>,
    b2: web::Data<B2Client>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let application = owned_application(&db, &user, path.into_inner()).await?;

    let data = b2.download_file(&application.resume_file_id).await?;

    Ok(HttpResponse::Ok()
        .content_type(application.resume_content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Inline,
            parameters: vec![DispositionParam::Filename(application.resume_file_name)],
        })
        .body(data))
}

//Delete Application
// Allowed for the applicant or the admin owning the job.
pub async fn delete_application(
    db: web::Data<Database>,
    b2: web::Data<B2Client>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let application = find_application(&db, path.into_inner()).await?;

    let allowed = match user.role {
        UserRole::User => application.user_id == user.id,
        UserRole::Admin => job_owner(&db, application.job_id).await? == Some(user.id),
    };
    if !allowed {
        return Err(AppError::forbidden("You cannot delete this application"));
    }

    db.run(
        sqlx::query("DELETE FROM applications WHERE application_id = $1")
            .bind(application.application_id)
            .execute(db.pool()),
    )
    .await?;

    let resume = StoredObject::from(ResumeRef {
        resume_file_id: application.resume_file_id,
        resume_object_name: application.resume_object_name,
    });
    discard_resume(&b2, &resume).await;

    info!(
        "Application {} deleted by {}",
        application.application_id, user.id
    );
    Ok(HttpResponse::Ok().json(json!({ "message": "Application deleted successfully" })))
}

//Config Application Routes
pub fn config_application_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/applications")
            .wrap(AuthMiddleware)
            .route("", web::post().to(create_application))
            .route("", web::get().to(user_applications))
            .route("/admin", web::get().to(admin_applications))
            .route("/admin/info", web::get().to(admin_info))
            .route("/admin/search", web::get().to(admin_search_applications))
            .route("/admin/{id}", web::put().to(update_application))
            .route("/admin/{id}/resume", web::get().to(download_resume))
            .route("/{id}", web::delete().to(delete_application)),
    );
}
