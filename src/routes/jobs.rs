use crate::errors::{AppError, AppResult};
use crate::handlers::auth::AuthUser;
use crate::handlers::b2_storage::{B2Client, StoredObject};
use crate::handlers::db::Database;
use crate::middleware::auth_middleware::AuthMiddleware;
use crate::models::all_models::{Currency, Job, UserRole};
use crate::routes::applications::{discard_resume, ResumeRef};
use crate::routes::like_pattern;
use actix_web::{web, HttpResponse};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

pub(crate) const JOB_COLUMNS: &str = "job_id, job_name, job_type, location, salary_high, salary_low, \
     company, image_link, sponsored, user_id, currency, mandatory_requirements, \
     optional_requirements, job_description, industry, created_at";

const LATEST_JOBS_LIMIT: i64 = 4;

// Columns matched by the free-text search.
const SEARCHABLE_COLUMNS: [&str; 9] = [
    "job_name",
    "job_type",
    "location",
    "company",
    "industry",
    "job_description",
    "currency::text",
    "array_to_string(mandatory_requirements, ' ')",
    "array_to_string(optional_requirements, ' ')",
];

//Create Job Request
#[derive(Debug, Deserialize, Serialize)]
pub struct CreateJobRequest {
    pub job_name: String,
    pub job_type: String,
    pub location: String,
    pub salary_high: String,
    pub salary_low: String,
    pub company: String,
    #[serde(default)]
    pub image_link: String,
    #[serde(default)]
    pub sponsored: bool,
    pub currency: Currency,
    #[serde(default)]
    pub mandatory_requirements: Vec<String>,
    #[serde(default)]
    pub optional_requirements: Vec<String>,
    pub job_description: String,
    pub industry: String,
}

impl CreateJobRequest {
    fn validate(&self) -> AppResult<()> {
        let required = [
            ("job_name", &self.job_name),
            ("job_type", &self.job_type),
            ("location", &self.location),
            ("company", &self.company),
            ("job_description", &self.job_description),
            ("industry", &self.industry),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(AppError::bad_request(format!("{} cannot be empty", field))),
            None => Ok(()),
        }
    }
}

//Update Job Request
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct UpdateJobRequest {
    pub job_name: Option<String>,
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub salary_high: Option<String>,
    pub salary_low: Option<String>,
    pub company: Option<String>,
    pub image_link: Option<String>,
    pub sponsored: Option<bool>,
    pub currency: Option<Currency>,
    pub mandatory_requirements: Option<Vec<String>>,
    pub optional_requirements: Option<Vec<String>>,
    pub job_description: Option<String>,
    pub industry: Option<String>,
}

impl UpdateJobRequest {
    fn is_empty(&self) -> bool {
        self.job_name.is_none()
            && self.job_type.is_none()
            && self.location.is_none()
            && self.salary_high.is_none()
            && self.salary_low.is_none()
            && self.company.is_none()
            && self.image_link.is_none()
            && self.sponsored.is_none()
            && self.currency.is_none()
            && self.mandatory_requirements.is_none()
            && self.optional_requirements.is_none()
            && self.job_description.is_none()
            && self.industry.is_none()
    }
}

// Filters for GET /jobs/search, AND-combined.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobSearchQuery {
    pub job_name: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub currency: Option<String>,
    pub salary_high: Option<String>,
}

impl JobSearchQuery {
    fn filters(&self) -> Vec<(&'static str, &str)> {
        [
            ("job_name", &self.job_name),
            ("job_type", &self.job_type),
            ("location", &self.location),
            ("company", &self.company),
            ("industry", &self.industry),
            ("currency::text", &self.currency),
            ("salary_high", &self.salary_high),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (column, v))
        })
        .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTermQuery {
    pub search_term: Option<String>,
}

impl SearchTermQuery {
    fn term(&self) -> AppResult<&str> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::bad_request("searchTerm is required"))
    }
}

fn select_jobs() -> QueryBuilder<'static, Postgres> {
    QueryBuilder::new(format!("SELECT {} FROM jobs WHERE TRUE", JOB_COLUMNS))
}

// Appends `AND (col ILIKE $n OR ...)` over every searchable column.
fn push_term_filter(qb: &mut QueryBuilder<'static, Postgres>, term: &str) {
    let pattern = like_pattern(term);
    qb.push(" AND (");
    for (i, column) in SEARCHABLE_COLUMNS.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column).push(" ILIKE ").push_bind(pattern.clone());
    }
    qb.push(")");
}

async fn fetch_jobs(db: &Database, mut qb: QueryBuilder<'static, Postgres>) -> AppResult<Vec<Job>> {
    qb.push(" ORDER BY created_at DESC");
    db.run(qb.build_query_as::<Job>().fetch_all(db.pool())).await
}

pub(crate) async fn find_job(db: &Database, job_id: Uuid) -> AppResult<Job> {
    let query = format!("SELECT {} FROM jobs WHERE job_id = $1", JOB_COLUMNS);
    db.run(
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .fetch_optional(db.pool()),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Job not found"))
}

// Loads a job and checks the caller is the admin who posted it.
async fn owned_job(db: &Database, user: &AuthUser, job_id: Uuid) -> AppResult<Job> {
    let job = find_job(db, job_id).await?;
    user.require_owner(job.user_id)?;
    Ok(job)
}

//Sponsored Jobs (public)
pub async fn sponsored_jobs(db: web::Data<Database>) -> AppResult<HttpResponse> {
    let mut qb = select_jobs();
    qb.push(" AND sponsored");
    let jobs = fetch_jobs(&db, qb).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//List Jobs
pub async fn list_jobs(db: web::Data<Database>, _user: AuthUser) -> AppResult<HttpResponse> {
    let jobs = fetch_jobs(&db, select_jobs()).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//Get Job
pub async fn get_job(
    db: web::Data<Database>,
    _user: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let job = find_job(&db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(job))
}

//Search Jobs
//Search Jobs Input: JobSearchQuery
//Search Jobs Output: Vec<Job>
pub async fn search_jobs(
    db: web::Data<Database>,
    _user: AuthUser,
    query: web::Query<JobSearchQuery>,
) -> AppResult<HttpResponse> {
    let mut qb = select_jobs();
    for (column, value) in query.filters() {
        qb.push(" AND ")
            .push(column)
            .push(" ILIKE ")
            .push_bind(like_pattern(value));
    }
    let jobs = fetch_jobs(&db, qb).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//Search All Fields
pub async fn search_all_jobs(
    db: web::Data<Database>,
    _user: AuthUser,
    query: web::Query<SearchTermQuery>,
) -> AppResult<HttpResponse> {
    let term = query.term()?;
    let mut qb = select_jobs();
    push_term_filter(&mut qb, term);
    let jobs = fetch_jobs(&db, qb).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//Create Job
//Create Job Input: CreateJobRequest
//Create Job Output: Job
pub async fn create_job(
    db: web::Data<Database>,
    user: AuthUser,
    payload: web::Json<CreateJobRequest>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    payload.validate()?;

    let query = format!(
        "INSERT INTO jobs (job_id, job_name, job_type, location, salary_high, salary_low, company, \
         image_link, sponsored, user_id, currency, mandatory_requirements, optional_requirements, \
         job_description, industry) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING {}",
        JOB_COLUMNS
    );
    let job = db
        .run(
            sqlx::query_as::<_, Job>(&query)
                .bind(Uuid::new_v4())
                .bind(payload.job_name.trim())
                .bind(payload.job_type.trim())
                .bind(payload.location.trim())
                .bind(&payload.salary_high)
                .bind(&payload.salary_low)
                .bind(payload.company.trim())
                .bind(&payload.image_link)
                .bind(payload.sponsored)
                .bind(user.id)
                .bind(payload.currency)
                .bind(&payload.mandatory_requirements)
                .bind(&payload.optional_requirements)
                .bind(&payload.job_description)
                .bind(payload.industry.trim())
                .fetch_one(db.pool()),
        )
        .await?;

    info!("Admin {} created job {}", user.id, job.job_id);
    Ok(HttpResponse::Created().json(job))
}

//Admin Jobs
pub async fn admin_jobs(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let mut qb = select_jobs();
    qb.push(" AND user_id = ").push_bind(user.id);
    let jobs = fetch_jobs(&db, qb).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//Admin Latest Jobs
pub async fn admin_latest_jobs(db: web::Data<Database>, user: AuthUser) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let query = format!(
        "SELECT {} FROM jobs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        JOB_COLUMNS
    );
    let jobs: Vec<Job> = db
        .run(
            sqlx::query_as::<_, Job>(&query)
                .bind(user.id)
                .bind(LATEST_JOBS_LIMIT)
                .fetch_all(db.pool()),
        )
        .await?
        .into_iter()
        .map(Job::with_days_ago)
        .collect();
    Ok(HttpResponse::Ok().json(jobs))
}

//Admin Search
pub async fn admin_search_jobs(
    db: web::Data<Database>,
    user: AuthUser,
    query: web::Query<SearchTermQuery>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let term = query.term()?;
    let mut qb = select_jobs();
    qb.push(" AND user_id = ").push_bind(user.id);
    push_term_filter(&mut qb, term);
    let jobs = fetch_jobs(&db, qb).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

//Update Job
//Update Job Input: Job ID, UpdateJobRequest
//Update Job Output: Job
pub async fn update_job(
    db: web::Data<Database>,
    user: AuthUser,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateJobRequest>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    if payload.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }
    let job_id = path.into_inner();
    owned_job(&db, &user, job_id).await?;

    let query = format!(
        "UPDATE jobs SET \
            job_name = COALESCE($2, job_name), \
            job_type = COALESCE($3, job_type), \
            location = COALESCE($4, location), \
            salary_high = COALESCE($5, salary_high), \
            salary_low = COALESCE($6, salary_low), \
            company = COALESCE($7, company), \
            image_link = COALESCE($8, image_link), \
            sponsored = COALESCE($9, sponsored), \
            currency = COALESCE($10, currency), \
            mandatory_requirements = COALESCE($11, mandatory_requirements), \
            optional_requirements = COALESCE($12, optional_requirements), \
            job_description = COALESCE($13, job_description), \
            industry = COALESCE($14, industry) \
         WHERE job_id = $1 RETURNING {}",
        JOB_COLUMNS
    );
    let job = db
        .run(
            sqlx::query_as::<_, Job>(&query)
                .bind(job_id)
                .bind(&payload.job_name)
                .bind(&payload.job_type)
                .bind(&payload.location)
                .bind(&payload.salary_high)
                .bind(&payload.salary_low)
                .bind(&payload.company)
                .bind(&payload.image_link)
                .bind(payload.sponsored)
                .bind(payload.currency)
                .bind(&payload.mandatory_requirements)
                .bind(&payload.optional_requirements)
                .bind(&payload.job_description)
                .bind(&payload.industry)
                .fetch_optional(db.pool()),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Job not found"))?;

    Ok(HttpResponse::Ok().json(job))
}

//Delete Job
// Applications go with the job, and their resumes are removed from B2 afterwards.
pub async fn delete_job(
    db: web::Data<Database>,
    b2: web::Data<B2Client>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    user.require_role(UserRole::Admin)?;
    let job_id = path.into_inner();
    owned_job(&db, &user, job_id).await?;

    let resumes = db
        .run(async {
            let mut tx = db.pool().begin().await?;
            let resumes = sqlx::query_as::<_, ResumeRef>(
                "DELETE FROM applications WHERE job_id = $1 \
                 RETURNING resume_file_id, resume_object_name",
            )
            .bind(job_id)
            .fetch_all(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM jobs WHERE job_id = $1")
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(resumes)
        })
        .await?;

    for resume in resumes {
        discard_resume(&b2, &StoredObject::from(resume)).await;
    }

    info!("Admin {} deleted job {}", user.id, job_id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Job deleted successfully" })))
}

//Config Job Routes
// Static segments are registered ahead of `/{id}`.
pub fn config_job_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/jobs")
            .route("/sponsored", web::get().to(sponsored_jobs))
            .service(
                web::scope("")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(list_jobs))
                    .route("/create", web::post().to(create_job))
                    .route("/search", web::get().to(search_jobs))
                    .route("/search/all", web::get().to(search_all_jobs))
                    .route("/admin", web::get().to(admin_jobs))
                    .route("/admin/latest", web::get().to(admin_latest_jobs))
                    .route("/admin/search", web::get().to(admin_search_jobs))
                    .route("/admin/{id}", web::put().to(update_job))
                    .route("/admin/{id}", web::delete().to(delete_job))
                    .route("/{id}", web::get().to(get_job)),
            ),
    );
}
