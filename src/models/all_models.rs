use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

//  USERS & ROLES

#[derive(
    Debug, Serialize, Deserialize, sqlx::Type, Display, EnumString, PartialEq, Eq, Clone, Copy,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub company_name: Option<String>,
    pub created_at: NaiveDateTime,
}

// Public view of a user, returned at login.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

//  JOBS

#[derive(
    Debug, Serialize, Deserialize, sqlx::Type, Display, EnumString, PartialEq, Eq, Clone, Copy,
)]
#[sqlx(type_name = "currency")]
#[serde(try_from = "String")]
#[strum(ascii_case_insensitive)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    AUD,
    JPY,
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::from_str(value.trim()).map_err(|_| format!("unsupported currency {}", value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub job_id: Uuid,
    pub job_name: String,
    pub job_type: String,
    pub location: String,
    pub salary_high: String,
    pub salary_low: String,
    pub company: String,
    pub image_link: String,
    pub sponsored: bool,
    pub user_id: Uuid,
    pub currency: Currency,
    pub mandatory_requirements: Vec<String>,
    pub optional_requirements: Vec<String>,
    pub job_description: String,
    pub industry: String,
    pub created_at: NaiveDateTime,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_ago: Option<i64>,
}

impl Job {
    /// Whole days elapsed since the job was posted.
    pub fn with_days_ago(mut self) -> Self {
        let elapsed = Utc::now().naive_utc() - self.created_at;
        self.days_ago = Some(elapsed.num_days());
        self
    }
}

//  APPLICATIONS

#[derive(
    Debug, Serialize, Deserialize, sqlx::Type, Display, EnumString, PartialEq, Eq, Clone, Copy,
)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(try_from = "String")]
#[strum(ascii_case_insensitive)]
pub enum ApplicationStatus {
    Pending,
    Reviewed,
    Interview,
    Accepted,
    Rejected,
}

impl TryFrom<String> for ApplicationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ApplicationStatus::from_str(value.trim())
            .map_err(|_| format!("unknown application status {}", value))
    }
}

impl Default for ApplicationStatus {
    fn default() -> Self {
        ApplicationStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub application_id: Uuid,
    pub job_id: Uuid,
    pub job_name: String,
    pub company: String,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub status: ApplicationStatus,
    pub resume_file_name: String,
    pub resume_content_type: String,
    #[serde(skip_serializing)]
    pub resume_file_id: String,
    #[serde(skip_serializing)]
    pub resume_object_name: String,
    pub created_at: NaiveDateTime,
}

// What an applicant sees about their own applications.
#[derive(Debug, Serialize)]
pub struct ApplicationUserResponse {
    pub application_id: Uuid,
    pub job_id: Uuid,
    pub status: ApplicationStatus,
    pub job_name: String,
    pub company: String,
}

impl From<Application> for ApplicationUserResponse {
    fn from(app: Application) -> Self {
        ApplicationUserResponse {
            application_id: app.application_id,
            job_id: app.job_id,
            status: app.status,
            job_name: app.job_name,
            company: app.company,
        }
    }
}

//  BOOKMARKS & SEARCH LOGS

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Bookmark {
    pub bookmark_id: Uuid,
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SearchLog {
    pub search_log_id: Uuid,
    pub user_id: Uuid,
    pub job_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_uses_lowercase_names_everywhere() {
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert_eq!(UserRole::from_str("user").unwrap(), UserRole::User);
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"admin\"");
        assert!(serde_json::from_str::<UserRole>("\"sponsor\"").is_err());
    }

    #[test]
    fn currency_accepts_any_case() {
        assert_eq!(Currency::from_str("usd").unwrap(), Currency::USD);
        assert_eq!(serde_json::from_str::<Currency>("\"eur\"").unwrap(), Currency::EUR);
        assert_eq!(serde_json::from_str::<Currency>("\"uSd\"").unwrap(), Currency::USD);
        assert_eq!(serde_json::from_str::<Currency>("\"eUR\"").unwrap(), Currency::EUR);
        assert!(serde_json::from_str::<Currency>("\"btc\"").is_err());
        assert_eq!(serde_json::to_string(&Currency::GBP).unwrap(), "\"GBP\"");
        assert!(Currency::from_str("BTC").is_err());
    }

    #[test]
    fn application_status_is_capitalized_on_output() {
        let status: ApplicationStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, ApplicationStatus::Pending);
        assert_eq!(
            serde_json::from_str::<ApplicationStatus>("\"inTERview\"").unwrap(),
            ApplicationStatus::Interview
        );
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"Pending\"");
        assert_eq!(
            ApplicationStatus::from_str("INTERVIEW").unwrap(),
            ApplicationStatus::Interview
        );
    }

    #[test]
    fn days_ago_counts_whole_days() {
        let job = Job {
            job_id: Uuid::new_v4(),
            job_name: "Backend Engineer".into(),
            job_type: "Full-time".into(),
            location: "Nairobi".into(),
            salary_high: "5000".into(),
            salary_low: "3000".into(),
            company: "Acme".into(),
            image_link: String::new(),
            sponsored: false,
            user_id: Uuid::new_v4(),
            currency: Currency::USD,
            mandatory_requirements: vec!["Rust".into()],
            optional_requirements: vec![],
            job_description: "Build things".into(),
            industry: "Software".into(),
            created_at: Utc::now().naive_utc() - chrono::Duration::hours(50),
            days_ago: None,
        };
        assert_eq!(job.with_days_ago().days_ago, Some(2));
    }
}
