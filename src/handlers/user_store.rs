use crate::errors::{conflict_on_unique, AppError};
use crate::handlers::db::Database;
use crate::models::all_models::{User, UserRole};
use async_trait::async_trait;
use uuid::Uuid;

const EMAIL_TAKEN: &str = "Email already registered";

const USER_COLUMNS: &str =
    "user_id, name, email, password_hash, role, phone, address, company_name, created_at";

/// Fields for a brand-new account; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub company_name: Option<String>,
}

/// Partial settings update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.password_hash.is_none()
    }
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// Inserts the user; a duplicate email is `Conflict`.
    async fn insert(&self, user: NewUser) -> Result<User, AppError>;

    /// Applies `changes`; returns `None` when no such user exists.
    async fn update(&self, user_id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError>;
}

pub struct PgUserStore {
    db: Database,
}

impl PgUserStore {
    pub fn new(db: Database) -> Self {
        PgUserStore { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        self.db
            .run(
                sqlx::query_as::<_, User>(&query)
                    .bind(email)
                    .fetch_optional(self.db.pool()),
            )
            .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        self.db
            .run(
                sqlx::query_as::<_, User>(&query)
                    .bind(user_id)
                    .fetch_optional(self.db.pool()),
            )
            .await
    }

    async fn insert(&self, user: NewUser) -> Result<User, AppError> {
        let query = format!(
            "INSERT INTO users (user_id, name, email, password_hash, role, phone, address, company_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            USER_COLUMNS
        );
        let result = self
            .db
            .run(
                sqlx::query_as::<_, User>(&query)
                    .bind(Uuid::new_v4())
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .bind(user.role)
                    .bind(&user.phone)
                    .bind(&user.address)
                    .bind(&user.company_name)
                    .fetch_one(self.db.pool()),
            )
            .await;

        match result {
            Err(AppError::Database(e)) => Err(conflict_on_unique(e, EMAIL_TAKEN)),
            other => other,
        }
    }

    async fn update(&self, user_id: Uuid, changes: UserChanges) -> Result<Option<User>, AppError> {
        let query = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                phone = COALESCE($4, phone), \
                address = COALESCE($5, address), \
                password_hash = COALESCE($6, password_hash) \
             WHERE user_id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let result = self
            .db
            .run(
                sqlx::query_as::<_, User>(&query)
                    .bind(user_id)
                    .bind(&changes.name)
                    .bind(&changes.email)
                    .bind(&changes.phone)
                    .bind(&changes.address)
                    .bind(&changes.password_hash)
                    .fetch_optional(self.db.pool()),
            )
            .await;

        match result {
            Err(AppError::Database(e)) => Err(conflict_on_unique(e, EMAIL_TAKEN)),
            other => other,
        }
    }
}
