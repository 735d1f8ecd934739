use crate::errors::AppError;
use log::{error, info};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;

/// Handle to the Postgres store, built once at startup and shared by every handler.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    timeout: Duration,
}

fn pool_options(timeout: Duration) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(timeout)
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
}

impl Database {
    pub async fn connect(database_url: &str, timeout: Duration) -> Result<Self, sqlx::Error> {
        let pool = pool_options(timeout).connect(database_url).await?;
        Ok(Database { pool, timeout })
    }

    /// Builds the pool without opening a connection until the first query.
    pub fn connect_lazy(database_url: &str, timeout: Duration) -> Result<Self, sqlx::Error> {
        let pool = pool_options(timeout).connect_lazy(database_url)?;
        Ok(Database { pool, timeout })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs one store operation, abandoning it once the configured timeout elapses.
    pub async fn run<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::internal(format!(
                "database operation timed out after {:?}",
                self.timeout
            ))),
        }
    }

    pub async fn check_connection(&self) -> bool {
        match self.pool.acquire().await {
            Ok(_) => true,
            Err(e) => {
                error!("Database connection check failed: {}", e);
                false
            }
        }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Drains the pool; used when startup aborts after connecting.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
