//! PostgreSQL access for the compliance service.
//!
//! Runtime-checked `sqlx` queries grouped by domain. Every query is scoped by
//! `org_id` except the token lookups used by the public trust portal. Methods
//! that touch more than one row run in a single transaction.

mod people;
mod registers;
mod trust_access;
mod trust_portal;

pub use trust_access::{GrantIssue, NewAccessRequest, NdaSignature, ReviewDecision};
pub use trust_portal::TrustSettingsUpdate;

use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{AuditLog, NewAuditLog};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        tracing::info!(
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to PostgreSQL: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Failed to connect to database: {}", e))
            })?;
        tracing::info!("Successfully connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        Ok(self.pool.begin().await?)
    }

    // ==================== Audit ====================

    pub async fn list_audit_logs(
        &self,
        org_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLog>, AppError> {
        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE org_id = $1 AND entity_type = $2 AND entity_id = $3
            ORDER BY created_at
            "#,
        )
        .bind(org_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}

/// Write an audit entry inside the caller's transaction.
async fn insert_audit_log(conn: &mut PgConnection, log: &NewAuditLog) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, org_id, member_id, entity_type, entity_id, action, description, data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(log.org_id)
    .bind(log.member_id)
    .bind(log.entity_type)
    .bind(log.entity_id)
    .bind(log.action)
    .bind(&log.description)
    .bind(&log.data)
    .execute(conn)
    .await?;
    Ok(())
}

/// Pick `base`, or `base-2`, `base-3`, ... whichever is not in `taken`.
fn first_free(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.iter().any(|t| t == candidate))
        .unwrap_or_else(|| format!("{}-{}", base, Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_free_appends_counter() {
        assert_eq!(first_free("acme", &[]), "acme");
        let taken = vec!["acme".to_string(), "acme-2".to_string()];
        assert_eq!(first_free("acme", &taken), "acme-3");
    }
}
