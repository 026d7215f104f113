//! PostgreSQL audit log

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::AuditLog;
use crate::models::NewLogEntry;

/// Audit log backed by the `logs` table
#[derive(Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, entry: NewLogEntry) -> DatabaseResult<()> {
        debug!("Audit {}: {}", entry.user_id, entry.action);

        sqlx::query(
            r#"
            INSERT INTO logs (id, user_id, ip, action)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(&entry.ip)
        .bind(&entry.action)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(())
    }
}
