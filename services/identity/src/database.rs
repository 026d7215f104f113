//! Database setup for the identity service

use common::database::{DatabaseConfig, health_check, init_pool};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, migrate::Migrator};
use tracing::info;

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open the pool, check connectivity and bring the schema up to date
pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<PgPool> {
    let pool = init_pool(config).await?;

    if !health_check(&pool).await? {
        return Err(DatabaseError::Configuration(
            "Database is not reachable".to_string(),
        ));
    }

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply pending migrations
pub async fn run_migrations(pool: &PgPool) -> DatabaseResult<()> {
    info!("Running database migrations");

    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;

    info!("Database migrations applied");
    Ok(())
}
