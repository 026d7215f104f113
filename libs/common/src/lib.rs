//! Shared building blocks for the workspace services
//!
//! - [`database`]: PostgreSQL pool configuration and health checks
//! - [`error`]: the database error type, with unique violations split out
//! - [`response`]: the `{status, message, result}` JSON envelope
//! - [`telemetry`]: `tracing` subscriber setup
//!
//! ```rust,no_run
//! use common::{database::{DatabaseConfig, health_check, init_pool}, telemetry::init_tracing};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_tracing("info")?;
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     assert!(health_check(&pool).await?);
//!     Ok(())
//! }
//! ```

pub mod database;
pub mod error;
pub mod response;
pub mod telemetry;
