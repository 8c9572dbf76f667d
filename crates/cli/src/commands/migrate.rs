//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! rw-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `RIGHT_WATER_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection
//!   string for the storefront
//!
//! # Migration Files
//!
//! Storefront migrations live in `crates/storefront/migrations/` and are
//! embedded into the binary at build time.

use thiserror::Error;

use super::database_url;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let database_url = database_url().ok_or(MigrationError::MissingEnvVar(
        "RIGHT_WATER_DATABASE_URL",
    ))?;

    tracing::info!("Connecting to storefront database...");
    let pool = right_water_storefront::db::create_pool(&database_url).await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
