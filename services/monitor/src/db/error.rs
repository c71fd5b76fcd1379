//! Database error types.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to connect to the database.
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// Failed to execute a query.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// Migration directory not found in the current environment.
    #[error("migration directory not found; tried {tried}. Last error: {last_error}. Run from repo root or services/monitor.")]
    MigrationDirNotFound { tried: String, last_error: String },

    /// A stored row could not be mapped onto the model.
    #[error("invalid {table}.{column} value: {message}")]
    InvalidRow {
        table: &'static str,
        column: &'static str,
        message: String,
    },

    /// The store refused the operation without reaching the database.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
