//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] errors. At the gateway boundary they are converted into the
//! backend-neutral [`PersistenceError`].

use roadpulse_core::persistence::PersistenceError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value does not map back onto a domain type.
    #[error("Invalid stored value for {column}: {value}")]
    InvalidValue {
        /// Column the value was read from.
        column: &'static str,
        /// The offending value.
        value: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for PersistenceError {
    fn from(err: DbError) -> Self {
        Self::backend("postgres", err)
    }
}
