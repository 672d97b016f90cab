use core_types::PoolClass;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Failed to create the {class} connection pool '{name}': {reason}")]
    PoolCreation {
        class: PoolClass,
        name: String,
        reason: String,
    },

    #[error("No initialization was made for the control-plane database.")]
    ControlPlaneUninitialized,

    #[error("Invalid database key: no tenant pool is registered under '{0}'.")]
    UnknownTenant(String),

    #[error("A tenant key is required to look up a tenant pool.")]
    MissingTenantKey,

    #[error("Alias '{0}' already exists.")]
    Conflict(String),

    #[error("Transaction failed and was rolled back: {0}")]
    Transaction(sqlx::Error),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    #[error("Timed out after {0:?} waiting for the database.")]
    Timeout(Duration),
}
