use database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection pool could not be created: {0}")]
    PoolCreation(#[source] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid API alias format: '{0}'")]
    InvalidAliasFormat(String),

    #[error("Invalid parameters: {0}")]
    Validation(String),

    #[error("Invalid expires: {0}")]
    InvalidExpiration(String),

    #[error("This API has expired.")]
    Expired,

    #[error("This API is not available.")]
    Disabled,

    #[error("Alias '{0}' already exists.")]
    Conflict(String),

    #[error("Registration failed and was rolled back: {0}")]
    Transaction(#[source] DbError),

    #[error("Storage error: {0}")]
    Storage(#[source] DbError),

    #[error("API '{alias}' declares {expected} placeholder(s) but has no stored parameters.")]
    InconsistentDefinition { alias: String, expected: usize },

    #[error("Access denied: {0}")]
    Unauthorized(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl From<DbError> for GatewayError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ConnectionConfigError(msg) => GatewayError::Config(msg),
            DbError::PoolCreation { .. } => GatewayError::PoolCreation(e),
            DbError::ControlPlaneUninitialized | DbError::UnknownTenant(_) => {
                GatewayError::NotFound(e.to_string())
            }
            DbError::MissingTenantKey => GatewayError::Validation(e.to_string()),
            DbError::Conflict(alias) => GatewayError::Conflict(alias),
            DbError::Transaction(_) => GatewayError::Transaction(e),
            DbError::Query(_) | DbError::JsonError(_) | DbError::Decode(_) | DbError::Timeout(_) => {
                GatewayError::Storage(e)
            }
        }
    }
}
