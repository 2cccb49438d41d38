//! Application-wide error types.

use thiserror::Error;

use crate::youtube::UpstreamError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the sync service.
///
/// Upstream failures only reach this type when a whole operation gives up;
/// per-channel call failures travel inside sync outcomes instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity_type} '{id}' not found")]
    NotFound { entity_type: String, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream API error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
