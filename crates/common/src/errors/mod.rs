//! Error types for LitForge
//!
//! Provides a single error enum for the pipeline with:
//! - Distinct variants for each failure mode of the source, store, and builder
//! - Machine-readable error codes
//! - Retry and fatality predicates used by the retry policy and the run loop

use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Resource errors (4xxx)
    NotFound,

    // Integrity errors (5xxx)
    IntegrityError,

    // Rate limiting (6xxx)
    RateLimited,
    RateLimitExceeded,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    TransientError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::NotFound => 4001,

            ErrorCode::IntegrityError => 5001,

            ErrorCode::RateLimited => 6001,
            ErrorCode::RateLimitExceeded => 6002,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::TransientError => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    // Referential integrity
    #[error("Integrity violation on {entity}: {message}")]
    Integrity { entity: String, message: String },

    // Source rate limiting
    #[error("Rate limited by source")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    // External service errors
    #[error("Transient source failure: {message}")]
    Transient { message: String },

    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Build an integrity error for the given entity
    pub fn integrity(entity: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Integrity {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Integrity { .. } => ErrorCode::IntegrityError,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            AppError::Transient { .. } => ErrorCode::TransientError,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a retry of the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::RateLimited { .. } | AppError::Transient { .. })
    }

    /// Whether this error must abort the whole run rather than a single seed or paper
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseConnection { .. } | AppError::Configuration { .. }
        )
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::ForeignKeyConstraintViolation(message)) = err.sql_err() {
            return AppError::Integrity {
                entity: "foreign key".to_string(),
                message,
            };
        }

        match err {
            DbErr::Conn(e) => AppError::DatabaseConnection {
                message: e.to_string(),
            },
            DbErr::ConnectionAcquire(e) => AppError::DatabaseConnection {
                message: e.to_string(),
            },
            other => AppError::Database(other),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            AppError::Transient {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            AppError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            AppError::Transient {
                message: err.to_string(),
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
