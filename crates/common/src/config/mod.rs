//! Configuration management for LitForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::errors::{AppError, Result};
use crate::source::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Bibliographic source configuration
    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,

    /// Recommendation builder configuration
    #[serde(default)]
    #[validate(nested)]
    pub recommendation: RecommendationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DatabaseConfig {
    /// Database URL (postgres:// or sqlite:)
    #[validate(length(min = 1))]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1))]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SourceConfig {
    /// Graph API base URL
    #[serde(default = "default_graph_base_url")]
    #[validate(url)]
    pub graph_base_url: String,

    /// Recommendations API base URL
    #[serde(default = "default_recommendations_base_url")]
    #[validate(url)]
    pub recommendations_base_url: String,

    /// API key sent as x-api-key (optional)
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,

    /// Outgoing requests per second
    #[serde(default = "default_requests_per_second")]
    #[validate(range(min = 1))]
    pub requests_per_second: u32,

    /// Maximum attempts per request, first attempt included
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff growth factor
    #[serde(default = "default_backoff_multiplier")]
    #[validate(range(min = 1.0))]
    pub backoff_multiplier: f64,

    /// Jitter applied to each delay (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RecommendationConfig {
    /// Candidates requested and kept per seed
    #[serde(default = "default_recommendation_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: usize,

    /// Seeds fetched concurrently
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1))]
    pub concurrency: usize,

    /// Drop candidates the source reports without a publication date
    #[serde(default = "default_require_publication_date")]
    pub require_publication_date: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_graph_base_url() -> String { "https://api.semanticscholar.org".to_string() }
fn default_recommendations_base_url() -> String { "https://api.semanticscholar.org".to_string() }
fn default_source_timeout() -> u64 { 30 }
fn default_requests_per_second() -> u32 { 1 }
fn default_max_attempts() -> u32 { 4 }
fn default_initial_backoff() -> u64 { 1_000 }
fn default_max_backoff() -> u64 { 60_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_jitter() -> f64 { 0.3 }
fn default_recommendation_limit() -> usize { 10 }
fn default_concurrency() -> usize { 2 }
fn default_require_publication_date() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "litforge".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            graph_base_url: default_graph_base_url(),
            recommendations_base_url: default_recommendations_base_url(),
            api_key: None,
            timeout_secs: default_source_timeout(),
            requests_per_second: default_requests_per_second(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            limit: default_recommendation_limit(),
            concurrency: default_concurrency(),
            require_publication_date: default_require_publication_date(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl SourceConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_initial_interval(Duration::from_millis(self.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__DATABASE__URL=postgres://...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load (from `path` when given) and validate
    pub fn load_validated(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };

        config.validate().map_err(|e| AppError::Configuration {
            message: format!("invalid configuration: {}", e),
        })?;

        if config.database.min_connections > config.database.max_connections {
            return Err(AppError::Configuration {
                message: "database.min_connections exceeds database.max_connections".to_string(),
            });
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/litforge".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            source: SourceConfig::default(),
            recommendation: RecommendationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.recommendation.limit, 10);
        assert_eq!(config.source.max_attempts, 4);
        assert!(config.recommendation.require_publication_date);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.source.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = SourceConfig::default().retry_policy();
        assert_eq!(policy.max_attempts(), 4);
    }
}
