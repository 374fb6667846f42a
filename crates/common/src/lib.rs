//! LitForge Common Library
//!
//! Shared code for the LitForge pipeline including:
//! - Database entities and the reconciliation repository
//! - The bibliographic source client and its retry policy
//! - Relevance and h-index scoring
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod scoring;
pub mod source;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use source::{PaperSource, RetryPolicy, RetryingSource};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fields requested from the paper endpoints
pub const PAPER_FIELDS: &str =
    "paperId,url,authors,journal,title,abstract,publicationDate,citationCount";

/// Fields requested from the author batch endpoint
pub const AUTHOR_FIELDS: &str = "authorId,name,hIndex,citationCount";
