//! Bibliographic source abstraction
//!
//! Provides a unified interface over the external paper API:
//! - Typed paper and author records, validated before they reach scoring or storage
//! - The Semantic Scholar HTTP client
//! - A retry policy applied uniformly through [`RetryingSource`]
//! - An in-memory source for tests and offline runs

mod mock;
mod retry;
mod semantic_scholar;

pub use mock::{ScriptedFailure, SourceCall, StaticSource};
pub use retry::{RetryPolicy, RetryPredicate, RetryingSource};
pub use semantic_scholar::{SemanticScholarClient, SourceRateLimiter};

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stored id prefix of authors the source lists without an id
const NAME_KEY_PREFIX: &str = "name:";

/// How an author is identified
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthorKey {
    /// Id assigned by the source
    Source(String),
    /// Listed without an id; resolved locally and never sent to the source
    Name(String),
}

impl AuthorKey {
    /// Id the author is stored and linked under
    pub fn storage_id(&self) -> String {
        match self {
            AuthorKey::Source(id) => id.clone(),
            AuthorKey::Name(name) => format!("{}{}", NAME_KEY_PREFIX, name),
        }
    }

    pub fn from_storage_id(id: &str) -> Self {
        match id.strip_prefix(NAME_KEY_PREFIX) {
            Some(name) => AuthorKey::Name(name.to_string()),
            None => AuthorKey::Source(id.to_string()),
        }
    }
}

/// Author as listed on a paper, in authorship order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub key: AuthorKey,
    pub name: String,
}

impl AuthorRef {
    pub fn author_id(&self) -> String {
        self.key.storage_id()
    }
}

/// Paper metadata as reported by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub url: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub citation_count: Option<u32>,
    pub authors: Vec<AuthorRef>,
}

impl PaperRecord {
    /// Minimal record with only an id, the rest unknown
    pub fn new(paper_id: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: None,
            abstract_text: None,
            journal: None,
            url: None,
            publication_date: None,
            citation_count: None,
            authors: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_citations(mut self, citation_count: u32) -> Self {
        self.citation_count = Some(citation_count);
        self
    }

    pub fn with_publication_date(mut self, date: NaiveDate) -> Self {
        self.publication_date = Some(date);
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.authors.push(AuthorRef {
            key: AuthorKey::Source(author_id.into()),
            name: name.into(),
        });
        self
    }

    /// Author listed by name only
    pub fn with_unidentified_author(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.authors.push(AuthorRef {
            key: AuthorKey::Name(name.clone()),
            name,
        });
        self
    }

    /// Author keys in authorship order, first occurrence kept
    pub fn author_keys(&self) -> Vec<AuthorKey> {
        let mut seen = std::collections::HashSet::new();
        self.authors
            .iter()
            .filter(|a| seen.insert(&a.key))
            .map(|a| a.key.clone())
            .collect()
    }

    /// Stored author ids in authorship order, first occurrence kept
    pub fn author_ids(&self) -> Vec<String> {
        self.author_keys().iter().map(AuthorKey::storage_id).collect()
    }
}

/// Author metrics as reported by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    /// Stored id, see [`AuthorKey::storage_id`]
    pub author_id: String,
    pub name: Option<String>,
    pub h_index: Option<u32>,
    pub citation_count: Option<u32>,
    /// Per-work citation counts, when the source provides them
    pub work_citations: Option<Vec<u32>>,
}

impl AuthorRecord {
    /// Record with unknown metrics
    pub fn unknown(author_id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            author_id: author_id.into(),
            name,
            h_index: None,
            citation_count: None,
            work_citations: None,
        }
    }
}

/// Ordered recommendation results of one source call
///
/// Consumed once; iterate again by calling the source again.
#[derive(Debug)]
pub struct Recommendations {
    inner: std::vec::IntoIter<PaperRecord>,
}

impl Recommendations {
    pub fn new(papers: Vec<PaperRecord>) -> Self {
        Self {
            inner: papers.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for Recommendations {
    type Item = PaperRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Recommendations {}

/// Trait for bibliographic sources
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Fetch one paper; `None` when the source has no usable record
    async fn fetch_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>>;

    /// Fetch papers related to the seed set and unlike the negative examples,
    /// ordered by the source, at most `limit`
    async fn fetch_recommendations(
        &self,
        seed_ids: &[String],
        negative_ids: &[String],
        limit: usize,
    ) -> Result<Recommendations>;

    /// Fetch author metrics.
    ///
    /// Name-keyed authors resolve to unknown metrics without a request; source
    /// authors the source does not know are omitted.
    async fn fetch_authors(&self, authors: &[AuthorKey]) -> Result<Vec<AuthorRecord>>;

    /// Source name for logs
    fn name(&self) -> &str;
}

/// Reject ids the source cannot address
pub fn validate_external_id(id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains('/') || id.chars().any(char::is_whitespace) {
        return Err(AppError::Validation {
            message: format!("invalid external id {:?}", id),
            field: Some("id".to_string()),
        });
    }
    Ok(())
}

/// Reject an empty seed set or any invalid seed id
pub fn validate_seed_ids(seed_ids: &[String]) -> Result<()> {
    if seed_ids.is_empty() {
        return Err(AppError::Validation {
            message: "seed set is empty".to_string(),
            field: Some("seed_ids".to_string()),
        });
    }
    seed_ids.iter().try_for_each(|id| validate_external_id(id))
}
