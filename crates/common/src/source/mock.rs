//! In-memory source for testing and offline runs

use super::{
    validate_external_id, validate_seed_ids, AuthorKey, AuthorRecord, PaperRecord, PaperSource,
    Recommendations,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Source call a scripted failure applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceCall {
    Paper(String),
    Recommendations(String),
    Authors,
}

/// Failure returned in place of a real response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    RateLimited,
    Transient,
    Upstream(u16),
}

impl ScriptedFailure {
    fn into_error(self) -> AppError {
        match self {
            ScriptedFailure::RateLimited => AppError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            },
            ScriptedFailure::Transient => AppError::Transient {
                message: "scripted connection reset".to_string(),
            },
            ScriptedFailure::Upstream(status) => AppError::Upstream {
                status,
                message: "scripted upstream failure".to_string(),
            },
        }
    }
}

/// Source backed by fixed maps, with optional scripted failures
#[derive(Default)]
pub struct StaticSource {
    papers: HashMap<String, PaperRecord>,
    authors: HashMap<String, AuthorRecord>,
    recommendations: HashMap<String, Vec<String>>,
    failures: Mutex<HashMap<SourceCall, VecDeque<ScriptedFailure>>>,
    calls: Mutex<HashMap<SourceCall, usize>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paper(mut self, paper: PaperRecord) -> Self {
        self.papers.insert(paper.paper_id.clone(), paper);
        self
    }

    pub fn with_author(mut self, author: AuthorRecord) -> Self {
        self.authors.insert(author.author_id.clone(), author);
        self
    }

    /// Candidates returned for `seed`, in source order; ids must also be registered papers
    pub fn with_recommendations(mut self, seed: &str, candidate_ids: &[&str]) -> Self {
        self.recommendations.insert(
            seed.to_string(),
            candidate_ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    /// Fail the next `times` calls of the given kind
    pub fn fail_next(self, call: SourceCall, times: usize, failure: ScriptedFailure) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures
                .entry(call)
                .or_default()
                .extend(std::iter::repeat(failure).take(times));
        }
        self
    }

    /// Number of calls received of the given kind, failed ones included
    pub fn calls(&self, call: &SourceCall) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(call).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn observe(&self, call: SourceCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(call.clone()).or_insert(0) += 1;
        }

        let scripted = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&call).and_then(VecDeque::pop_front));

        match scripted {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaperSource for StaticSource {
    async fn fetch_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>> {
        validate_external_id(paper_id)?;
        self.observe(SourceCall::Paper(paper_id.to_string()))?;
        Ok(self.papers.get(paper_id).cloned())
    }

    async fn fetch_recommendations(
        &self,
        seed_ids: &[String],
        negative_ids: &[String],
        limit: usize,
    ) -> Result<Recommendations> {
        validate_seed_ids(seed_ids)?;
        for seed in seed_ids {
            self.observe(SourceCall::Recommendations(seed.clone()))?;
        }

        let excluded: HashSet<&str> = seed_ids
            .iter()
            .chain(negative_ids)
            .map(String::as_str)
            .collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut papers = Vec::new();

        let candidates = seed_ids
            .iter()
            .filter_map(|seed| self.recommendations.get(seed))
            .flatten();
        for id in candidates {
            if papers.len() >= limit {
                break;
            }
            if excluded.contains(id.as_str()) || !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(paper) = self.papers.get(id) {
                papers.push(paper.clone());
            }
        }

        Ok(Recommendations::new(papers))
    }

    async fn fetch_authors(&self, authors: &[AuthorKey]) -> Result<Vec<AuthorRecord>> {
        self.observe(SourceCall::Authors)?;
        Ok(authors
            .iter()
            .filter_map(|key| match key {
                AuthorKey::Source(id) => self.authors.get(id).cloned(),
                AuthorKey::Name(name) => {
                    Some(AuthorRecord::unknown(key.storage_id(), Some(name.clone())))
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}
