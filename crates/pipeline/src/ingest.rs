//! Seed ingestion
//!
//! Fetches one paper and its authors, derives metrics, and stores the paper
//! in a topic with the requested classification.

use litforge_common::db::models::Classification;
use litforge_common::errors::Result;
use litforge_common::scoring;
use litforge_common::source::{validate_external_id, AuthorRecord, PaperRecord, PaperSource};
use litforge_common::Repository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested {
        paper_id: String,
        authors: usize,
        h_index: Option<f64>,
    },
    /// The source has no usable record for the paper
    Skipped { paper_id: String },
}

pub struct SeedIngestor {
    source: Arc<dyn PaperSource>,
    repository: Repository,
}

impl SeedIngestor {
    pub fn new(source: Arc<dyn PaperSource>, repository: Repository) -> Self {
        Self { source, repository }
    }

    /// Store one paper in a topic.
    ///
    /// Only positive papers seed recommendations; `use_for_recommendation` is
    /// ignored for any other classification.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn ingest_seed(
        &self,
        topic_name: &str,
        paper_id: &str,
        classification: Classification,
        use_for_recommendation: bool,
    ) -> Result<IngestOutcome> {
        validate_external_id(paper_id)?;
        let use_for_recommendation =
            use_for_recommendation && classification == Classification::Positive;

        let Some(paper) = self.source.fetch_paper(paper_id).await? else {
            warn!("Paper not found at source, skipping");
            return Ok(IngestOutcome::Skipped {
                paper_id: paper_id.to_string(),
            });
        };

        let authors = self.fetch_authors(&paper).await?;
        let topic = self.repository.ensure_topic(topic_name).await?;

        let stored = self.repository.upsert_authors(&authors).await?;
        let coauthor_h = scoring::coauthor_h_index(stored.iter().map(|a| a.h_index));
        let h_index = scoring::paper_h_index(paper.citation_count, coauthor_h);

        self.repository.upsert_paper(&paper, h_index).await?;
        self.repository
            .link_paper_authors(&paper.paper_id, &paper.author_ids())
            .await?;
        self.repository
            .classify_topic_paper(topic.id, &paper.paper_id, classification, use_for_recommendation)
            .await?;

        info!(
            topic_id = topic.id,
            authors = stored.len(),
            h_index = ?h_index,
            "Seed ingested"
        );

        Ok(IngestOutcome::Ingested {
            paper_id: paper.paper_id,
            authors: stored.len(),
            h_index,
        })
    }

    /// Author records in authorship order, unknown metrics for authors the source omits
    async fn fetch_authors(&self, paper: &PaperRecord) -> Result<Vec<AuthorRecord>> {
        let keys = paper.author_keys();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut fetched: HashMap<String, AuthorRecord> = self
            .source
            .fetch_authors(&keys)
            .await?
            .into_iter()
            .map(|author| (author.author_id.clone(), author))
            .collect();

        let mut seen = HashSet::new();
        let mut authors = Vec::with_capacity(keys.len());
        for author_ref in &paper.authors {
            if !seen.insert(&author_ref.key) {
                continue;
            }
            let id = author_ref.author_id();
            let name = Some(author_ref.name.clone());
            let author = match fetched.remove(&id) {
                Some(mut author) => {
                    if author.name.is_none() {
                        author.name = name;
                    }
                    author
                }
                None => AuthorRecord::unknown(id, name),
            };
            authors.push(author);
        }

        Ok(authors)
    }
}
