//! H-index refresh
//!
//! Re-fetches the authors of every stored paper and recomputes the paper's
//! derived h-index. A failing paper is logged and counted; only fatal errors
//! stop the pass.

use litforge_common::db::models::Paper;
use litforge_common::errors::Result;
use litforge_common::scoring;
use litforge_common::source::{AuthorKey, PaperSource};
use litforge_common::Repository;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: usize,
    /// Papers without linked authors
    pub skipped: usize,
    /// (paper id, reason)
    pub failed: Vec<(String, String)>,
}

pub struct HIndexRefresher {
    source: Arc<dyn PaperSource>,
    repository: Repository,
}

impl HIndexRefresher {
    pub fn new(source: Arc<dyn PaperSource>, repository: Repository) -> Self {
        Self { source, repository }
    }

    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<RefreshReport> {
        let papers = self.repository.list_papers_with_authors().await?;
        info!(papers = papers.len(), "Refreshing h-indices");

        let mut report = RefreshReport::default();
        for (paper, author_ids) in papers {
            if author_ids.is_empty() {
                report.skipped += 1;
                continue;
            }

            match self.refresh_paper(&paper, &author_ids).await {
                Ok(h_index) => {
                    debug!(paper_id = %paper.id, h_index = ?h_index, "Paper refreshed");
                    report.updated += 1;
                }
                Err(e) if e.is_fatal() => {
                    error!(paper_id = %paper.id, error = %e, "Refresh aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        paper_id = %paper.id,
                        code = e.code().as_code(),
                        error = %e,
                        "Refresh failed"
                    );
                    report.failed.push((paper.id.clone(), e.to_string()));
                }
            }
        }

        info!(
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed.len(),
            "H-index refresh finished"
        );
        Ok(report)
    }

    async fn refresh_paper(&self, paper: &Paper, author_ids: &[String]) -> Result<Option<f64>> {
        let keys: Vec<AuthorKey> = author_ids
            .iter()
            .map(|id| AuthorKey::from_storage_id(id))
            .collect();
        let fetched = self.source.fetch_authors(&keys).await?;
        self.repository.upsert_authors(&fetched).await?;

        // Stored rows keep metrics the source no longer reports
        let authors = self.repository.paper_authors(&paper.id).await?;
        let coauthor_h = scoring::coauthor_h_index(authors.iter().map(|a| a.h_index));
        let citations = paper.citation_count.and_then(|c| u32::try_from(c).ok());
        let h_index = scoring::paper_h_index(citations, coauthor_h);

        self.repository.update_paper_h_index(&paper.id, h_index).await?;
        Ok(h_index)
    }
}
