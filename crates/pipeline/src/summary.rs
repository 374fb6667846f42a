//! End-of-run summary and exit status

use crate::builder::TopicOutcome;
use crate::ingest::IngestOutcome;
use crate::refresh::RefreshReport;
use std::fmt;
use std::process::ExitCode;

/// Exit status when some seeds or papers failed
pub const PARTIAL_FAILURE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// What failed, e.g. `topic/seed` or a paper id
    pub scope: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    pub fn from_topics(outcomes: &[TopicOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.succeeded += outcome.completed();
            summary.failures.extend(outcome.seeds.iter().filter(|s| !s.succeeded()).map(|seed| {
                Failure {
                    scope: format!("{}/{}", outcome.topic, seed.seed_id),
                    reason: seed.failure.clone().unwrap_or_else(|| "unknown".to_string()),
                }
            }));
        }
        summary
    }

    pub fn from_ingest(outcome: &IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Ingested { .. } => Self {
                succeeded: 1,
                ..Self::default()
            },
            IngestOutcome::Skipped { .. } => Self {
                skipped: 1,
                ..Self::default()
            },
        }
    }

    pub fn from_refresh(report: &RefreshReport) -> Self {
        Self {
            succeeded: report.updated,
            skipped: report.skipped,
            failures: report
                .failed
                .iter()
                .map(|(paper_id, reason)| Failure {
                    scope: paper_id.clone(),
                    reason: reason.clone(),
                })
                .collect(),
        }
    }

    /// 0 when nothing failed, otherwise [`PARTIAL_FAILURE`]
    pub fn status(&self) -> u8 {
        if self.failures.is_empty() {
            0
        } else {
            PARTIAL_FAILURE
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded: {}, skipped: {}, failed: {}",
            self.succeeded,
            self.skipped,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.scope, failure.reason)?;
        }
        Ok(())
    }
}
