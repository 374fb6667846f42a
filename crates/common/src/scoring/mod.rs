//! Citation and h-index scoring
//!
//! Pure functions; identical inputs always produce identical outputs.
//! An unknown h-index stays `None` and is never folded into zero before
//! the final weighting step.

use crate::source::{AuthorRecord, PaperRecord};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Weight of the paper's own citation count in the relevance score
pub const CITATION_WEIGHT: f64 = 1.0;

/// Weight of the aggregate co-author h-index in the relevance score
pub const H_INDEX_WEIGHT: f64 = 0.5;

/// Upper bound of the citation factor applied to the paper h-index score
pub const CITATION_FACTOR_CAP: f64 = 1.5;

/// Classic h-index: largest k such that k works have at least k citations each
pub fn h_index(citations: &[u32]) -> u32 {
    let mut sorted = citations.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    sorted
        .iter()
        .enumerate()
        .take_while(|(rank, &cited)| cited as usize > *rank)
        .count() as u32
}

/// H-index of an author: the source value when reported, else computed from
/// per-work citations, else unknown
pub fn author_h_index(author: &AuthorRecord) -> Option<f64> {
    author
        .h_index
        .map(f64::from)
        .or_else(|| author.work_citations.as_deref().map(|c| f64::from(h_index(c))))
}

/// Mean of the known h-indices of a paper's authors; `None` when none is known
pub fn coauthor_h_index<I>(author_h_indices: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = author_h_indices
        .into_iter()
        .flatten()
        .fold((0.0, 0u32), |(sum, count), h| (sum + h, count + 1));

    (count > 0).then(|| sum / f64::from(count))
}

/// Derived paper score: co-author h-index scaled by a capped citation factor,
/// rounded to two decimals
pub fn paper_h_index(citation_count: Option<u32>, coauthor_h_index: Option<f64>) -> Option<f64> {
    let base = coauthor_h_index?;
    let factor = match citation_count {
        Some(c) if c > 0 => (f64::from(c) / 100.0 + 1.0).min(CITATION_FACTOR_CAP),
        _ => 1.0,
    };
    Some(((base * factor) * 100.0).round() / 100.0)
}

/// Relevance of a candidate for a topic's seed set.
///
/// Citation count dominates; an unknown co-author h-index contributes nothing.
/// A seed is never its own candidate and scores zero.
pub fn paper_relevance_score(
    paper: &PaperRecord,
    coauthor_h_index: Option<f64>,
    seeds: &BTreeSet<String>,
) -> f64 {
    if seeds.contains(&paper.paper_id) {
        return 0.0;
    }

    let citations = f64::from(paper.citation_count.unwrap_or(0));
    let h = coauthor_h_index.unwrap_or(0.0).max(0.0);

    CITATION_WEIGHT * citations + H_INDEX_WEIGHT * h
}

/// Candidate with its relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub paper_id: String,
    pub citation_count: u32,
    pub score: f64,
}

impl ScoredCandidate {
    pub fn new(paper: &PaperRecord, score: f64) -> Self {
        Self {
            paper_id: paper.paper_id.clone(),
            citation_count: paper.citation_count.unwrap_or(0),
            score,
        }
    }
}

/// Total ranking order: score desc, citation count desc, id asc
pub fn ranking_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.citation_count.cmp(&a.citation_count))
        .then_with(|| a.paper_id.cmp(&b.paper_id))
}

/// Sort candidates into ranking order
pub fn rank_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(ranking_order);
}
