//! Recommendation builder
//!
//! Drives one topic through Seeding, Fetching, Scoring and Persisting.
//! Source calls fan out across seeds; store writes happen afterwards, one
//! seed at a time, in seed id order.

use crate::errors::PipelineError;
use futures::stream::{self, StreamExt};
use litforge_common::config::RecommendationConfig;
use litforge_common::db::models::{Classification, Topic};
use litforge_common::errors::Result;
use litforge_common::metrics::{self, TopicMetrics};
use litforge_common::scoring::{self, ScoredCandidate};
use litforge_common::source::{AuthorKey, AuthorRecord, PaperRecord, PaperSource};
use litforge_common::Repository;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Progress of one seed through the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SeedStage {
    Seeding,
    Fetching,
    Scoring,
    Persisting,
    Completed,
    Failed,
}

impl SeedStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, SeedStage::Completed | SeedStage::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct SeedOutcome {
    pub seed_id: String,
    pub stage: SeedStage,
    /// Recommendation edges written for this seed
    pub recommended: usize,
    pub failure: Option<String>,
}

impl SeedOutcome {
    fn new(seed_id: &str) -> Self {
        Self {
            seed_id: seed_id.to_string(),
            stage: SeedStage::Seeding,
            recommended: 0,
            failure: None,
        }
    }

    /// Move forward to `next`; returns false for terminal seeds and backward moves
    fn advance(&mut self, next: SeedStage) -> bool {
        if self.stage.is_terminal() || next == SeedStage::Failed || next <= self.stage {
            return false;
        }
        self.stage = next;
        true
    }

    fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = SeedStage::Failed;
        self.failure = Some(reason.into());
        true
    }

    pub fn succeeded(&self) -> bool {
        self.stage == SeedStage::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStatus {
    Completed,
    PartiallyFailed,
}

#[derive(Debug, Clone)]
pub struct TopicOutcome {
    pub topic: String,
    pub status: TopicStatus,
    pub seeds: Vec<SeedOutcome>,
}

impl TopicOutcome {
    fn new(topic: &Topic, seeds: Vec<SeedOutcome>) -> Self {
        let status = if seeds.iter().all(SeedOutcome::succeeded) {
            TopicStatus::Completed
        } else {
            TopicStatus::PartiallyFailed
        };

        Self {
            topic: topic.name.clone(),
            status,
            seeds,
        }
    }

    pub fn completed(&self) -> usize {
        self.seeds.iter().filter(|s| s.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.seeds.len() - self.completed()
    }
}

/// Candidates and author metrics fetched for one seed
struct SeedFetch {
    candidates: Vec<PaperRecord>,
    authors: HashMap<String, AuthorRecord>,
}

impl SeedFetch {
    fn coauthor_h_index(&self, paper: &PaperRecord) -> Option<f64> {
        scoring::coauthor_h_index(
            paper
                .author_ids()
                .iter()
                .map(|id| self.authors.get(id).and_then(scoring::author_h_index)),
        )
    }
}

pub struct RecommendationBuilder {
    source: Arc<dyn PaperSource>,
    repository: Repository,
    config: RecommendationConfig,
}

impl RecommendationBuilder {
    pub fn new(
        source: Arc<dyn PaperSource>,
        repository: Repository,
        config: RecommendationConfig,
    ) -> Self {
        Self {
            source,
            repository,
            config,
        }
    }

    /// Build every stored topic in name order; stops at the first fatal error
    pub async fn build_all(&self) -> Result<Vec<TopicOutcome>> {
        let topics = self.repository.list_topics().await?;
        info!(topics = topics.len(), "Building recommendations for all topics");

        let mut outcomes = Vec::with_capacity(topics.len());
        for topic in &topics {
            outcomes.push(self.build_topic(topic).await?);
        }
        Ok(outcomes)
    }

    pub async fn build_topic_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<TopicOutcome, PipelineError> {
        let topic = self
            .repository
            .find_topic_by_name(name)
            .await?
            .ok_or_else(|| PipelineError::TopicNotFound(name.to_string()))?;

        Ok(self.build_topic(&topic).await?)
    }

    /// Run one topic to a terminal state.
    ///
    /// Seed failures are recorded in the outcome; only fatal errors are returned.
    #[instrument(skip(self, topic), fields(topic = %topic.name))]
    pub async fn build_topic(&self, topic: &Topic) -> Result<TopicOutcome> {
        let timer = TopicMetrics::start(&topic.name);

        // Seeding
        let seed_ids = self.repository.seed_papers(topic.id).await?;
        if seed_ids.is_empty() {
            info!("Topic has no seeds");
            timer.finish(0, 0);
            return Ok(TopicOutcome::new(topic, Vec::new()));
        }

        let mut seeds: BTreeMap<String, SeedOutcome> = seed_ids
            .iter()
            .map(|id| (id.clone(), SeedOutcome::new(id)))
            .collect();
        let seed_set: BTreeSet<String> = seed_ids.iter().cloned().collect();
        let negatives = self.repository.negative_examples(topic.id).await?;
        debug!(seeds = seed_ids.len(), negatives = negatives.len(), "Topic seeded");

        // Fetching
        for outcome in seeds.values_mut() {
            outcome.advance(SeedStage::Fetching);
        }

        let (seed_set_ref, negatives_ref) = (&seed_set, negatives.as_slice());
        let fetched: Vec<(String, Result<SeedFetch>)> = stream::iter(seed_ids.iter())
            .map(|seed| async move {
                let result = self.fetch_seed(seed, seed_set_ref, negatives_ref).await;
                (seed.clone(), result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut fetches: BTreeMap<String, SeedFetch> = BTreeMap::new();
        for (seed, result) in fetched {
            match result {
                Ok(fetch) => {
                    fetches.insert(seed, fetch);
                }
                Err(e) => {
                    warn!(seed = %seed, code = e.code().as_code(), error = %e, "Fetching failed");
                    if let Some(outcome) = seeds.get_mut(&seed) {
                        outcome.fail(e.to_string());
                    }
                }
            }
        }

        // Scoring & dedup
        for seed in fetches.keys() {
            if let Some(outcome) = seeds.get_mut(seed) {
                outcome.advance(SeedStage::Scoring);
            }
        }
        let ranked = assign_candidates(&fetches, &seed_set);

        // Persisting
        for (seed, fetch) in &fetches {
            let Some(outcome) = seeds.get_mut(seed) else {
                continue;
            };
            outcome.advance(SeedStage::Persisting);

            let candidates = ranked.get(seed).map(Vec::as_slice).unwrap_or(&[]);
            match self.persist_seed(topic, seed, fetch, candidates).await {
                Ok(count) => {
                    outcome.recommended = count;
                    outcome.advance(SeedStage::Completed);
                }
                Err(e) if e.is_fatal() => {
                    error!(seed = %seed, error = %e, "Persisting aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(seed = %seed, code = e.code().as_code(), error = %e, "Persisting failed");
                    outcome.fail(e.to_string());
                }
            }
        }

        let seeds: Vec<SeedOutcome> = seeds.into_values().collect();
        for outcome in &seeds {
            metrics::record_seed_outcome(&topic.name, outcome.succeeded());
        }

        let outcome = TopicOutcome::new(topic, seeds);
        let duration_secs = timer.finish(outcome.completed(), outcome.failed());
        info!(
            status = ?outcome.status,
            completed = outcome.completed(),
            failed = outcome.failed(),
            duration_secs,
            "Topic finished"
        );

        Ok(outcome)
    }

    /// Candidates for one seed; seeds and negative examples are never candidates
    async fn fetch_seed(
        &self,
        seed: &str,
        seeds: &BTreeSet<String>,
        negatives: &[String],
    ) -> Result<SeedFetch> {
        let require_date = self.config.require_publication_date;
        let candidates: Vec<PaperRecord> = self
            .source
            .fetch_recommendations(&[seed.to_string()], negatives, self.config.limit)
            .await?
            .filter(|paper| !seeds.contains(&paper.paper_id))
            .filter(|paper| !negatives.contains(&paper.paper_id))
            .filter(|paper| !require_date || paper.publication_date.is_some())
            .collect();

        let authors = self.fetch_candidate_authors(&candidates).await?;
        debug!(seed, candidates = candidates.len(), authors = authors.len(), "Seed fetched");

        Ok(SeedFetch {
            candidates,
            authors,
        })
    }

    /// Metrics for every author of the candidates; authors the source does not
    /// know get a record with unknown metrics so they can still be linked
    async fn fetch_candidate_authors(
        &self,
        candidates: &[PaperRecord],
    ) -> Result<HashMap<String, AuthorRecord>> {
        let mut names: BTreeMap<AuthorKey, String> = BTreeMap::new();
        for author in candidates.iter().flat_map(|paper| &paper.authors) {
            names
                .entry(author.key.clone())
                .or_insert_with(|| author.name.clone());
        }
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<AuthorKey> = names.keys().cloned().collect();
        let mut authors: HashMap<String, AuthorRecord> = self
            .source
            .fetch_authors(&keys)
            .await?
            .into_iter()
            .map(|author| (author.author_id.clone(), author))
            .collect();

        for (key, name) in names {
            match authors.entry(key.storage_id()) {
                Entry::Occupied(mut entry) => {
                    let author = entry.get_mut();
                    if author.name.is_none() {
                        author.name = Some(name);
                    }
                }
                Entry::Vacant(entry) => {
                    let id = entry.key().clone();
                    entry.insert(AuthorRecord::unknown(id, Some(name)));
                }
            }
        }

        Ok(authors)
    }

    #[instrument(skip(self, topic, seed, fetch, ranked), fields(topic = %topic.name, seed = %seed))]
    async fn persist_seed(
        &self,
        topic: &Topic,
        seed: &str,
        fetch: &SeedFetch,
        ranked: &[ScoredCandidate],
    ) -> Result<usize> {
        let papers: HashMap<&str, &PaperRecord> = fetch
            .candidates
            .iter()
            .map(|paper| (paper.paper_id.as_str(), paper))
            .collect();
        let kept: Vec<&PaperRecord> = ranked
            .iter()
            .filter_map(|candidate| papers.get(candidate.paper_id.as_str()).copied())
            .collect();

        let author_ids: BTreeSet<String> =
            kept.iter().flat_map(|paper| paper.author_ids()).collect();
        let authors: Vec<AuthorRecord> = author_ids
            .iter()
            .filter_map(|id| fetch.authors.get(id).cloned())
            .collect();
        if !authors.is_empty() {
            self.repository.upsert_authors(&authors).await?;
        }

        let mut recommended = Vec::with_capacity(kept.len());
        for paper in kept {
            let h_index =
                scoring::paper_h_index(paper.citation_count, fetch.coauthor_h_index(paper));
            self.repository.upsert_paper(paper, h_index).await?;
            self.repository
                .link_paper_authors(&paper.paper_id, &paper.author_ids())
                .await?;
            self.repository
                .classify_if_unclassified(
                    topic.id,
                    &paper.paper_id,
                    Classification::Recommended,
                    false,
                )
                .await?;
            recommended.push(paper.paper_id.clone());
        }

        let count = self.repository.record_recommendations(seed, &recommended).await?;
        debug!(recommended = count, "Seed persisted");
        Ok(count)
    }
}

/// Score every candidate and give each to a single seed.
///
/// A candidate equal to a seed is dropped. A candidate reached from several
/// seeds stays with the highest-scoring one; on equal scores the seed whose id
/// sorts first keeps it.
fn assign_candidates(
    fetches: &BTreeMap<String, SeedFetch>,
    seeds: &BTreeSet<String>,
) -> BTreeMap<String, Vec<ScoredCandidate>> {
    let mut owners: HashMap<&str, (&str, ScoredCandidate)> = HashMap::new();

    for (seed, fetch) in fetches {
        for paper in &fetch.candidates {
            if seeds.contains(&paper.paper_id) {
                continue;
            }

            let score = scoring::paper_relevance_score(paper, fetch.coauthor_h_index(paper), seeds);
            let candidate = ScoredCandidate::new(paper, score);

            let replace = match owners.get(paper.paper_id.as_str()) {
                Some((_, best)) => candidate.score > best.score,
                None => true,
            };
            if replace {
                owners.insert(paper.paper_id.as_str(), (seed.as_str(), candidate));
            }
        }
    }

    let mut ranked: BTreeMap<String, Vec<ScoredCandidate>> = BTreeMap::new();
    for (seed, candidate) in owners.into_values() {
        ranked.entry(seed.to_string()).or_default().push(candidate);
    }
    for candidates in ranked.values_mut() {
        scoring::rank_candidates(candidates);
    }

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use litforge_common::db::DbPool;
    use litforge_common::source::{
        RetryPolicy, RetryingSource, ScriptedFailure, SourceCall, StaticSource,
    };
    use std::time::Duration;

    fn config(require_publication_date: bool) -> RecommendationConfig {
        RecommendationConfig {
            limit: 10,
            concurrency: 2,
            require_publication_date,
        }
    }

    fn retrying(source: StaticSource) -> Arc<RetryingSource<StaticSource>> {
        let policy = RetryPolicy::new(3)
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(5))
            .with_jitter(0.0);
        Arc::new(RetryingSource::new(source, policy))
    }

    fn paper(id: &str, citations: u32) -> PaperRecord {
        PaperRecord::new(id)
            .with_citations(citations)
            .with_publication_date(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap())
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn repository() -> Repository {
        let repo = Repository::new(DbPool::in_memory().await.unwrap());
        repo.ensure_schema().await.unwrap();
        repo
    }

    async fn seeded_topic(repo: &Repository, seeds: &[&str]) -> Topic {
        let topic = repo.ensure_topic("transformers").await.unwrap();
        for seed in seeds {
            repo.upsert_paper(&PaperRecord::new(*seed), None).await.unwrap();
            repo.classify_topic_paper(topic.id, seed, Classification::Positive, true)
                .await
                .unwrap();
        }
        topic
    }

    fn builder(
        source: Arc<RetryingSource<StaticSource>>,
        repo: &Repository,
    ) -> RecommendationBuilder {
        RecommendationBuilder::new(source, repo.clone(), config(false))
    }

    #[tokio::test]
    async fn test_candidates_ranked_by_citations() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("P2", 50))
                .with_paper(paper("P3", 80))
                .with_recommendations("P1", &["P2", "P3"]),
        );

        let outcome = builder(source, &repo).build_topic(&topic).await.unwrap();

        assert_eq!(outcome.status, TopicStatus::Completed);
        assert_eq!(outcome.seeds[0].recommended, 2);
        assert_eq!(repo.recommendations("P1").await.unwrap(), ids(&["P3", "P2"]));

        let classified = repo.topic_classification(topic.id, "P3").await.unwrap().unwrap();
        assert_eq!(classified.classification(), Some(Classification::Recommended));
        assert!(!classified.use_for_recommendation);
    }

    #[tokio::test]
    async fn test_rate_limited_seed_recovers_within_budget() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        let call = SourceCall::Recommendations("P1".into());
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("P2", 5))
                .with_recommendations("P1", &["P2"])
                .fail_next(call.clone(), 2, ScriptedFailure::RateLimited),
        );

        let outcome = builder(source.clone(), &repo).build_topic(&topic).await.unwrap();

        assert_eq!(outcome.status, TopicStatus::Completed);
        assert!(outcome.seeds[0].failure.is_none());
        assert_eq!(source.inner().calls(&call), 3);
        assert_eq!(repo.recommendations("P1").await.unwrap(), ids(&["P2"]));
    }

    #[tokio::test]
    async fn test_exhausted_seed_fails_alone() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["S1", "S2", "S3"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("C1", 10))
                .with_paper(paper("C2", 20))
                .with_paper(paper("C3", 30))
                .with_recommendations("S1", &["C1"])
                .with_recommendations("S2", &["C2"])
                .with_recommendations("S3", &["C3"])
                .fail_next(
                    SourceCall::Recommendations("S2".into()),
                    3,
                    ScriptedFailure::RateLimited,
                ),
        );

        let outcome = builder(source, &repo).build_topic(&topic).await.unwrap();

        assert_eq!(outcome.status, TopicStatus::PartiallyFailed);
        assert_eq!(outcome.completed(), 2);
        let failed = outcome.seeds.iter().find(|s| s.seed_id == "S2").unwrap();
        assert_eq!(failed.stage, SeedStage::Failed);
        assert!(failed.failure.as_deref().unwrap().contains("Rate limit exceeded"));

        assert_eq!(repo.recommendations("S1").await.unwrap(), ids(&["C1"]));
        assert_eq!(repo.recommendations("S3").await.unwrap(), ids(&["C3"]));
        assert!(repo.recommendations("S2").await.unwrap().is_empty());
        assert!(repo.find_paper("C2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("B", 10))
                .with_paper(paper("A", 10))
                .with_paper(paper("C", 40))
                .with_recommendations("P1", &["B", "A", "C"]),
        );
        let builder = builder(source, &repo);

        builder.build_topic(&topic).await.unwrap();
        let first = repo.recommendations("P1").await.unwrap();
        builder.build_topic(&topic).await.unwrap();
        let second = repo.recommendations("P1").await.unwrap();

        assert_eq!(first, ids(&["C", "A", "B"]));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_seeds_are_never_recommended() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["S1", "S2"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("S1", 900))
                .with_paper(paper("S2", 800))
                .with_paper(paper("C1", 10))
                .with_paper(paper("C2", 20))
                .with_recommendations("S1", &["S1", "S2", "C1"])
                .with_recommendations("S2", &["S1", "C2"]),
        );

        builder(source, &repo).build_topic(&topic).await.unwrap();

        for seed in ["S1", "S2"] {
            let recs = repo.recommendations(seed).await.unwrap();
            assert!(!recs.iter().any(|id| id == "S1" || id == "S2"));
        }
        assert_eq!(repo.recommendations("S1").await.unwrap(), ids(&["C1"]));
        assert_eq!(repo.recommendations("S2").await.unwrap(), ids(&["C2"]));
    }

    #[tokio::test]
    async fn test_shared_candidate_kept_by_first_seed() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["S1", "S2"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("C1", 50))
                .with_paper(paper("C2", 20))
                .with_paper(paper("C3", 30))
                .with_recommendations("S1", &["C2", "C1"])
                .with_recommendations("S2", &["C1", "C3"]),
        );

        builder(source, &repo).build_topic(&topic).await.unwrap();

        assert_eq!(repo.recommendations("S1").await.unwrap(), ids(&["C1", "C2"]));
        assert_eq!(repo.recommendations("S2").await.unwrap(), ids(&["C3"]));
    }

    #[tokio::test]
    async fn test_topic_without_seeds_completes() {
        let repo = repository().await;
        let topic = repo.ensure_topic("empty").await.unwrap();
        let source = retrying(StaticSource::new());

        let outcome = builder(source, &repo).build_topic(&topic).await.unwrap();

        assert_eq!(outcome.status, TopicStatus::Completed);
        assert!(outcome.seeds.is_empty());
    }

    #[tokio::test]
    async fn test_undated_candidates_dropped_when_required() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("C1", 10))
                .with_paper(PaperRecord::new("C2").with_citations(99))
                .with_recommendations("P1", &["C1", "C2"]),
        );

        RecommendationBuilder::new(source, repo.clone(), config(true))
            .build_topic(&topic)
            .await
            .unwrap();

        assert_eq!(repo.recommendations("P1").await.unwrap(), ids(&["C1"]));
    }

    #[tokio::test]
    async fn test_existing_classification_not_downgraded() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        repo.upsert_paper(&PaperRecord::new("C1"), None).await.unwrap();
        repo.classify_topic_paper(topic.id, "C1", Classification::Positive, false)
            .await
            .unwrap();
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("C1", 10))
                .with_recommendations("P1", &["C1"]),
        );

        builder(source, &repo).build_topic(&topic).await.unwrap();

        let stored = repo.topic_classification(topic.id, "C1").await.unwrap().unwrap();
        assert_eq!(stored.classification(), Some(Classification::Positive));
        assert!(!stored.use_for_recommendation);
        assert_eq!(repo.recommendations("P1").await.unwrap(), ids(&["C1"]));
    }

    #[tokio::test]
    async fn test_candidate_authors_stored_and_scored() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("C1", 50).with_author("A1", "Ada").with_author("A9", "Unlisted"))
                .with_author(AuthorRecord {
                    author_id: "A1".into(),
                    name: Some("Ada".into()),
                    h_index: Some(10),
                    citation_count: Some(400),
                    work_citations: None,
                })
                .with_recommendations("P1", &["C1"]),
        );

        builder(source, &repo).build_topic(&topic).await.unwrap();

        let authors = repo.paper_authors("C1").await.unwrap();
        assert_eq!(authors.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["A1", "A9"]);
        assert_eq!(authors[1].h_index, None);
        assert_eq!(authors[1].name.as_deref(), Some("Unlisted"));

        // mean of known h-indices (10) scaled by min(1.5, 50/100 + 1)
        let stored = repo.find_paper("C1").await.unwrap().unwrap();
        assert_eq!(stored.h_index, Some(15.0));
    }

    #[tokio::test]
    async fn test_negative_paper_is_never_a_seed() {
        let repo = repository().await;
        let topic = repo.ensure_topic("transformers").await.unwrap();
        repo.upsert_paper(&PaperRecord::new("NEG"), None).await.unwrap();
        repo.classify_topic_paper(topic.id, "NEG", Classification::Negative, true)
            .await
            .unwrap();
        let source = StaticSource::new()
            .with_paper(paper("X", 10))
            .with_recommendations("NEG", &["X"]);
        let source = retrying(source);

        let outcome = builder(source.clone(), &repo).build_topic(&topic).await.unwrap();

        assert_eq!(outcome.status, TopicStatus::Completed);
        assert!(outcome.seeds.is_empty());
        assert_eq!(source.inner().calls(&SourceCall::Recommendations("NEG".into())), 0);
        assert!(repo.recommendations("NEG").await.unwrap().is_empty());
        assert!(repo.find_paper("X").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_negative_examples_are_never_recommended() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        repo.upsert_paper(&PaperRecord::new("N1"), None).await.unwrap();
        repo.classify_topic_paper(topic.id, "N1", Classification::Negative, false)
            .await
            .unwrap();
        let other = repo.ensure_topic("vision").await.unwrap();
        repo.upsert_paper(&PaperRecord::new("V1"), None).await.unwrap();
        repo.classify_topic_paper(other.id, "V1", Classification::Positive, true)
            .await
            .unwrap();

        let source = retrying(
            StaticSource::new()
                .with_paper(paper("N1", 90))
                .with_paper(paper("V1", 80))
                .with_paper(paper("C1", 10))
                .with_recommendations("P1", &["N1", "V1", "C1"]),
        );

        builder(source, &repo).build_topic(&topic).await.unwrap();

        assert_eq!(repo.recommendations("P1").await.unwrap(), ids(&["C1"]));
        let negative = repo.topic_classification(topic.id, "N1").await.unwrap().unwrap();
        assert_eq!(negative.classification(), Some(Classification::Negative));
        assert!(repo.topic_classification(topic.id, "V1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_only_author_stored_with_unknown_metrics() {
        let repo = repository().await;
        let topic = seeded_topic(&repo, &["P1"]).await;
        let source = retrying(
            StaticSource::new()
                .with_paper(
                    paper("C1", 0)
                        .with_author("A1", "Ada")
                        .with_unidentified_author("José García"),
                )
                .with_author(AuthorRecord {
                    author_id: "A1".into(),
                    name: Some("Ada".into()),
                    h_index: Some(6),
                    citation_count: None,
                    work_citations: None,
                })
                .with_recommendations("P1", &["C1"]),
        );

        builder(source, &repo).build_topic(&topic).await.unwrap();

        let authors = repo.paper_authors("C1").await.unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[1].id, "name:José García");
        assert_eq!(authors[1].name.as_deref(), Some("José García"));
        assert_eq!(authors[1].h_index, None);
        assert_eq!(repo.find_paper("C1").await.unwrap().unwrap().h_index, Some(6.0));
    }

    #[tokio::test]
    async fn test_unknown_topic_is_reported() {
        let repo = repository().await;
        let source = retrying(StaticSource::new());

        let err = builder(source, &repo)
            .build_topic_by_name("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_build_all_visits_every_topic() {
        let repo = repository().await;
        seeded_topic(&repo, &["P1"]).await;
        repo.ensure_topic("empty").await.unwrap();
        let source = retrying(
            StaticSource::new()
                .with_paper(paper("P2", 1))
                .with_recommendations("P1", &["P2"]),
        );

        let outcomes = builder(source, &repo).build_all().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == TopicStatus::Completed));
    }

    #[test]
    fn test_seed_never_moves_backward() {
        let mut seed = SeedOutcome::new("P1");
        assert!(seed.advance(SeedStage::Fetching));
        assert!(!seed.advance(SeedStage::Seeding));
        assert!(seed.advance(SeedStage::Completed));
        assert!(!seed.advance(SeedStage::Persisting));
        assert!(!seed.fail("late failure"));
        assert!(seed.succeeded());
    }
}
