//! Semantic Scholar client
//!
//! Wire format of the Graph and Recommendations APIs, mapped onto typed records.
//! Requests are paced by a token bucket; retries are left to [`super::RetryingSource`].

use super::{
    validate_external_id, validate_seed_ids, AuthorKey, AuthorRecord, AuthorRef, PaperRecord,
    PaperSource, Recommendations,
};
use crate::config::SourceConfig;
use crate::errors::{AppError, Result};
use crate::{metrics, AUTHOR_FIELDS, PAPER_FIELDS};
use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Token bucket shared by every request of one client
pub type SourceRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Maximum ids per author batch request
const AUTHOR_BATCH_SIZE: usize = 100;

/// Recommendation pool queried for single-seed requests
const RECOMMENDATION_POOL: &str = "all-cs";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaper {
    paper_id: Option<String>,
    url: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    journal: Option<RawJournal>,
    publication_date: Option<String>,
    citation_count: Option<i64>,
    authors: Option<Vec<RawAuthorRef>>,
}

#[derive(Debug, Deserialize)]
struct RawJournal {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuthorRef {
    author_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuthor {
    author_id: Option<String>,
    name: Option<String>,
    h_index: Option<i64>,
    citation_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecommendations {
    #[serde(default)]
    recommended_papers: Vec<serde_json::Value>,
}

fn non_negative(value: Option<i64>) -> Option<u32> {
    value.map(|v| u32::try_from(v.max(0)).unwrap_or(u32::MAX))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawPaper {
    /// Typed record, or `None` when the paper id is missing
    fn into_record(self) -> Option<PaperRecord> {
        let paper_id = non_blank(self.paper_id)?;

        let authors = self
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                let (key, name) = match (non_blank(a.author_id), non_blank(a.name)) {
                    (Some(id), Some(name)) => (AuthorKey::Source(id), name),
                    (Some(id), None) => (AuthorKey::Source(id.clone()), id),
                    (None, Some(name)) => (AuthorKey::Name(name.clone()), name),
                    (None, None) => return None,
                };
                Some(AuthorRef { key, name })
            })
            .collect();

        Some(PaperRecord {
            paper_id,
            title: self.title,
            abstract_text: self.abstract_text,
            journal: self.journal.and_then(|j| non_blank(j.name)),
            url: self.url,
            publication_date: self
                .publication_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            citation_count: non_negative(self.citation_count),
            authors,
        })
    }
}

impl RawAuthor {
    fn into_record(self) -> Option<AuthorRecord> {
        Some(AuthorRecord {
            author_id: non_blank(self.author_id)?,
            name: non_blank(self.name),
            h_index: non_negative(self.h_index),
            citation_count: non_negative(self.citation_count),
            work_citations: None,
        })
    }
}

/// Semantic Scholar API client
pub struct SemanticScholarClient {
    client: reqwest::Client,
    graph_base_url: String,
    recommendations_base_url: String,
    api_key: Option<String>,
    limiter: Arc<SourceRateLimiter>,
}

impl SemanticScholarClient {
    /// Create a client from configuration
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("litforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let per_second =
            NonZeroU32::new(config.requests_per_second).ok_or_else(|| AppError::Configuration {
                message: "source.requests_per_second must be positive".to_string(),
            })?;

        Ok(Self {
            client,
            graph_base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            recommendations_base_url: config
                .recommendations_base_url
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Send one paced request and classify the response.
    ///
    /// `Ok(None)` means the source reported the record as missing or malformed.
    async fn send(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<Option<reqwest::Response>> {
        self.limiter.until_ready().await;

        let started = Instant::now();
        let result = self.with_key(request).send().await;
        metrics::record_source_request(endpoint, started.elapsed().as_secs_f64());

        let response = result?;
        let status = response.status();

        match status {
            s if s.is_success() => Ok(Some(response)),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                debug!(endpoint, status = status.as_u16(), "Source reported no record");
                Ok(None)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(AppError::RateLimited { retry_after })
            }
            s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
                Err(AppError::Transient {
                    message: format!("{} returned {}", endpoint, s),
                })
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Upstream {
                    status: s.as_u16(),
                    message: body,
                })
            }
        }
    }
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    #[instrument(skip(self))]
    async fn fetch_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>> {
        validate_external_id(paper_id)?;

        let url = format!("{}/graph/v1/paper/{}", self.graph_base_url, paper_id);
        let request = self.client.get(&url).query(&[("fields", PAPER_FIELDS)]);

        let Some(response) = self.send("paper", request).await? else {
            return Ok(None);
        };

        let body = response.bytes().await?;
        match serde_json::from_slice::<RawPaper>(&body) {
            Ok(raw) => Ok(raw.into_record()),
            Err(e) => {
                warn!(paper_id, error = %e, "Malformed paper record, treating as missing");
                Ok(None)
            }
        }
    }

    #[instrument(
        skip(self, seed_ids, negative_ids),
        fields(seeds = seed_ids.len(), negatives = negative_ids.len())
    )]
    async fn fetch_recommendations(
        &self,
        seed_ids: &[String],
        negative_ids: &[String],
        limit: usize,
    ) -> Result<Recommendations> {
        validate_seed_ids(seed_ids)?;
        negative_ids
            .iter()
            .try_for_each(|id| validate_external_id(id))?;
        let limit_param = limit.to_string();

        // The single-paper endpoint takes no negative examples
        let request = match seed_ids {
            [seed] if negative_ids.is_empty() => self
                .client
                .get(format!(
                    "{}/recommendations/v1/papers/forpaper/{}",
                    self.recommendations_base_url, seed
                ))
                .query(&[
                    ("fields", PAPER_FIELDS),
                    ("limit", limit_param.as_str()),
                    ("from", RECOMMENDATION_POOL),
                ]),
            seeds => self
                .client
                .post(format!(
                    "{}/recommendations/v1/papers/",
                    self.recommendations_base_url
                ))
                .query(&[("fields", PAPER_FIELDS), ("limit", limit_param.as_str())])
                .json(&serde_json::json!({
                    "positivePaperIds": seeds,
                    "negativePaperIds": negative_ids,
                })),
        };

        let Some(response) = self.send("recommendations", request).await? else {
            return Ok(Recommendations::empty());
        };

        let body = response.bytes().await?;
        let raw: RawRecommendations =
            serde_json::from_slice(&body).map_err(|e| AppError::Upstream {
                status: 200,
                message: format!("undecodable recommendations payload: {}", e),
            })?;

        let papers: Vec<PaperRecord> = raw
            .recommended_papers
            .into_iter()
            .filter_map(|value| serde_json::from_value::<RawPaper>(value).ok())
            .filter_map(RawPaper::into_record)
            .take(limit)
            .collect();

        debug!(count = papers.len(), "Recommendations fetched");
        Ok(Recommendations::new(papers))
    }

    #[instrument(skip(self, authors), fields(authors = authors.len()))]
    async fn fetch_authors(&self, authors: &[AuthorKey]) -> Result<Vec<AuthorRecord>> {
        let mut records = Vec::with_capacity(authors.len());
        let mut remote_ids = Vec::new();

        for key in authors {
            match key {
                AuthorKey::Source(id) if id.trim().is_empty() => {}
                AuthorKey::Source(id) => remote_ids.push(id.clone()),
                AuthorKey::Name(name) => {
                    records.push(AuthorRecord::unknown(key.storage_id(), Some(name.clone())))
                }
            }
        }

        let url = format!("{}/graph/v1/author/batch", self.graph_base_url);
        for batch in remote_ids.chunks(AUTHOR_BATCH_SIZE) {
            let request = self
                .client
                .post(&url)
                .query(&[("fields", AUTHOR_FIELDS)])
                .json(&serde_json::json!({ "ids": batch }));

            let Some(response) = self.send("author_batch", request).await? else {
                warn!(batch = batch.len(), "Author batch rejected, metrics unknown");
                continue;
            };

            let body = response.bytes().await?;
            let raw: Vec<Option<RawAuthor>> =
                serde_json::from_slice(&body).map_err(|e| AppError::Upstream {
                    status: 200,
                    message: format!("undecodable author batch payload: {}", e),
                })?;

            records.extend(raw.into_iter().flatten().filter_map(RawAuthor::into_record));
        }

        Ok(records)
    }

    fn name(&self) -> &str {
        "semantic-scholar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SemanticScholarClient {
        let config = SourceConfig {
            graph_base_url: server.uri(),
            recommendations_base_url: server.uri(),
            requests_per_second: 100,
            ..SourceConfig::default()
        };
        SemanticScholarClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_paper_maps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/P1"))
            .and(query_param("fields", PAPER_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "paperId": "P1",
                "title": "Attention Is All You Need",
                "journal": {"name": "NeurIPS"},
                "publicationDate": "2017-06-12",
                "citationCount": 100,
                "authors": [
                    {"authorId": "A1", "name": "Ashish Vaswani"},
                    {"authorId": null, "name": "Noam Shazeer"}
                ]
            })))
            .mount(&server)
            .await;

        let paper = client_for(&server).fetch_paper("P1").await.unwrap().unwrap();

        assert_eq!(paper.paper_id, "P1");
        assert_eq!(paper.journal.as_deref(), Some("NeurIPS"));
        assert_eq!(paper.citation_count, Some(100));
        assert_eq!(paper.abstract_text, None);
        assert_eq!(paper.url, None);
        assert_eq!(
            paper.publication_date,
            NaiveDate::from_ymd_opt(2017, 6, 12)
        );
        assert_eq!(
            paper.author_keys(),
            vec![
                AuthorKey::Source("A1".to_string()),
                AuthorKey::Name("Noam Shazeer".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_paper_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client_for(&server).fetch_paper("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_fetch_paper_malformed_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/P1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        assert!(client_for(&server).fetch_paper("P1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_paper_without_id_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/P1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"title": "x"})),
            )
            .mount(&server)
            .await;

        assert!(client_for(&server).fetch_paper("P1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_response_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/P1"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_paper("P1").await.unwrap_err();
        match err {
            AppError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/P1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_paper("P1").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_single_seed_uses_forpaper_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recommendations/v1/papers/forpaper/P1"))
            .and(query_param("limit", "2"))
            .and(query_param("from", "all-cs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recommendedPapers": [
                    {"paperId": "P2", "citationCount": 50},
                    {"title": "no id"},
                    {"paperId": "P3", "citationCount": -4},
                    {"paperId": "P4"}
                ]
            })))
            .mount(&server)
            .await;

        let recs: Vec<PaperRecord> = client_for(&server)
            .fetch_recommendations(&["P1".to_string()], &[], 2)
            .await
            .unwrap()
            .collect();

        let ids: Vec<&str> = recs.iter().map(|p| p.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P3"]);
        assert_eq!(recs[1].citation_count, Some(0));
    }

    #[tokio::test]
    async fn test_multiple_seeds_post_positive_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/recommendations/v1/papers/"))
            .and(body_json(serde_json::json!({
                "positivePaperIds": ["P1", "P9"],
                "negativePaperIds": []
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recommendedPapers": [{"paperId": "P5"}]
            })))
            .mount(&server)
            .await;

        let recs: Vec<PaperRecord> = client_for(&server)
            .fetch_recommendations(&["P1".to_string(), "P9".to_string()], &[], 10)
            .await
            .unwrap()
            .collect();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].paper_id, "P5");
    }

    #[tokio::test]
    async fn test_negative_examples_are_posted_with_a_single_seed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/recommendations/v1/papers/"))
            .and(body_json(serde_json::json!({
                "positivePaperIds": ["P1"],
                "negativePaperIds": ["N1", "N2"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "recommendedPapers": [{"paperId": "P7"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let negatives = vec!["N1".to_string(), "N2".to_string()];
        let recs: Vec<PaperRecord> = client_for(&server)
            .fetch_recommendations(&["P1".to_string()], &negatives, 10)
            .await
            .unwrap()
            .collect();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].paper_id, "P7");
    }

    #[tokio::test]
    async fn test_invalid_negative_id_is_rejected_before_io() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .fetch_recommendations(&["P1".to_string()], &["a b".to_string()], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_empty_seed_set_is_rejected_before_io() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .fetch_recommendations(&[], &[], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_author_batch_skips_nulls_and_resolves_names_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graph/v1/author/batch"))
            .and(body_json(serde_json::json!({"ids": ["1741101", "999"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "authorId": "1741101",
                    "name": "Oren Etzioni",
                    "hIndex": 90,
                    "citationCount": 40000
                },
                null
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/graph/v1/author/batch"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let keys = vec![
            AuthorKey::Source("1741101".to_string()),
            AuthorKey::Name("José García".to_string()),
            AuthorKey::Name("O'Neil".to_string()),
            AuthorKey::Source("999".to_string()),
        ];
        let authors = client_for(&server).fetch_authors(&keys).await.unwrap();

        assert_eq!(authors.len(), 3);
        let named = authors
            .iter()
            .find(|a| a.author_id == "name:José García")
            .unwrap();
        assert_eq!(named.name.as_deref(), Some("José García"));
        assert_eq!(named.h_index, None);
        let known = authors.iter().find(|a| a.author_id == "1741101").unwrap();
        assert_eq!(known.h_index, Some(90));
    }
}
