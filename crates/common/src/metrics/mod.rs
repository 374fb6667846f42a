//! Metrics and observability utilities
//!
//! Prometheus-style metric names for the pipeline, registered once at startup.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all LitForge metrics
pub const METRICS_PREFIX: &str = "litforge";

/// Register all metric descriptions
pub fn register_metrics() {
    // Source metrics
    describe_counter!(
        format!("{}_source_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total requests sent to the bibliographic source"
    );

    describe_counter!(
        format!("{}_source_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Source requests retried after a retryable failure"
    );

    describe_counter!(
        format!("{}_source_rate_limited_total", METRICS_PREFIX),
        Unit::Count,
        "Source responses that signalled rate limiting"
    );

    describe_histogram!(
        format!("{}_source_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Source request latency in seconds"
    );

    // Store metrics
    describe_counter!(
        format!("{}_papers_upserted_total", METRICS_PREFIX),
        Unit::Count,
        "Paper rows upserted"
    );

    describe_counter!(
        format!("{}_authors_upserted_total", METRICS_PREFIX),
        Unit::Count,
        "Author rows upserted"
    );

    describe_counter!(
        format!("{}_recommendations_recorded_total", METRICS_PREFIX),
        Unit::Count,
        "Recommendation edges written"
    );

    // Builder metrics
    describe_counter!(
        format!("{}_seeds_completed_total", METRICS_PREFIX),
        Unit::Count,
        "Seeds whose recommendations were persisted"
    );

    describe_counter!(
        format!("{}_seeds_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Seeds that failed after retry exhaustion or an integrity error"
    );

    describe_histogram!(
        format!("{}_topic_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Recommendation build latency per topic in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Record one request to the source
pub fn record_source_request(endpoint: &'static str, duration_secs: f64) {
    counter!(
        format!("{}_source_requests_total", METRICS_PREFIX),
        "endpoint" => endpoint
    )
    .increment(1);

    histogram!(
        format!("{}_source_request_duration_seconds", METRICS_PREFIX),
        "endpoint" => endpoint
    )
    .record(duration_secs);
}

/// Record a retry decision
pub fn record_source_retry(rate_limited: bool) {
    counter!(format!("{}_source_retries_total", METRICS_PREFIX)).increment(1);
    if rate_limited {
        counter!(format!("{}_source_rate_limited_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record upserted papers
pub fn record_papers_upserted(count: u64) {
    counter!(format!("{}_papers_upserted_total", METRICS_PREFIX)).increment(count);
}

/// Record upserted authors
pub fn record_authors_upserted(count: u64) {
    counter!(format!("{}_authors_upserted_total", METRICS_PREFIX)).increment(count);
}

/// Record written recommendation edges
pub fn record_recommendations(count: u64) {
    counter!(format!("{}_recommendations_recorded_total", METRICS_PREFIX)).increment(count);
}

/// Record a seed outcome
pub fn record_seed_outcome(topic: &str, succeeded: bool) {
    let name = if succeeded {
        format!("{}_seeds_completed_total", METRICS_PREFIX)
    } else {
        format!("{}_seeds_failed_total", METRICS_PREFIX)
    };
    counter!(name, "topic" => topic.to_string()).increment(1);
}

/// Helper to record per-topic build metrics
pub struct TopicMetrics {
    start: Instant,
    topic: String,
}

impl TopicMetrics {
    /// Start tracking a topic build
    pub fn start(topic: &str) -> Self {
        Self {
            start: Instant::now(),
            topic: topic.to_string(),
        }
    }

    /// Record build completion; returns the build duration in seconds
    pub fn finish(self, seeds_completed: usize, seeds_failed: usize) -> f64 {
        let duration = self.start.elapsed().as_secs_f64();
        let status = if seeds_failed == 0 { "completed" } else { "partially_failed" };

        histogram!(
            format!("{}_topic_duration_seconds", METRICS_PREFIX),
            "topic" => self.topic,
            "status" => status
        )
        .record(duration);

        tracing::debug!(seeds_completed, seeds_failed, duration, "Topic metrics recorded");
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        record_source_request("paper", 0.01);
        record_source_retry(true);
        record_seed_outcome("graphs", false);
    }

    #[test]
    fn test_topic_metrics() {
        let metrics = TopicMetrics::start("graphs");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(metrics.finish(2, 1) > 0.0);
    }
}
