//! Metrics instrumentation for dynag-dns.
//!
//! All metrics are prefixed with `dynag_dns.`

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: Duration) {
    counter!(
        "dynag_dns.query.count",
        "type" => record_type.to_string(),
        "result" => result.as_str()
    )
    .increment(1);
    histogram!("dynag_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Query returned healthy records.
    Success,
    /// Name known, type not configured.
    NoData,
    /// Name not configured.
    NxDomain,
    /// Configured records all failing their checks.
    Unavailable,
    /// Unsupported class or operation.
    NotImplemented,
    /// Request without a usable question.
    Malformed,
}

impl QueryResult {
    fn as_str(self) -> &'static str {
        match self {
            QueryResult::Success => "success",
            QueryResult::NoData => "nodata",
            QueryResult::NxDomain => "nxdomain",
            QueryResult::Unavailable => "servfail",
            QueryResult::NotImplemented => "notimp",
            QueryResult::Malformed => "formerr",
        }
    }
}

/// Record the number of records in a successful answer.
pub fn record_answer_size(count: usize) {
    histogram!("dynag_dns.query.answers").record(count as f64);
}

/// Health check result kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcomeKind {
    /// Exit status 0.
    Success,
    /// Non-zero exit status or killed by a signal.
    Failure,
    /// The command could not be run.
    SpawnError,
    /// The command exceeded its timeout.
    Timeout,
}

/// Record a finished health check.
pub fn record_check(outcome: CheckOutcomeKind, duration: Duration) {
    let outcome_str = match outcome {
        CheckOutcomeKind::Success => "success",
        CheckOutcomeKind::Failure => "failure",
        CheckOutcomeKind::SpawnError => "spawn_error",
        CheckOutcomeKind::Timeout => "timeout",
    };

    counter!("dynag_dns.check.count", "outcome" => outcome_str).increment(1);
    histogram!("dynag_dns.check.duration.seconds").record(duration.as_secs_f64());
}

/// Record a record being enabled or disabled.
pub fn record_transition(enabled: bool) {
    let to = if enabled { "up" } else { "down" };
    counter!("dynag_dns.status.transition.count", "to" => to).increment(1);
}

/// Record store sizes (call periodically).
pub fn record_store_counts(names: usize, records: usize, enabled: usize) {
    gauge!("dynag_dns.store.names.count").set(names as f64);
    gauge!("dynag_dns.store.records.count").set(records as f64);
    gauge!("dynag_dns.store.records.enabled").set(enabled as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
