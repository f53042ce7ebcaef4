//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions.

use crate::domain::Role;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all MedVault metrics
pub const METRICS_PREFIX: &str = "medvault";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s - analysis requests run inline
];

/// Buckets for inference latency (hosted models are slow)
pub const INFERENCE_BUCKETS: &[f64] = &[
    0.250,
    0.500,
    1.000,
    2.000,
    5.000,
    10.00,
    20.00,
    30.00,
    60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_access_decisions_total", METRICS_PREFIX),
        Unit::Count,
        "Access policy decisions by resource, role and outcome"
    );

    describe_counter!(
        format!("{}_upload_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Upload records entering a status"
    );

    describe_counter!(
        format!("{}_analyses_total", METRICS_PREFIX),
        Unit::Count,
        "Analyses reaching a terminal status"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time from analysis start to terminal status"
    );

    describe_counter!(
        format!("{}_inference_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total inference provider requests"
    );

    describe_histogram!(
        format!("{}_inference_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Inference provider latency in seconds"
    );

    describe_counter!(
        format!("{}_report_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Analysis reports that could not be rendered or stored"
    );

    describe_counter!(
        format!("{}_stale_analyses_swept_total", METRICS_PREFIX),
        Unit::Count,
        "Processing analyses demoted to failed by the sweeper"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_access_decision(resource: &'static str, role: Role, allowed: bool) {
    counter!(
        format!("{}_access_decisions_total", METRICS_PREFIX),
        "resource" => resource,
        "role" => role.as_str(),
        "decision" => if allowed { "allow" } else { "deny" }
    )
    .increment(1);
}

pub fn record_upload_transition(status: &'static str) {
    counter!(
        format!("{}_upload_transitions_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);
}

pub fn record_analysis_outcome(status: &'static str, duration_secs: f64) {
    counter!(
        format!("{}_analyses_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        "status" => status
    )
    .record(duration_secs);
}

pub fn record_inference(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_inference_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_inference_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

pub fn record_report_failure() {
    counter!(format!("{}_report_failures_total", METRICS_PREFIX)).increment(1);
}

pub fn record_sweep(demoted: usize) {
    counter!(format!("{}_stale_analyses_swept_total", METRICS_PREFIX)).increment(demoted as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, INFERENCE_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        let metrics = RequestMetrics::start("GET", "/api/patients");
        metrics.finish(200);
        record_access_decision("patient", Role::ConsultingDoctor, false);
        record_analysis_outcome("completed", 1.5);
        record_inference(0.8, "mock", true);
        // No recorder installed: calls are no-ops and must not panic
    }
}
