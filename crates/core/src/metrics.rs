//! Prometheus metrics for the solving pool.
//!
//! This module provides metrics for:
//! - Task lifecycle (submissions, solutions, failures, durations)
//! - Throttling (no-slot and rate-limit backoffs)
//! - Gateway requests (latency, transport errors)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Task Lifecycle Metrics
// =============================================================================

/// Submissions total by result.
pub static SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("captchapool_submissions_total", "Total task submissions"),
        &["result"], // "accepted", "no_slot", "rate_limited", "fatal", "unclassified", "transport"
    )
    .unwrap()
});

/// Solutions delivered to the consumer.
pub static SOLUTIONS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "captchapool_solutions_delivered_total",
        "Total solutions published to the solution channel",
    )
    .unwrap()
});

/// Solutions discarded because the fixed target was already met.
pub static SOLUTIONS_SURPLUS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "captchapool_solutions_surplus_total",
        "Solutions discarded after the target count was reached",
    )
    .unwrap()
});

/// Task failures by kind.
pub static TASK_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("captchapool_task_failures_total", "Total failed tasks"),
        &["kind"], // FatalKind name or "contract_violation"
    )
    .unwrap()
});

/// Time from submission to terminal state.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "captchapool_task_duration_seconds",
            "Duration from submission to solution or failure",
        )
        .buckets(vec![5.0, 10.0, 15.0, 20.0, 30.0, 45.0, 60.0, 120.0, 300.0]),
        &["result"], // "solved", "failed"
    )
    .unwrap()
});

// =============================================================================
// Throttle Metrics
// =============================================================================

/// Throttle events by reason.
pub static THROTTLE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "captchapool_throttle_events_total",
            "Total backoff signals received from the service",
        ),
        &["reason"], // "no_slot", "brief", "short", "medium", "long"
    )
    .unwrap()
});

// =============================================================================
// Gateway Metrics
// =============================================================================

/// Gateway request latency by endpoint.
pub static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "captchapool_gateway_request_duration_seconds",
            "Latency of requests to the solving service",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint"], // "submit", "poll", "balance"
    )
    .unwrap()
});

/// Transport errors by endpoint.
pub static TRANSPORT_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "captchapool_transport_errors_total",
            "Total transport-level failures talking to the service",
        ),
        &["endpoint"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Task lifecycle
        Box::new(SUBMISSIONS.clone()),
        Box::new(SOLUTIONS_DELIVERED.clone()),
        Box::new(SOLUTIONS_SURPLUS.clone()),
        Box::new(TASK_FAILURES.clone()),
        Box::new(TASK_DURATION.clone()),
        // Throttling
        Box::new(THROTTLE_EVENTS.clone()),
        // Gateway
        Box::new(GATEWAY_REQUEST_DURATION.clone()),
        Box::new(TRANSPORT_ERRORS.clone()),
    ]
}
