//! Lightweight metrics helpers for the router.
//!
//! This module wraps the `metrics` crate macros. It does not embed a concrete
//! exporter (the application can install any compatible recorder) while still
//! describing the router's metric names. Without a recorder every call is a
//! no-op.
//!
//! Provided metrics:
//! * `unit_router_requests_total` (counter; labels `route`, `outcome`)
//! * `unit_router_request_duration_seconds` (histogram; label `route`)
//! * `unit_router_attempts_total` (counter; label `outcome`)
//! * `unit_router_owner_lookups_total` (counter; label `result`)
//!
//! Process ids are never used as labels; they are unbounded.
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

use crate::ports::metrics_sink::{MetricsSink, OutcomeRecord};

pub const UNIT_ROUTER_REQUESTS_TOTAL: &str = "unit_router_requests_total";
pub const UNIT_ROUTER_REQUEST_DURATION_SECONDS: &str = "unit_router_request_duration_seconds";
pub const UNIT_ROUTER_ATTEMPTS_TOTAL: &str = "unit_router_attempts_total";
pub const UNIT_ROUTER_OWNER_LOOKUPS_TOTAL: &str = "unit_router_owner_lookups_total";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        UNIT_ROUTER_REQUESTS_TOTAL,
        Unit::Count,
        "Requests dispatched by the router, by route kind and outcome."
    );
    describe_histogram!(
        UNIT_ROUTER_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "End-to-end dispatch latency including failover attempts."
    );
    describe_counter!(
        UNIT_ROUTER_ATTEMPTS_TOTAL,
        Unit::Count,
        "Individual host attempts, by outcome (reached / failed)."
    );
    describe_counter!(
        UNIT_ROUTER_OWNER_LOOKUPS_TOTAL,
        Unit::Count,
        "Owner resolutions for the subrouter override, by result."
    );
});

/// Count one owner resolution (`cache_hit`, `fetched`, `not_found`, `error`, `timeout`).
pub fn increment_owner_lookup(result: &'static str) {
    counter!(UNIT_ROUTER_OWNER_LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// Count one host attempt.
pub fn increment_attempt(reached: bool) {
    let outcome = if reached { "reached" } else { "failed" };
    counter!(UNIT_ROUTER_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a completed dispatch.
pub fn record_dispatch(route: &str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "exhausted" };
    counter!(
        UNIT_ROUTER_REQUESTS_TOTAL,
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        UNIT_ROUTER_REQUEST_DURATION_SECONDS,
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// [`MetricsSink`] backed by the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderSink;

impl MetricsSink for RecorderSink {
    fn record(&self, outcome: &OutcomeRecord) -> eyre::Result<()> {
        record_dispatch(&outcome.route.to_string(), outcome.success, outcome.latency);
        tracing::debug!(
            process_id = %outcome.process_id,
            host = %outcome.host,
            attempts = outcome.attempts,
            latency_ms = outcome.latency.as_millis() as u64,
            success = outcome.success,
            "dispatch outcome"
        );
        Ok(())
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing router metrics");
    Lazy::force(&DESCRIPTIONS);
    Ok(())
}
