//! Domain metrics for the compliance service.
//!
//! HTTP request metrics come from `service_core::middleware::metrics`; the
//! `/metrics` endpoint concatenates both outputs.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "compliance_db_query_duration_seconds",
            "Database query duration",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Access requests by outcome: under_review, already_pending, already_approved.
pub static ACCESS_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "compliance_trust_access_requests_total",
            "Trust portal access requests by outcome"
        ),
        &["outcome"]
    )
    .expect("Failed to register ACCESS_REQUESTS_TOTAL")
});

/// Review decisions: approved, denied, canceled.
pub static ACCESS_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "compliance_trust_access_decisions_total",
            "Review decisions on access requests"
        ),
        &["decision"]
    )
    .expect("Failed to register ACCESS_DECISIONS_TOTAL")
});

pub static NDA_SIGNATURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("compliance_trust_nda_signatures_total", "Signed NDAs"),
        &["result"]
    )
    .expect("Failed to register NDA_SIGNATURES_TOTAL")
});

pub static GRANTS_REVOKED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("compliance_trust_grants_revoked_total", "Revoked access grants"),
        &["reason_given"]
    )
    .expect("Failed to register GRANTS_REVOKED_TOTAL")
});

pub static EMAILS_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "compliance_emails_failed_total",
            "Best-effort emails that could not be delivered"
        ),
        &["template"]
    )
    .expect("Failed to register EMAILS_FAILED_TOTAL")
});

/// Force registration so every series shows up before first use.
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ACCESS_REQUESTS_TOTAL);
    Lazy::force(&ACCESS_DECISIONS_TOTAL);
    Lazy::force(&NDA_SIGNATURES_TOTAL);
    Lazy::force(&GRANTS_REVOKED_TOTAL);
    Lazy::force(&EMAILS_FAILED_TOTAL);
}

pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_access_request(outcome: &str) {
    ACCESS_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_decision(decision: &str) {
    ACCESS_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
}

pub fn record_nda_signature(result: &str) {
    NDA_SIGNATURES_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_grant_revoked(with_reason: bool) {
    let label = if with_reason { "yes" } else { "no" };
    GRANTS_REVOKED_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_email_failure(template: &str) {
    EMAILS_FAILED_TOTAL.with_label_values(&[template]).inc();
}

/// Observes into [`DB_QUERY_DURATION`] when the returned timer is dropped.
pub fn time_query(operation: &str) -> prometheus::HistogramTimer {
    DB_QUERY_DURATION.with_label_values(&[operation]).start_timer()
}
