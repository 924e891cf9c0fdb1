//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `rsyslog_relp_reconciliations_total` - Total number of reconciliations
//! - `rsyslog_relp_reconciliation_errors_total` - Reconciliation errors by error kind
//! - `rsyslog_relp_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `rsyslog_relp_bundles_published_total` - Bundles published by bundle kind
//! - `rsyslog_relp_bundles_retracted_total` - Bundles retracted by bundle kind
//! - `rsyslog_relp_health_outcomes_total` - Health gate outcomes by outcome
//! - `rsyslog_relp_finalizers_removed_total` - Finalizers removed after verified cleanup
//! - `rsyslog_relp_requeues_total` - Requeues by trigger source

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "rsyslog_relp_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "rsyslog_relp_reconciliation_errors_total",
            "Total number of reconciliation errors by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "rsyslog_relp_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static BUNDLES_PUBLISHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "rsyslog_relp_bundles_published_total",
            "Total number of bundles published by bundle kind",
        ),
        &["kind"],
    )
    .expect("Failed to create BUNDLES_PUBLISHED_TOTAL metric - this should never happen")
});

static BUNDLES_RETRACTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "rsyslog_relp_bundles_retracted_total",
            "Total number of bundles retracted by bundle kind",
        ),
        &["kind"],
    )
    .expect("Failed to create BUNDLES_RETRACTED_TOTAL metric - this should never happen")
});

static HEALTH_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "rsyslog_relp_health_outcomes_total",
            "Total number of health gate evaluations by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create HEALTH_OUTCOMES_TOTAL metric - this should never happen")
});

static FINALIZERS_REMOVED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "rsyslog_relp_finalizers_removed_total",
        "Total number of finalizers removed after verified cleanup",
    )
    .expect("Failed to create FINALIZERS_REMOVED_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "rsyslog_relp_requeues_total",
            "Total number of requeues by trigger source",
        ),
        &["trigger_source"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(BUNDLES_PUBLISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BUNDLES_RETRACTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(HEALTH_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZERS_REMOVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_bundles_published(kind: &str) {
    BUNDLES_PUBLISHED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_bundles_retracted(kind: &str) {
    BUNDLES_RETRACTED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_health_outcomes(outcome: &str) {
    HEALTH_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_finalizers_removed() {
    FINALIZERS_REMOVED_TOTAL.inc();
}

pub fn increment_requeues_total(trigger_source: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger_source]).inc();
}
