// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Kafka operator.
//!
//! All metrics carry the namespace prefix `kafka_kubedoop_dev_` (prometheus-safe version
//! of "kafka.kubedoop.dev").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Passes over `KafkaCluster` objects and their outcomes
//! - **Managed Object Metrics** - Creates, updates and no-ops per managed kind
//! - **Readiness Metrics** - Workload readiness checks
//! - **Error Metrics** - Errors by kind and category
//!
//! # Example
//!
//! ```rust,no_run
//! use kafka_operator::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("KafkaCluster", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all operator metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "kafka_kubedoop_dev";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (e.g., `KafkaCluster`)
/// - `status`: Outcome (`success`, `error`, `requeue`, `paused`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of requeues by resource type and reason
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `reason`: Why the pass requeued (`workload_not_ready`, `error`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of requeues by resource type and reason",
    );
    let counter = CounterVec::new(opts, &["resource_type", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Managed Object Metrics
// ============================================================================

/// Outcome of applying one managed object
///
/// Labels:
/// - `kind`: Kind of the managed object (e.g., `StatefulSet`, `ConfigMap`)
/// - `action`: `created`, `updated` or `unchanged`
pub static OBJECTS_APPLIED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_objects_applied_total"),
        "Total number of managed object applications by kind and action",
    );
    let counter = CounterVec::new(opts, &["kind", "action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Readiness Metrics
// ============================================================================

/// Pods observed by the last readiness check of each workload
///
/// Labels:
/// - `workload`: `namespace/name` of the `StatefulSet`
pub static WORKLOAD_OBSERVED_PODS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_workload_observed_pods"),
        "Pods observed by the last readiness check of a workload",
    );
    let gauge = GaugeVec::new(opts, &["workload"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by resource type and error category
///
/// Labels:
/// - `resource_type`: Kind of the resource the error occurred on
/// - `error_type`: Category, see `ReconcileError::metric_label`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by resource type and error category",
    );
    let counter = CounterVec::new(opts, &["resource_type", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled (e.g., `KafkaCluster`)
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `reason` - Reason for requeue (e.g., `workload_not_ready`)
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record a pass skipped because reconciliation is paused
pub fn record_reconciliation_paused(resource_type: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "paused"])
        .inc();
}

/// Record the outcome of applying one managed object
///
/// # Arguments
/// * `kind` - Kind of the managed object
/// * `action` - `created`, `updated` or `unchanged`
pub fn record_object_applied(kind: &str, action: &str) {
    OBJECTS_APPLIED_TOTAL
        .with_label_values(&[kind, action])
        .inc();
}

/// Record the pod count seen by a readiness check
#[allow(clippy::cast_precision_loss)]
pub fn record_workload_pods(workload: &str, observed: usize) {
    WORKLOAD_OBSERVED_PODS
        .with_label_values(&[workload])
        .set(observed as f64);
}

/// Record an error
///
/// # Arguments
/// * `resource_type` - The kind of resource where error occurred
/// * `error_type` - Category of error (e.g., `conflict`, `configuration`)
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
