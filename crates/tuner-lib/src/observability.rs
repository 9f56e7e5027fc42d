//! Observability infrastructure for the tuning engine
//!
//! Provides:
//! - Prometheus metrics (validation outcomes, recommendation counts, latencies)
//! - Structured logging of engine events with tracing

use crate::resolver::Notification;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for recommendation runs (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TunerMetricsInner> = OnceLock::new();

struct TunerMetricsInner {
    experiments_registered: IntCounter,
    experiments_rejected: IntCounterVec,
    results_accepted: IntCounter,
    results_rejected: IntCounterVec,
    recommendations_generated: IntCounter,
    tunables_skipped: IntCounterVec,
    recommendation_latency_seconds: Histogram,
    result_processing_seconds: Histogram,
    experiments_in_store: IntGauge,
}

impl TunerMetricsInner {
    fn new() -> Self {
        Self {
            experiments_registered: register_int_counter!(
                "runtime_tuner_experiments_registered_total",
                "Experiments that passed validation and were stored"
            )
            .expect("Failed to register experiments_registered"),

            experiments_rejected: register_int_counter_vec!(
                "runtime_tuner_experiments_rejected_total",
                "Experiments rejected by validation, by status code",
                &["status"]
            )
            .expect("Failed to register experiments_rejected"),

            results_accepted: register_int_counter!(
                "runtime_tuner_results_accepted_total",
                "Result windows merged into an experiment"
            )
            .expect("Failed to register results_accepted"),

            results_rejected: register_int_counter_vec!(
                "runtime_tuner_results_rejected_total",
                "Result windows rejected, by status code",
                &["status"]
            )
            .expect("Failed to register results_rejected"),

            recommendations_generated: register_int_counter!(
                "runtime_tuner_recommendations_generated_total",
                "Recommendation config entries produced"
            )
            .expect("Failed to register recommendations_generated"),

            tunables_skipped: register_int_counter_vec!(
                "runtime_tuner_tunables_skipped_total",
                "Tunables without a recommendation, by notification kind",
                &["kind"]
            )
            .expect("Failed to register tunables_skipped"),

            recommendation_latency_seconds: register_histogram!(
                "runtime_tuner_recommendation_latency_seconds",
                "Time spent generating recommendations for one run",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register recommendation_latency_seconds"),

            result_processing_seconds: register_histogram!(
                "runtime_tuner_result_processing_seconds",
                "Time spent handling one result window, rejected or accepted",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register result_processing_seconds"),

            experiments_in_store: register_int_gauge!(
                "runtime_tuner_experiments_in_store",
                "Experiments currently held in the store"
            )
            .expect("Failed to register experiments_in_store"),
        }
    }
}

/// Handle to the process-wide metric set; clones share the same metrics
#[derive(Clone)]
pub struct TunerMetrics {
    _private: (),
}

impl Default for TunerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TunerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TunerMetrics")
    }
}

impl TunerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TunerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TunerMetricsInner {
        GLOBAL_METRICS.get_or_init(TunerMetricsInner::new)
    }

    pub fn inc_experiments_registered(&self) {
        self.inner().experiments_registered.inc();
    }

    pub fn inc_experiments_rejected(&self, status: u16) {
        self.inner()
            .experiments_rejected
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    pub fn inc_results_accepted(&self) {
        self.inner().results_accepted.inc();
    }

    pub fn inc_results_rejected(&self, status: u16) {
        self.inner()
            .results_rejected
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    pub fn add_recommendations(&self, count: usize) {
        self.inner().recommendations_generated.inc_by(count as u64);
    }

    pub fn record_notifications(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.inner()
                .tunables_skipped
                .with_label_values(&[notification.kind.as_str()])
                .inc();
        }
    }

    pub fn observe_recommendation_latency(&self, duration_secs: f64) {
        self.inner().recommendation_latency_seconds.observe(duration_secs);
    }

    pub fn observe_result_processing(&self, duration_secs: f64) {
        self.inner().result_processing_seconds.observe(duration_secs);
    }

    pub fn set_experiments_in_store(&self, count: usize) {
        self.inner().experiments_in_store.set(count as i64);
    }

    /// Prometheus text exposition of the default registry
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for engine events
///
/// Every event carries an `event` field and the logger's `instance` name.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_experiment_registered(&self, experiment_name: &str, profile: Option<&str>) {
        info!(
            event = "experiment_registered",
            instance = %self.instance,
            experiment_name = %experiment_name,
            profile = ?profile,
            "Experiment registered"
        );
    }

    pub fn log_experiment_rejected(&self, experiment_name: &str, status: u16, message: &str) {
        warn!(
            event = "experiment_rejected",
            instance = %self.instance,
            experiment_name = %experiment_name,
            status = status,
            message = %message,
            "Experiment rejected"
        );
    }

    pub fn log_result_accepted(&self, experiment_name: &str, interval_end: &str, recommendations: usize) {
        info!(
            event = "result_accepted",
            instance = %self.instance,
            experiment_name = %experiment_name,
            interval_end = %interval_end,
            recommendations = recommendations,
            "Result window accepted"
        );
    }

    pub fn log_result_rejected(
        &self,
        experiment_name: &str,
        interval_end: &str,
        status: u16,
        message: &str,
    ) {
        warn!(
            event = "result_rejected",
            instance = %self.instance,
            experiment_name = %experiment_name,
            interval_end = %interval_end,
            status = status,
            message = %message,
            "Result window rejected"
        );
    }

    pub fn log_recommendation(&self, scope: &str, recommendations: usize, notifications: usize) {
        info!(
            event = "recommendation_generated",
            instance = %self.instance,
            scope = %scope,
            recommendations = recommendations,
            notifications = notifications,
            "Recommendation generated"
        );
    }

    pub fn log_tunable_skipped(&self, scope: &str, notification: &Notification) {
        warn!(
            event = "tunable_skipped",
            instance = %self.instance,
            scope = %scope,
            tunable = %notification.tunable,
            code = notification.code,
            message = %notification.message,
            "Tunable skipped"
        );
    }

    pub fn log_batch_halted(&self, kind: &str, processed: usize, remaining: usize) {
        warn!(
            event = "batch_halted",
            instance = %self.instance,
            kind = %kind,
            processed = processed,
            remaining = remaining,
            "Batch halted on first failure"
        );
    }
}
