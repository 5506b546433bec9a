//! Observability infrastructure for the guardian
//!
//! Provides:
//! - Prometheus counters/gauges shared between the evaluation loop and the
//!   exposition endpoint (the only state that survives across cycles)
//! - Structured JSON logging with tracing for decisions and cycle outcomes

use crate::engine::CycleStats;
use crate::models::EvictionDecision;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GuardianMetricsInner> = OnceLock::new();

struct GuardianMetricsInner {
    pods_evaluated_total: IntCounter,
    pods_last_cycle: IntGauge,
    violations_total: IntCounter,
    evictions_total: IntCounterVec,
    eviction_failures_total: IntCounterVec,
    parse_failures_total: IntCounter,
    cycle_errors_total: IntCounter,
    cycle_duration_seconds: Histogram,
    config_limits: GaugeVec,
}

impl GuardianMetricsInner {
    fn new() -> Self {
        Self {
            pods_evaluated_total: register_int_counter!(
                "memguardian_pods_evaluated_total",
                "Total pods evaluated across all cycles"
            )
            .expect("Failed to register pods_evaluated_total"),

            pods_last_cycle: register_int_gauge!(
                "memguardian_pods_last_cycle",
                "Pods evaluated in the most recent cycle"
            )
            .expect("Failed to register pods_last_cycle"),

            violations_total: register_int_counter!(
                "memguardian_violations_total",
                "Total containers observed over their memory threshold"
            )
            .expect("Failed to register violations_total"),

            evictions_total: register_int_counter_vec!(
                "memguardian_evictions_total",
                "Total pods evicted from start.",
                &["namespace", "owner"]
            )
            .expect("Failed to register evictions_total"),

            eviction_failures_total: register_int_counter_vec!(
                "memguardian_eviction_failures_total",
                "Total eviction attempts that failed",
                &["namespace"]
            )
            .expect("Failed to register eviction_failures_total"),

            parse_failures_total: register_int_counter!(
                "memguardian_parse_failures_total",
                "Total malformed threshold annotations encountered"
            )
            .expect("Failed to register parse_failures_total"),

            cycle_errors_total: register_int_counter!(
                "memguardian_cycle_errors_total",
                "Errors in the evaluation loop"
            )
            .expect("Failed to register cycle_errors_total"),

            cycle_duration_seconds: register_histogram!(
                "memguardian_cycle_duration_seconds",
                "Evaluation cycle execution time",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            config_limits: register_gauge_vec!(
                "memguardian_config_limits",
                "Containers with a configured memory threshold, per namespace",
                &["namespace"]
            )
            .expect("Failed to register config_limits"),
        }
    }
}

/// Guardian metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GuardianMetrics {
    _private: (),
}

impl Default for GuardianMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardianMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GuardianMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GuardianMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn add_pods_evaluated(&self, count: u64) {
        self.inner().pods_evaluated_total.inc_by(count);
        self.inner().pods_last_cycle.set(count as i64);
    }

    pub fn add_violations(&self, count: u64) {
        self.inner().violations_total.inc_by(count);
    }

    pub fn inc_evictions(&self, namespace: &str, owner: &str) {
        self.inner()
            .evictions_total
            .with_label_values(&[namespace, owner])
            .inc();
    }

    pub fn inc_eviction_failures(&self, namespace: &str) {
        self.inner()
            .eviction_failures_total
            .with_label_values(&[namespace])
            .inc();
    }

    pub fn add_parse_failures(&self, count: u64) {
        self.inner().parse_failures_total.inc_by(count);
    }

    pub fn inc_cycle_errors(&self) {
        self.inner().cycle_errors_total.inc();
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Set the configured-limit count for one namespace
    pub fn set_config_limits(&self, namespace: &str, count: f64) {
        self.inner()
            .config_limits
            .with_label_values(&[namespace])
            .set(count);
    }
}

/// Structured logger for guardian events
///
/// Emits consistent event-shaped records for evictions and cycle outcomes.
#[derive(Clone)]
pub struct StructuredLogger {
    scope: String,
}

impl StructuredLogger {
    /// `scope` names what the guardian watches: a namespace, or "cluster"
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "guardian_started",
            scope = %self.scope,
            guardian_version = %version,
            "Memory guardian started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "guardian_shutdown",
            scope = %self.scope,
            reason = %reason,
            "Memory guardian shutting down"
        );
    }

    pub fn log_eviction(&self, decision: &EvictionDecision) {
        info!(
            event = "pod_evicted",
            scope = %self.scope,
            namespace = %decision.pod.namespace,
            pod = %decision.pod.name,
            container = %decision.container,
            owner = %decision.group,
            usage_bytes = decision.usage_bytes,
            threshold_bytes = decision.threshold_bytes,
            decided_at = %decision.decided_at,
            "Evicted pod over memory threshold"
        );
    }

    pub fn log_eviction_skipped(&self, decision: &EvictionDecision, reason: &str) {
        warn!(
            event = "eviction_skipped",
            scope = %self.scope,
            namespace = %decision.pod.namespace,
            pod = %decision.pod.name,
            owner = %decision.group,
            reason = %reason,
            "Skipped eviction"
        );
    }

    pub fn log_eviction_failed(&self, decision: &EvictionDecision, error: &str) {
        warn!(
            event = "eviction_failed",
            scope = %self.scope,
            namespace = %decision.pod.namespace,
            pod = %decision.pod.name,
            owner = %decision.group,
            error = %error,
            "Eviction request failed, will re-evaluate next cycle"
        );
    }

    pub fn log_dry_run(&self, decision: &EvictionDecision) {
        info!(
            event = "eviction_dry_run",
            scope = %self.scope,
            namespace = %decision.pod.namespace,
            pod = %decision.pod.name,
            container = %decision.container,
            owner = %decision.group,
            usage_bytes = decision.usage_bytes,
            threshold_bytes = decision.threshold_bytes,
            "Dry run: would evict pod"
        );
    }

    pub fn log_cycle_complete(&self, stats: &CycleStats, elapsed_secs: f64) {
        info!(
            event = "cycle_complete",
            scope = %self.scope,
            pods = stats.pods_evaluated,
            groups = stats.groups,
            eligible_groups = stats.eligible_groups,
            violations = stats.violations,
            decisions = stats.decisions,
            evictions = stats.evictions,
            parse_failures = stats.parse_failures,
            elapsed_secs,
            "Evaluation cycle complete"
        );
    }

    pub fn log_cycle_failed(&self, error: &str) {
        warn!(
            event = "cycle_failed",
            scope = %self.scope,
            error = %error,
            "Evaluation cycle failed, retrying next tick"
        );
    }
}
