//! Observability infrastructure for the phase latency agent
//!
//! Provides:
//! - Prometheus metrics (phase duration histograms, event outcomes, watch health)
//! - Structured JSON logging with tracing, including the per-record log line

use crate::correlation::Outcome;
use crate::emitter::RecordSink;
use crate::models::{Phase, PhaseDurationRecord};
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for phase durations (in seconds)
///
/// Scheduling is usually sub-second, image pulls can take minutes.
const PHASE_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PhaseMetricsInner> = OnceLock::new();

struct PhaseMetricsInner {
    phase_duration_seconds: HistogramVec,
    negative_durations: IntCounterVec,
    events: IntCounterVec,
    watch_restarts: IntCounter,
    watch_errors: IntCounter,
}

impl PhaseMetricsInner {
    fn new() -> Self {
        Self {
            phase_duration_seconds: register_histogram_vec!(
                "pod_phase_duration_seconds",
                "Measured duration of a pod lifecycle phase",
                &["phase"],
                PHASE_BUCKETS.to_vec()
            )
            .expect("Failed to register pod_phase_duration_seconds"),

            negative_durations: register_int_counter_vec!(
                "pod_phase_negative_durations_total",
                "Phase measurements whose end preceded their start",
                &["phase"]
            )
            .expect("Failed to register pod_phase_negative_durations_total"),

            events: register_int_counter_vec!(
                "pod_phase_events_total",
                "Processed events by outcome",
                &["outcome"]
            )
            .expect("Failed to register pod_phase_events_total"),

            watch_restarts: register_int_counter!(
                "pod_phase_watch_restarts_total",
                "Number of times the event watch re-listed"
            )
            .expect("Failed to register pod_phase_watch_restarts_total"),

            watch_errors: register_int_counter!(
                "pod_phase_watch_errors_total",
                "Errors returned by the event watch stream"
            )
            .expect("Failed to register pod_phase_watch_errors_total"),
        }
    }
}

/// Handle to the global phase metrics
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct PhaseMetrics {
    _private: (),
}

impl Default for PhaseMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PhaseMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PhaseMetricsInner {
        GLOBAL_METRICS.get_or_init(PhaseMetricsInner::new)
    }

    /// Record a phase measurement; negative durations are only counted
    pub fn observe_phase(&self, phase: Phase, duration_secs: f64) {
        if duration_secs < 0.0 {
            self.inner()
                .negative_durations
                .with_label_values(&[phase.as_str()])
                .inc();
            return;
        }

        self.inner()
            .phase_duration_seconds
            .with_label_values(&[phase.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_events(&self, outcome: &str) {
        self.inner().events.with_label_values(&[outcome]).inc();
    }

    pub fn inc_watch_restarts(&self) {
        self.inner().watch_restarts.inc();
    }

    pub fn inc_watch_errors(&self) {
        self.inner().watch_errors.inc();
    }

    pub fn phase_count(&self, phase: Phase) -> u64 {
        self.inner()
            .phase_duration_seconds
            .with_label_values(&[phase.as_str()])
            .get_sample_count()
    }

    pub fn negative_count(&self, phase: Phase) -> u64 {
        self.inner()
            .negative_durations
            .with_label_values(&[phase.as_str()])
            .get()
    }

    pub fn events_count(&self, outcome: &str) -> u64 {
        self.inner().events.with_label_values(&[outcome]).get()
    }
}

impl RecordSink for PhaseMetrics {
    fn emit(&self, record: &PhaseDurationRecord) {
        self.observe_phase(record.phase, record.duration_secs());
    }

    fn observe(&self, outcome: &Outcome) {
        self.inc_events(outcome.as_label());
    }
}

/// Structured logger for agent events
///
/// Every measured phase becomes one JSON log line carrying the pod identity
/// and the duration.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a measured phase duration
    pub fn log_phase_duration(&self, record: &PhaseDurationRecord) {
        let duration_ms = record.duration.num_milliseconds();
        let duration = humanize(record.duration);

        if record.is_negative() {
            warn!(
                event = "phase_duration",
                node = %self.node_name,
                phase = %record.phase,
                namespace = %record.namespace,
                pod_name = %record.pod_name,
                container = ?record.container,
                duration_ms = duration_ms,
                duration = %duration,
                "Pod phase ended before it started"
            );
            return;
        }

        info!(
            event = "phase_duration",
            node = %self.node_name,
            phase = %record.phase,
            namespace = %record.namespace,
            pod_name = %record.pod_name,
            container = ?record.container,
            duration_ms = duration_ms,
            duration = %duration,
            "Pod phase duration measured"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, namespace: Option<&str>) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            namespace = namespace.unwrap_or("*"),
            "Pod phase agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Pod phase agent shutting down"
        );
    }

    /// Log a watch (re)list
    pub fn log_watch_restart(&self, listed_events: usize) {
        info!(
            event = "watch_restarted",
            node = %self.node_name,
            listed_events = listed_events,
            "Event watch re-listed"
        );
    }

    /// Log a watch stream error
    pub fn log_watch_error(&self, error: &str) {
        warn!(
            event = "watch_error",
            node = %self.node_name,
            error = %error,
            "Event watch error, watcher will retry"
        );
    }
}

impl RecordSink for StructuredLogger {
    fn emit(&self, record: &PhaseDurationRecord) {
        self.log_phase_duration(record);
    }
}

/// Render a signed duration as e.g. `6s`, `1m30.5s` or `-2s`
fn humanize(duration: chrono::Duration) -> String {
    let millis = duration.num_milliseconds();
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();

    let minutes = millis / 60_000;
    let seconds = (millis % 60_000) as f64 / 1000.0;

    if minutes > 0 {
        format!("{}{}m{}s", sign, minutes, seconds)
    } else {
        format!("{}{}s", sign, seconds)
    }
}
