//! Event correlation and phase latency dispatch
//!
//! This module turns individual pod events into phase duration records:
//! - Classification by kind, repeat count and reason
//! - Correlation with the counterpart event or the owning pod
//! - Emission of the resulting record to a sink
//!
//! Processing is stateless. Every invocation re-fetches what it needs, and
//! any failure ends in "no record" rather than an error for the caller.

mod classifier;
mod field_path;
mod resolver;

#[cfg(test)]
mod tests;

pub use classifier::{
    classify, PULL_SUCCESS_MARKER, REASON_MOUNTED, REASON_PULLED, REASON_PULLING,
    REASON_SCHEDULED,
};
pub use field_path::container_name;
pub use resolver::PhaseResolver;

use crate::emitter::RecordSink;
use crate::error::{FieldPathError, QueryError};
use crate::models::{PhaseDurationRecord, PodEvent};
use crate::query::ClusterQuery;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Why an event produced no record
///
/// Never surfaced to the watch loop; it only feeds debug logs and counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Involved object is not a pod
    NotPodEvent,
    /// Event was already reported before
    RepeatedOccurrence { count: i32 },
    /// Reason does not start any measured phase
    UnhandledReason(String),
    /// Looked-up object does not exist
    ObjectMissing(String),
    /// Cluster lookup failed
    QueryFailed(String),
    /// Field path does not name a container
    InvalidFieldPath(FieldPathError),
    /// Expected exactly one counterpart event
    CounterpartCardinality { selector: String, found: usize },
    /// Counterpart event was itself a repeat
    CounterpartRepeated { reason: &'static str, count: i32 },
    /// Cached image belongs to a container other than the first
    NotFirstContainer,
    /// Pod spec lists no containers
    NoContainers,
    /// No volume mount events recorded for the pod
    NoMountEvents,
}

impl SkipReason {
    /// Low-cardinality label for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            SkipReason::NotPodEvent => "not_pod_event",
            SkipReason::RepeatedOccurrence { .. } => "repeated_occurrence",
            SkipReason::UnhandledReason(_) => "unhandled_reason",
            SkipReason::ObjectMissing(_) => "object_missing",
            SkipReason::QueryFailed(_) => "query_failed",
            SkipReason::InvalidFieldPath(_) => "invalid_field_path",
            SkipReason::CounterpartCardinality { .. } => "counterpart_cardinality",
            SkipReason::CounterpartRepeated { .. } => "counterpart_repeated",
            SkipReason::NotFirstContainer => "not_first_container",
            SkipReason::NoContainers => "no_containers",
            SkipReason::NoMountEvents => "no_mount_events",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotPodEvent => write!(f, "involved object is not a pod"),
            SkipReason::RepeatedOccurrence { count } => {
                write!(f, "event already reported (count {})", count)
            }
            SkipReason::UnhandledReason(reason) => write!(f, "unhandled reason {:?}", reason),
            SkipReason::ObjectMissing(e) => write!(f, "{}", e),
            SkipReason::QueryFailed(e) => write!(f, "cluster query failed: {}", e),
            SkipReason::InvalidFieldPath(e) => write!(f, "{}", e),
            SkipReason::CounterpartCardinality { selector, found } => {
                write!(f, "expected one event for {}, found {}", selector, found)
            }
            SkipReason::CounterpartRepeated { reason, count } => {
                write!(f, "{} counterpart has count {}", reason, count)
            }
            SkipReason::NotFirstContainer => write!(f, "not the pod's first container"),
            SkipReason::NoContainers => write!(f, "pod has no containers"),
            SkipReason::NoMountEvents => write!(f, "no volume mount events"),
        }
    }
}

impl From<QueryError> for SkipReason {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::NotFound { .. } => SkipReason::ObjectMissing(e.to_string()),
            _ => SkipReason::QueryFailed(e.to_string()),
        }
    }
}

impl From<FieldPathError> for SkipReason {
    fn from(e: FieldPathError) -> Self {
        SkipReason::InvalidFieldPath(e)
    }
}

/// Result of processing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Emitted(PhaseDurationRecord),
    Skipped(SkipReason),
}

impl Outcome {
    /// Whether the cluster answered every query this event needed
    ///
    /// False when processing stopped before querying or a query failed.
    pub fn cluster_answered(&self) -> bool {
        match self {
            Outcome::Emitted(_) => true,
            Outcome::Skipped(reason) => matches!(
                reason,
                SkipReason::ObjectMissing(_)
                    | SkipReason::CounterpartCardinality { .. }
                    | SkipReason::CounterpartRepeated { .. }
                    | SkipReason::NotFirstContainer
                    | SkipReason::NoContainers
                    | SkipReason::NoMountEvents
            ),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Emitted(_) => "emitted",
            Outcome::Skipped(reason) => reason.as_label(),
        }
    }
}

/// Entry point invoked by the watch loop once per delivered event
#[derive(Clone)]
pub struct PhaseHandler {
    resolver: PhaseResolver,
    sink: Arc<dyn RecordSink>,
}

impl PhaseHandler {
    pub fn new(query: Arc<dyn ClusterQuery>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            resolver: PhaseResolver::new(query),
            sink,
        }
    }

    /// Handle a newly observed event. Never fails.
    pub async fn object_created(&self, event: &PodEvent) {
        self.process(event).await;
    }

    /// Classify, correlate and emit, reporting what happened
    pub async fn process(&self, event: &PodEvent) -> Outcome {
        let outcome = match self.correlate(event).await {
            Ok(record) => {
                self.sink.emit(&record);
                Outcome::Emitted(record)
            }
            Err(reason) => {
                debug!(
                    namespace = %event.involved_object.namespace,
                    name = %event.involved_object.name,
                    reason = %event.reason,
                    skip = %reason,
                    "Event produced no phase record"
                );
                Outcome::Skipped(reason)
            }
        };

        self.sink.observe(&outcome);
        outcome
    }

    async fn correlate(&self, event: &PodEvent) -> Result<PhaseDurationRecord, SkipReason> {
        let phase = classify(event)?;
        self.resolver.resolve(phase, event).await
    }
}
