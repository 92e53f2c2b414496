//! Event classification by involved-object kind, repeat count and reason

use super::SkipReason;
use crate::models::{Phase, PodEvent};

/// Reason emitted by the scheduler once a pod is bound to a node
pub const REASON_SCHEDULED: &str = "Scheduled";
/// Reason emitted by the kubelet when an image pull starts
pub const REASON_PULLING: &str = "Pulling";
/// Reason emitted by the kubelet when an image is available
pub const REASON_PULLED: &str = "Pulled";
/// Reason emitted by the kubelet for each mounted volume
pub const REASON_MOUNTED: &str = "SuccessfulMountVolume";

/// Message prefix of a `Pulled` event that followed an actual download
pub const PULL_SUCCESS_MARKER: &str = "Successfully pulled image";

impl Phase {
    /// Phase whose measurement an event with `reason` triggers
    ///
    /// Volume mounts have no trigger reason of their own; they are measured
    /// off cache-hit `Pulled` events.
    pub fn triggered_by(reason: &str) -> Option<Phase> {
        match reason {
            REASON_SCHEDULED => Some(Phase::Scheduling),
            REASON_PULLED => Some(Phase::ImagePull),
            _ => None,
        }
    }
}

/// Decide whether an event is measured, and for which phase
pub fn classify(event: &PodEvent) -> Result<Phase, SkipReason> {
    if !event.is_pod_event() {
        return Err(SkipReason::NotPodEvent);
    }

    if !event.is_first_occurrence() {
        return Err(SkipReason::RepeatedOccurrence { count: event.count });
    }

    Phase::triggered_by(&event.reason)
        .ok_or_else(|| SkipReason::UnhandledReason(event.reason.clone()))
}
