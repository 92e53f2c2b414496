//! Phase-specific correlation of events with their counterparts
//!
//! Every resolver follows the same strict policy: a missing or ambiguous
//! counterpart means the phase cannot be measured, never a best guess.

use super::classifier::{PULL_SUCCESS_MARKER, REASON_MOUNTED, REASON_PULLING, REASON_SCHEDULED};
use super::field_path::container_name;
use super::SkipReason;
use crate::models::{Phase, PhaseDurationRecord, PodEvent};
use crate::query::{ClusterQuery, EventSelector};
use std::sync::Arc;
use tracing::debug;

/// Resolves the counterpart of a triggering event and computes a duration
#[derive(Clone)]
pub struct PhaseResolver {
    query: Arc<dyn ClusterQuery>,
}

impl PhaseResolver {
    pub fn new(query: Arc<dyn ClusterQuery>) -> Self {
        Self { query }
    }

    /// Dispatch to the resolver for `phase`
    pub async fn resolve(
        &self,
        phase: Phase,
        event: &PodEvent,
    ) -> Result<PhaseDurationRecord, SkipReason> {
        match phase {
            Phase::Scheduling => self.scheduling(event).await,
            Phase::ImagePull => self.image_pull(event).await,
            Phase::VolumeMount => {
                let object = &event.involved_object;
                self.volume_mount(&object.namespace, &object.name).await
            }
        }
    }

    /// Pod creation until the `Scheduled` event
    pub async fn scheduling(&self, event: &PodEvent) -> Result<PhaseDurationRecord, SkipReason> {
        let object = &event.involved_object;
        let pod = self.query.get_pod(&object.namespace, &object.name).await?;

        Ok(PhaseDurationRecord::new(
            pod.namespace,
            pod.name,
            Phase::Scheduling,
            None,
            event.creation_timestamp - pod.creation_timestamp,
        ))
    }

    /// `Pulling` until `Pulled`, or the mount phase when the image was cached
    pub async fn image_pull(&self, event: &PodEvent) -> Result<PhaseDurationRecord, SkipReason> {
        let object = &event.involved_object;
        let container = container_name(&object.field_path)?;

        if !event.message.contains(PULL_SUCCESS_MARKER) {
            return self.cached_image(event, container).await;
        }

        let selector = EventSelector::new()
            .field_path(&object.field_path)
            .object_name(&object.name)
            .reason(REASON_PULLING);

        let pulling = self.single_event(&object.namespace, &selector).await?;
        if !pulling.is_first_occurrence() {
            return Err(SkipReason::CounterpartRepeated {
                reason: REASON_PULLING,
                count: pulling.count,
            });
        }

        Ok(PhaseDurationRecord::new(
            &object.namespace,
            &object.name,
            Phase::ImagePull,
            Some(container.to_string()),
            event.creation_timestamp - pulling.creation_timestamp,
        ))
    }

    /// A cached image has no `Pulling` counterpart, so the event is reused to
    /// measure volume mounts. Only the first container's event does so, which
    /// yields one mount record per pod.
    async fn cached_image(
        &self,
        event: &PodEvent,
        container: &str,
    ) -> Result<PhaseDurationRecord, SkipReason> {
        let object = &event.involved_object;
        let pod = self.query.get_pod(&object.namespace, &object.name).await?;

        let first = pod.first_container().ok_or(SkipReason::NoContainers)?;

        // Containment rather than equality: "web-proxy" also matches "web".
        if !container.contains(first) {
            debug!(
                pod_name = %object.name,
                container = %container,
                first_container = %first,
                "Cached image for non-first container, mount phase not measured"
            );
            return Err(SkipReason::NotFirstContainer);
        }

        self.volume_mount(&object.namespace, &object.name).await
    }

    /// `Scheduled` until the last `SuccessfulMountVolume`
    pub async fn volume_mount(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<PhaseDurationRecord, SkipReason> {
        let mounts = self
            .query
            .list_events(
                namespace,
                &EventSelector::new()
                    .object_name(pod_name)
                    .reason(REASON_MOUNTED),
            )
            .await?;

        // Volumes mount in any order; the phase ends with the last one
        let last_mount = mounts
            .iter()
            .map(|event| event.creation_timestamp)
            .max()
            .ok_or(SkipReason::NoMountEvents)?;

        let scheduled = self
            .single_event(
                namespace,
                &EventSelector::new()
                    .object_name(pod_name)
                    .reason(REASON_SCHEDULED),
            )
            .await?;

        Ok(PhaseDurationRecord::new(
            namespace,
            pod_name,
            Phase::VolumeMount,
            None,
            last_mount - scheduled.creation_timestamp,
        ))
    }

    /// List events and require exactly one match
    async fn single_event(
        &self,
        namespace: &str,
        selector: &EventSelector,
    ) -> Result<PodEvent, SkipReason> {
        let events = self.query.list_events(namespace, selector).await?;

        match <[PodEvent; 1]>::try_from(events) {
            Ok([event]) => Ok(event),
            Err(events) => Err(SkipReason::CounterpartCardinality {
                selector: selector.to_field_selector(),
                found: events.len(),
            }),
        }
    }
}
