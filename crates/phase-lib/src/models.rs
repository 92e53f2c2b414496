//! Core data models for pod phase latency measurement

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of the involved object the agent measures
pub const POD_KIND: &str = "Pod";

/// Reference to the object an event is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvolvedObject {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Locator for the sub-part of the object, e.g. `spec.containers{web}`
    pub field_path: String,
}

/// A single reported occurrence of a cluster condition
///
/// A repeated condition bumps `count` on the same record instead of creating
/// a new one, so only `count == 1` marks a first observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodEvent {
    pub involved_object: InvolvedObject,
    pub reason: String,
    pub message: String,
    pub count: i32,
    pub creation_timestamp: DateTime<Utc>,
}

impl PodEvent {
    pub fn is_pod_event(&self) -> bool {
        self.involved_object.kind == POD_KIND
    }

    pub fn is_first_occurrence(&self) -> bool {
        self.count == 1
    }
}

/// Snapshot of a pod, fetched on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub creation_timestamp: DateTime<Utc>,
    /// Container names in spec order
    pub containers: Vec<String>,
}

impl PodInfo {
    pub fn first_container(&self) -> Option<&str> {
        self.containers.first().map(String::as_str)
    }
}

/// Measured pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Pod object creation until the scheduler binds it
    Scheduling,
    /// `Pulling` until `Pulled` for a single container image
    ImagePull,
    /// Scheduling decision until the last volume mount completes
    VolumeMount,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Scheduling => "scheduling",
            Phase::ImagePull => "image-pull",
            Phase::VolumeMount => "volume-mount",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived latency for one phase of one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseDurationRecord {
    pub namespace: String,
    pub pod_name: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
}

impl PhaseDurationRecord {
    pub fn new(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        phase: Phase,
        container: Option<String>,
        duration: Duration,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            phase,
            container,
            duration,
        }
    }

    /// Negative durations only come out of mis-ordered correlations
    pub fn is_negative(&self) -> bool {
        self.duration < Duration::zero()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.num_milliseconds() as f64 / 1000.0
    }
}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_i64(duration.num_milliseconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Scheduling.to_string(), "scheduling");
        assert_eq!(Phase::ImagePull.to_string(), "image-pull");
        assert_eq!(Phase::VolumeMount.to_string(), "volume-mount");
    }

    #[test]
    fn test_record_serializes_duration_as_millis() {
        let record = PhaseDurationRecord::new(
            "ns",
            "app-1",
            Phase::ImagePull,
            Some("web".to_string()),
            Duration::milliseconds(6_500),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["phase"], "image-pull");
        assert_eq!(json["container"], "web");
        assert_eq!(json["duration"], 6_500);
        assert!((record.duration_secs() - 6.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_without_container_omits_field() {
        let record =
            PhaseDurationRecord::new("ns", "app-1", Phase::Scheduling, None, Duration::seconds(2));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("container").is_none());
        assert!(!record.is_negative());
    }

    #[test]
    fn test_pod_first_container() {
        let pod = PodInfo {
            namespace: "ns".to_string(),
            name: "app-1".to_string(),
            creation_timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            containers: vec!["web".to_string(), "sidecar".to_string()],
        };
        assert_eq!(pod.first_container(), Some("web"));

        let empty = PodInfo {
            containers: Vec::new(),
            ..pod
        };
        assert_eq!(empty.first_container(), None);
    }
}
