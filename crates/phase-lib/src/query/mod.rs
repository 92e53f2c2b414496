//! Cluster query capability
//!
//! The correlation core never talks to the API server directly. It goes
//! through [`ClusterQuery`], which the agent backs with the Kubernetes API
//! and tests back with an in-memory fake.

mod kube_backend;

pub use kube_backend::KubeClusterQuery;

use crate::error::QueryResult;
use crate::models::{PodEvent, PodInfo};
use async_trait::async_trait;
use std::fmt;

/// Read-only view of the cluster used to correlate events
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    /// Fetch a pod by namespace and name
    async fn get_pod(&self, namespace: &str, name: &str) -> QueryResult<PodInfo>;

    /// List events in a namespace matching every field of the selector
    async fn list_events(&self, namespace: &str, selector: &EventSelector)
        -> QueryResult<Vec<PodEvent>>;
}

/// Equality conjunction over the event fields the correlator filters on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSelector {
    pub field_path: Option<String>,
    pub object_name: Option<String>,
    pub reason: Option<String>,
}

impl EventSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_path(mut self, field_path: impl Into<String>) -> Self {
        self.field_path = Some(field_path.into());
        self
    }

    pub fn object_name(mut self, name: impl Into<String>) -> Self {
        self.object_name = Some(name.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Whether an event satisfies every populated field
    pub fn matches(&self, event: &PodEvent) -> bool {
        let object = &event.involved_object;
        self.field_path
            .as_deref()
            .map_or(true, |path| object.field_path == path)
            && self
                .object_name
                .as_deref()
                .map_or(true, |name| object.name == name)
            && self
                .reason
                .as_deref()
                .map_or(true, |reason| event.reason == reason)
    }

    /// Render as a Kubernetes field selector string
    pub fn to_field_selector(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms = [
            ("involvedObject.fieldPath", &self.field_path),
            ("involvedObject.name", &self.object_name),
            ("reason", &self.reason),
        ];

        let mut first = true;
        for (key, value) in terms {
            if let Some(value) = value {
                if !first {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", key, value)?;
                first = false;
            }
        }
        Ok(())
    }
}
