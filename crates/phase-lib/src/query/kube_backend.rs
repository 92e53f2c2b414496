//! Kubernetes API backed cluster queries

use super::{ClusterQuery, EventSelector};
use crate::error::{ConversionError, QueryError, QueryResult};
use crate::models::{InvolvedObject, PodEvent, PodInfo};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

/// [`ClusterQuery`] implementation over a live `kube::Client`
#[derive(Clone)]
pub struct KubeClusterQuery {
    client: Client,
}

impl KubeClusterQuery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterQuery for KubeClusterQuery {
    async fn get_pod(&self, namespace: &str, name: &str) -> QueryResult<PodInfo> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let pod = pods.get(name).await.map_err(|e| match e {
            kube::Error::Api(response) if response.code == 404 => QueryError::NotFound {
                kind: "Pod",
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => QueryError::Api(other.to_string()),
        })?;

        Ok(PodInfo::try_from(&pod)?)
    }

    async fn list_events(
        &self,
        namespace: &str,
        selector: &EventSelector,
    ) -> QueryResult<Vec<PodEvent>> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let fields = selector.to_field_selector();
        let params = ListParams::default().fields(&fields);

        let list = events
            .list(&params)
            .await
            .map_err(|e| QueryError::Api(e.to_string()))?;

        debug!(
            namespace = %namespace,
            selector = %fields,
            matched = list.items.len(),
            "Listed events"
        );

        // A partially converted list would skew cardinality checks, so any
        // malformed item fails the whole query.
        list.items
            .iter()
            .map(|event| PodEvent::try_from(event).map_err(QueryError::from))
            .collect()
    }
}

impl TryFrom<&Event> for PodEvent {
    type Error = ConversionError;

    fn try_from(event: &Event) -> Result<Self, Self::Error> {
        let creation_timestamp = event
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .ok_or(ConversionError::MissingField {
                kind: "Event",
                field: "metadata.creationTimestamp",
            })?;

        let object = &event.involved_object;

        Ok(PodEvent {
            involved_object: InvolvedObject {
                kind: object.kind.clone().unwrap_or_default(),
                namespace: object.namespace.clone().unwrap_or_default(),
                name: object.name.clone().unwrap_or_default(),
                field_path: object.field_path.clone().unwrap_or_default(),
            },
            reason: event.reason.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
            // An absent count never equals one, so the classifier skips it
            count: event.count.unwrap_or(0),
            creation_timestamp,
        })
    }
}

impl TryFrom<&Pod> for PodInfo {
    type Error = ConversionError;

    fn try_from(pod: &Pod) -> Result<Self, Self::Error> {
        let meta = &pod.metadata;
        let missing = |field| ConversionError::MissingField { kind: "Pod", field };

        Ok(PodInfo {
            namespace: meta.namespace.clone().ok_or_else(|| missing("metadata.namespace"))?,
            name: meta.name.clone().ok_or_else(|| missing("metadata.name"))?,
            creation_timestamp: meta
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .ok_or_else(|| missing("metadata.creationTimestamp"))?,
            containers: pod
                .spec
                .as_ref()
                .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
        })
    }
}
