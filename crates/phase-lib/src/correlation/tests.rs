//! Correlation scenarios against an in-memory cluster
//!
//! The fake cluster stores pods and events and answers queries the way the
//! API server's field selectors do, so each test reads as a short cluster
//! history followed by the event under observation.

#[cfg(test)]
mod fake_cluster_tests {
    use crate::correlation::{Outcome, PhaseHandler, SkipReason};
    use crate::emitter::RecordSink;
    use crate::error::{FieldPathError, QueryError, QueryResult};
    use crate::models::{InvolvedObject, Phase, PhaseDurationRecord, PodEvent, PodInfo};
    use crate::query::{ClusterQuery, EventSelector};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const NS: &str = "ns";
    const POD: &str = "app-1";
    const WEB_PATH: &str = "spec.containers{web}";

    /// Seconds after a fixed reference instant
    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[derive(Default)]
    struct FakeCluster {
        pods: Mutex<Vec<PodInfo>>,
        events: Mutex<Vec<PodEvent>>,
        fail_queries: bool,
        queries: AtomicUsize,
    }

    impl FakeCluster {
        fn new() -> Self {
            Self::default()
        }

        fn failing() -> Self {
            Self {
                fail_queries: true,
                ..Self::default()
            }
        }

        fn with_pod(self, name: &str, created: DateTime<Utc>, containers: &[&str]) -> Self {
            self.pods.lock().unwrap().push(PodInfo {
                namespace: NS.to_string(),
                name: name.to_string(),
                creation_timestamp: created,
                containers: containers.iter().map(|c| c.to_string()).collect(),
            });
            self
        }

        fn with_event(self, event: PodEvent) -> Self {
            self.events.lock().unwrap().push(event);
            self
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClusterQuery for FakeCluster {
        async fn get_pod(&self, namespace: &str, name: &str) -> QueryResult<PodInfo> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_queries {
                return Err(QueryError::Api("connection refused".to_string()));
            }

            self.pods
                .lock()
                .unwrap()
                .iter()
                .find(|pod| pod.namespace == namespace && pod.name == name)
                .cloned()
                .ok_or_else(|| QueryError::NotFound {
                    kind: "Pod",
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
        }

        async fn list_events(
            &self,
            namespace: &str,
            selector: &EventSelector,
        ) -> QueryResult<Vec<PodEvent>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_queries {
                return Err(QueryError::Api("connection refused".to_string()));
            }

            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|event| event.involved_object.namespace == namespace)
                .filter(|event| selector.matches(event))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        records: Mutex<Vec<PhaseDurationRecord>>,
    }

    impl CapturingSink {
        fn records(&self) -> Vec<PhaseDurationRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl RecordSink for CapturingSink {
        fn emit(&self, record: &PhaseDurationRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    fn pod_event(reason: &str, field_path: &str, message: &str, count: i32, at: i64) -> PodEvent {
        PodEvent {
            involved_object: InvolvedObject {
                kind: "Pod".to_string(),
                namespace: NS.to_string(),
                name: POD.to_string(),
                field_path: field_path.to_string(),
            },
            reason: reason.to_string(),
            message: message.to_string(),
            count,
            creation_timestamp: t(at),
        }
    }

    fn scheduled(at: i64) -> PodEvent {
        pod_event("Scheduled", "", "Successfully assigned ns/app-1 to node-a", 1, at)
    }

    fn pulling(field_path: &str, count: i32, at: i64) -> PodEvent {
        pod_event("Pulling", field_path, "pulling image \"nginx:1.25\"", count, at)
    }

    fn pulled(field_path: &str, at: i64) -> PodEvent {
        pod_event(
            "Pulled",
            field_path,
            "Successfully pulled image \"nginx:1.25\"",
            1,
            at,
        )
    }

    fn cached(field_path: &str, at: i64) -> PodEvent {
        pod_event(
            "Pulled",
            field_path,
            "Container image \"nginx:1.25\" already present on machine",
            1,
            at,
        )
    }

    fn mounted(volume: &str, at: i64) -> PodEvent {
        pod_event(
            "SuccessfulMountVolume",
            "",
            &format!("MountVolume.SetUp succeeded for volume \"{}\"", volume),
            1,
            at,
        )
    }

    fn setup(cluster: FakeCluster) -> (PhaseHandler, Arc<CapturingSink>, Arc<FakeCluster>) {
        let cluster = Arc::new(cluster);
        let sink = Arc::new(CapturingSink::default());
        (
            PhaseHandler::new(cluster.clone(), sink.clone()),
            sink,
            cluster,
        )
    }

    #[tokio::test]
    async fn test_non_pod_events_produce_nothing() {
        let (handler, sink, cluster) = setup(FakeCluster::new().with_pod(POD, t(0), &["web"]));

        for reason in ["Scheduled", "Pulled"] {
            let mut event = pod_event(reason, WEB_PATH, "", 1, 5);
            event.involved_object.kind = "Node".to_string();

            assert_eq!(
                handler.process(&event).await,
                Outcome::Skipped(SkipReason::NotPodEvent)
            );
        }

        assert!(sink.records().is_empty());
        assert_eq!(cluster.query_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_events_produce_nothing() {
        let (handler, sink, cluster) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(pulling(WEB_PATH, 1, 3)),
        );

        for mut event in [scheduled(2), pulled(WEB_PATH, 9), cached(WEB_PATH, 9)] {
            event.count = 3;
            assert_eq!(
                handler.process(&event).await,
                Outcome::Skipped(SkipReason::RepeatedOccurrence { count: 3 })
            );
        }

        assert!(sink.records().is_empty());
        assert_eq!(cluster.query_count(), 0);
    }

    #[tokio::test]
    async fn test_unhandled_reasons_produce_nothing() {
        let (handler, sink, _) = setup(FakeCluster::new().with_pod(POD, t(0), &["web"]));

        for event in [pulling(WEB_PATH, 1, 3), mounted("config", 4)] {
            assert!(matches!(
                handler.process(&event).await,
                Outcome::Skipped(SkipReason::UnhandledReason(_))
            ));
        }

        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_scheduling_duration() {
        let (handler, sink, _) = setup(FakeCluster::new().with_pod(POD, t(0), &["web"]));

        handler.object_created(&scheduled(2)).await;

        assert_eq!(
            sink.records(),
            vec![PhaseDurationRecord::new(
                NS,
                POD,
                Phase::Scheduling,
                None,
                Duration::seconds(2),
            )]
        );
    }

    #[tokio::test]
    async fn test_scheduling_without_pod_produces_nothing() {
        let (handler, sink, _) = setup(FakeCluster::new());

        let outcome = handler.process(&scheduled(2)).await;

        assert!(matches!(outcome, Outcome::Skipped(SkipReason::ObjectMissing(_))));
        assert!(outcome.cluster_answered());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_produces_nothing() {
        let (handler, sink, _) = setup(FakeCluster::failing());

        for event in [scheduled(2), pulled(WEB_PATH, 9), cached(WEB_PATH, 9)] {
            let outcome = handler.process(&event).await;
            assert!(matches!(outcome, Outcome::Skipped(SkipReason::QueryFailed(_))));
            assert!(!outcome.cluster_answered());
        }

        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_pod_lifecycle_scenario() {
        // Pod created at 0s, scheduled at 2s, pulling web at 3s, pulled at 9s
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(scheduled(2))
                .with_event(pulling(WEB_PATH, 1, 3)),
        );

        handler.object_created(&scheduled(2)).await;
        handler.object_created(&pulled(WEB_PATH, 9)).await;

        assert_eq!(
            sink.records(),
            vec![
                PhaseDurationRecord::new(NS, POD, Phase::Scheduling, None, Duration::seconds(2)),
                PhaseDurationRecord::new(
                    NS,
                    POD,
                    Phase::ImagePull,
                    Some("web".to_string()),
                    Duration::seconds(6),
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_image_pull_ignores_other_containers() {
        let db_path = "spec.containers{db}";
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web", "db"])
                .with_event(pulling(WEB_PATH, 1, 3))
                .with_event(pulling(db_path, 1, 5)),
        );

        handler.object_created(&pulled(db_path, 12)).await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].container.as_deref(), Some("db"));
        assert_eq!(records[0].duration, Duration::seconds(7));
    }

    #[tokio::test]
    async fn test_image_pull_without_pulling_event() {
        let (handler, sink, _) = setup(FakeCluster::new().with_pod(POD, t(0), &["web"]));

        let outcome = handler.process(&pulled(WEB_PATH, 9)).await;

        assert!(matches!(
            outcome,
            Outcome::Skipped(SkipReason::CounterpartCardinality { found: 0, .. })
        ));
        // An empty answer is still an answer
        assert!(outcome.cluster_answered());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_image_pull_with_ambiguous_pulling_events() {
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(pulling(WEB_PATH, 1, 3))
                .with_event(pulling(WEB_PATH, 1, 4)),
        );

        let outcome = handler.process(&pulled(WEB_PATH, 9)).await;

        assert!(matches!(
            outcome,
            Outcome::Skipped(SkipReason::CounterpartCardinality { found: 2, .. })
        ));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_image_pull_with_repeated_pulling_event() {
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(pulling(WEB_PATH, 2, 3)),
        );

        let outcome = handler.process(&pulled(WEB_PATH, 9)).await;

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::CounterpartRepeated {
                reason: "Pulling",
                count: 2,
            })
        );
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_image_pull_with_malformed_field_path() {
        let (handler, sink, cluster) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(pulling("spec.containers", 1, 3)),
        );

        let outcome = handler.process(&pulled("spec.containers", 9)).await;

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::InvalidFieldPath(
                FieldPathError::MissingDelimiter("spec.containers".to_string())
            ))
        );
        assert!(sink.records().is_empty());
        assert_eq!(cluster.query_count(), 0);
    }

    #[tokio::test]
    async fn test_volume_mount_uses_latest_mount() {
        // Mounts delivered out of order; the last completion ends the phase
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web", "sidecar"])
                .with_event(scheduled(2))
                .with_event(mounted("data", 7))
                .with_event(mounted("config", 4))
                .with_event(mounted("token", 5)),
        );

        handler.object_created(&cached(WEB_PATH, 10)).await;

        assert_eq!(
            sink.records(),
            vec![PhaseDurationRecord::new(
                NS,
                POD,
                Phase::VolumeMount,
                None,
                Duration::seconds(5),
            )]
        );
    }

    #[tokio::test]
    async fn test_volume_mount_only_from_first_container() {
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web", "sidecar"])
                .with_event(scheduled(2))
                .with_event(mounted("config", 4)),
        );

        let outcome = handler.process(&cached("spec.containers{sidecar}", 10)).await;

        assert_eq!(outcome, Outcome::Skipped(SkipReason::NotFirstContainer));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_first_container_match_is_containment() {
        // "web-proxy" contains "web", so it also counts as the first container
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web", "web-proxy"])
                .with_event(scheduled(2))
                .with_event(mounted("config", 4)),
        );

        handler
            .object_created(&cached("spec.containers{web-proxy}", 10))
            .await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phase, Phase::VolumeMount);
    }

    #[tokio::test]
    async fn test_volume_mount_without_mount_events() {
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(scheduled(2)),
        );

        let outcome = handler.process(&cached(WEB_PATH, 10)).await;

        assert_eq!(outcome, Outcome::Skipped(SkipReason::NoMountEvents));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_volume_mount_requires_single_scheduled_event() {
        let missing = FakeCluster::new()
            .with_pod(POD, t(0), &["web"])
            .with_event(mounted("config", 4));
        let duplicated = FakeCluster::new()
            .with_pod(POD, t(0), &["web"])
            .with_event(scheduled(2))
            .with_event(scheduled(3))
            .with_event(mounted("config", 4));

        for (cluster, expected) in [(missing, 0), (duplicated, 2)] {
            let (handler, sink, _) = setup(cluster);

            let outcome = handler.process(&cached(WEB_PATH, 10)).await;

            match outcome {
                Outcome::Skipped(SkipReason::CounterpartCardinality { found, selector }) => {
                    assert_eq!(found, expected);
                    assert_eq!(selector, "involvedObject.name=app-1,reason=Scheduled");
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
            assert!(sink.records().is_empty());
        }
    }

    #[tokio::test]
    async fn test_cached_image_for_pod_without_containers() {
        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &[])
                .with_event(scheduled(2))
                .with_event(mounted("config", 4)),
        );

        let outcome = handler.process(&cached(WEB_PATH, 10)).await;

        assert_eq!(outcome, Outcome::Skipped(SkipReason::NoContainers));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_emits_again() {
        let (handler, sink, _) = setup(FakeCluster::new().with_pod(POD, t(0), &["web"]));

        let event = scheduled(2);
        handler.object_created(&event).await;
        handler.object_created(&event).await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], records[1]);
    }

    #[tokio::test]
    async fn test_negative_duration_is_emitted_unchanged() {
        // Clock skew between the API server and scheduler
        let (handler, sink, _) = setup(FakeCluster::new().with_pod(POD, t(5), &["web"]));

        handler.object_created(&scheduled(2)).await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration, Duration::seconds(-3));
        assert!(records[0].is_negative());
    }

    #[tokio::test]
    async fn test_queries_are_scoped_to_event_namespace() {
        let mut other_ns_pulling = pulling(WEB_PATH, 1, 3);
        other_ns_pulling.involved_object.namespace = "other".to_string();

        let (handler, sink, _) = setup(
            FakeCluster::new()
                .with_pod(POD, t(0), &["web"])
                .with_event(other_ns_pulling),
        );

        let outcome = handler.process(&pulled(WEB_PATH, 9)).await;

        assert!(matches!(
            outcome,
            Outcome::Skipped(SkipReason::CounterpartCardinality { found: 0, .. })
        ));
        assert!(sink.records().is_empty());
    }
}
