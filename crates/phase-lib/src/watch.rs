//! Event watch loop
//!
//! Subscribes to cluster events and feeds each one to the [`PhaseHandler`],
//! one at a time. Delivery is at-least-once: a re-list replays every event
//! still stored by the API server.

use crate::correlation::{Outcome, PhaseHandler, SkipReason};
use crate::health::{components, HealthRegistry};
use crate::models::PodEvent;
use crate::observability::{PhaseMetrics, StructuredLogger};
use anyhow::Result;
use k8s_openapi::api::core::v1::Event;
use kube::api::Api;
use kube::runtime::watcher;
use kube::Client;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Server-side selector limiting the watch to pod events
pub const POD_EVENTS_SELECTOR: &str = "involvedObject.kind=Pod";

/// Configuration for the event watch
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Filter to pod events on the API server
    pub pod_events_only: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            pod_events_only: true,
        }
    }
}

impl WatchConfig {
    fn watcher_config(&self) -> watcher::Config {
        let config = watcher::Config::default();
        if self.pod_events_only {
            config.fields(POD_EVENTS_SELECTOR)
        } else {
            config
        }
    }
}

/// Routes watch stream items to the phase handler
#[derive(Clone)]
pub struct WatchDispatcher {
    handler: PhaseHandler,
    health: HealthRegistry,
    metrics: PhaseMetrics,
    logger: StructuredLogger,
}

impl WatchDispatcher {
    pub fn new(
        handler: PhaseHandler,
        health: HealthRegistry,
        metrics: PhaseMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            handler,
            health,
            metrics,
            logger,
        }
    }

    /// Handle one watch item, returning how many events were dispatched
    pub async fn handle(&self, item: watcher::Event<Event>) -> usize {
        match item {
            // Added and modified events both arrive here, so an update to an
            // event still at count 1 is measured again
            watcher::Event::Applied(event) => {
                // A delivered event means the stream is flowing again
                self.health.recover(components::WATCHER).await;
                usize::from(self.dispatch(&event).await)
            }
            watcher::Event::Restarted(events) => {
                self.metrics.inc_watch_restarts();
                self.logger.log_watch_restart(events.len());
                self.health.set_healthy(components::WATCHER).await;
                self.health.set_ready(true).await;

                let mut dispatched = 0;
                for event in &events {
                    if self.dispatch(event).await {
                        dispatched += 1;
                    }
                }
                dispatched
            }
            // Expiry of a stored event ends no phase
            watcher::Event::Deleted(_) => 0,
        }
    }

    /// Record a watch stream error
    pub async fn handle_error(&self, error: &watcher::Error) {
        self.metrics.inc_watch_errors();
        self.logger.log_watch_error(&error.to_string());
        self.health
            .set_degraded(components::WATCHER, error.to_string())
            .await;
    }

    async fn dispatch(&self, event: &Event) -> bool {
        match PodEvent::try_from(event) {
            Ok(event) => {
                let outcome = self.handler.process(&event).await;
                self.track_backend(&outcome).await;
                true
            }
            Err(e) => {
                debug!(
                    name = ?event.metadata.name,
                    error = %e,
                    "Skipping unconvertible event"
                );
                false
            }
        }
    }

    async fn track_backend(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped(SkipReason::QueryFailed(e)) => {
                self.health
                    .set_degraded(components::QUERY_BACKEND, e.clone())
                    .await;
            }
            outcome if outcome.cluster_answered() => {
                self.health.recover(components::QUERY_BACKEND).await;
            }
            _ => {}
        }
    }
}

/// Long-running watch over the cluster's events
pub struct EventWatcher {
    client: Client,
    config: WatchConfig,
    dispatcher: WatchDispatcher,
}

impl EventWatcher {
    pub fn new(client: Client, config: WatchConfig, dispatcher: WatchDispatcher) -> Self {
        Self {
            client,
            config,
            dispatcher,
        }
    }

    fn api(&self) -> Api<Event> {
        match &self.config.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Run until shutdown or until the watch stream ends
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            namespace = self.config.namespace.as_deref().unwrap_or("*"),
            pod_events_only = self.config.pod_events_only,
            "Starting event watch"
        );

        let stream = watcher(self.api(), self.config.watcher_config());
        tokio::pin!(stream);

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    // Awaited inline so invocations never overlap
                    Some(Ok(item)) => {
                        self.dispatcher.handle(item).await;
                    }
                    Some(Err(e)) => {
                        self.dispatcher.handle_error(&e).await;
                    }
                    None => {
                        warn!("Event watch stream ended");
                        self.dispatcher
                            .health
                            .set_unhealthy(components::WATCHER, "watch stream ended")
                            .await;
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    info!("Shutting down event watch");
                    break;
                }
            }
        }

        Ok(())
    }
}
