//! Pod phase latency library
//!
//! This crate provides the core functionality for:
//! - Correlating pod lifecycle events into phase durations
//! - Querying the cluster for pods and related events
//! - Watching the cluster event stream
//! - Emitting records as structured logs and Prometheus metrics
//! - Health checks and observability

pub mod correlation;
pub mod emitter;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod query;
pub mod watch;

pub use correlation::{Outcome, PhaseHandler, SkipReason};
pub use emitter::{FanoutSink, RecordSink};
pub use error::{ConversionError, FieldPathError, QueryError, QueryResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PhaseMetrics, StructuredLogger};
pub use query::{ClusterQuery, EventSelector, KubeClusterQuery};
pub use watch::{EventWatcher, WatchConfig, WatchDispatcher};
