//! Agent configuration

use anyhow::{Context, Result};
use config::{Config, Environment, Map};
use phase_lib::WatchConfig;
use serde::Deserialize;

const ENV_PREFIX: &str = "PHASE_AGENT";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Namespace to watch; all namespaces when unset
    #[serde(default)]
    pub namespace: Option<String>,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Ask the API server for pod events only
    #[serde(default = "default_pod_events_only")]
    pub pod_events_only: bool,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_pod_events_only() -> bool {
    true
}

impl AgentConfig {
    /// Load configuration from `PHASE_AGENT_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_env(None)
    }

    /// Load from an explicit variable map instead of the process environment
    fn from_env(vars: Option<Map<String, String>>) -> Result<Self> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            namespace: self.namespace.clone(),
            pod_events_only: self.pod_events_only,
        }
    }
}
