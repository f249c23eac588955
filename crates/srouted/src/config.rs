//! Daemon tuning loaded from TOML.
//!
//! Default location: /etc/sonic/srouted.toml. Every key is optional and
//! falls back to its default when absent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, RoutingError};

/// Port filter retry schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base retry interval in milliseconds
    #[serde(default = "default_retry_interval")]
    pub interval_ms: u64,

    /// Identical results in a row before retries stop
    #[serde(default = "default_max_constant_attempts")]
    pub max_constant_attempts: u32,

    /// Exponent applied to the attempt counter
    #[serde(default = "default_retry_scale")]
    pub scale: u32,
}

/// Timing thresholds of the mastership-change reroute decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterChangeConfig {
    /// Wait before evaluating a mastership change
    #[serde(default = "default_master_change_delay")]
    pub delay_ms: u64,

    #[serde(default = "default_cluster_event_threshold")]
    pub cluster_event_threshold_ms: u64,

    #[serde(default = "default_device_event_threshold")]
    pub device_event_threshold_ms: u64,

    #[serde(default = "default_edge_port_event_threshold")]
    pub edge_port_event_threshold_ms: u64,

    /// Minimum spacing between two full reroutes
    #[serde(default = "default_full_reroute_threshold")]
    pub full_reroute_threshold_ms: u64,

    /// Wait between purging hashed groups and the full reroute
    #[serde(default = "default_purge_delay")]
    pub purge_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTuning {
    /// Routing is stable once no change happened for this long
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold_secs: u64,

    /// Depth of the topology event queue
    #[serde(default = "default_trigger_queue_depth")]
    pub trigger_queue_depth: usize,
}

/// Complete srouted configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub master_change: MasterChangeConfig,

    #[serde(default)]
    pub routing: RoutingTuning,
}

fn default_retry_interval() -> u64 {
    250
}

fn default_max_constant_attempts() -> u32 {
    5
}

fn default_retry_scale() -> u32 {
    1
}

fn default_master_change_delay() -> u64 {
    1000
}

fn default_cluster_event_threshold() -> u64 {
    4500
}

fn default_device_event_threshold() -> u64 {
    2000
}

fn default_edge_port_event_threshold() -> u64 {
    10000
}

fn default_full_reroute_threshold() -> u64 {
    10000
}

fn default_purge_delay() -> u64 {
    1000
}

fn default_stability_threshold() -> u64 {
    10
}

fn default_trigger_queue_depth() -> usize {
    1024
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_retry_interval(),
            max_constant_attempts: default_max_constant_attempts(),
            scale: default_retry_scale(),
        }
    }
}

impl Default for MasterChangeConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_master_change_delay(),
            cluster_event_threshold_ms: default_cluster_event_threshold(),
            device_event_threshold_ms: default_device_event_threshold(),
            edge_port_event_threshold_ms: default_edge_port_event_threshold(),
            full_reroute_threshold_ms: default_full_reroute_threshold(),
            purge_delay_ms: default_purge_delay(),
        }
    }
}

impl Default for RoutingTuning {
    fn default() -> Self {
        Self {
            stability_threshold_secs: default_stability_threshold(),
            trigger_queue_depth: default_trigger_queue_depth(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `counter` (1-based).
    pub fn delay(&self, counter: u32) -> Duration {
        let factor = u64::from(counter).saturating_pow(self.scale);
        Duration::from_millis(self.interval_ms.saturating_mul(factor))
    }
}

impl MasterChangeConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn cluster_event_threshold(&self) -> Duration {
        Duration::from_millis(self.cluster_event_threshold_ms)
    }

    pub fn device_event_threshold(&self) -> Duration {
        Duration::from_millis(self.device_event_threshold_ms)
    }

    pub fn edge_port_event_threshold(&self) -> Duration {
        Duration::from_millis(self.edge_port_event_threshold_ms)
    }

    pub fn full_reroute_threshold(&self) -> Duration {
        Duration::from_millis(self.full_reroute_threshold_ms)
    }

    pub fn purge_delay(&self) -> Duration {
        Duration::from_millis(self.purge_delay_ms)
    }
}

impl RoutingConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content).map_err(|e| {
                    RoutingError::Config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RoutingError::Io(e)),
        }
    }

    pub fn stability_threshold(&self) -> Duration {
        Duration::from_secs(self.routing.stability_threshold_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.interval_ms == 0 {
            return Err(RoutingError::Config(
                "retry.interval_ms must be > 0".to_string(),
            ));
        }

        if self.retry.max_constant_attempts == 0 {
            return Err(RoutingError::Config(
                "retry.max_constant_attempts must be > 0".to_string(),
            ));
        }

        if self.routing.trigger_queue_depth == 0 {
            return Err(RoutingError::Config(
                "routing.trigger_queue_depth must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
