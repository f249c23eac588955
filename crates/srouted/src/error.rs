//! Error types for srouted.

use sonic_sr_types::{DeviceId, ParseError};
use thiserror::Error;

/// Errors raised while computing or programming fabric routes.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// The switch was queried before its device configuration arrived.
    #[error("device configuration missing for {0}")]
    ConfigurationMissing(DeviceId),

    /// No path graph snapshot exists for a required root switch.
    #[error("no path graph available for root {0}")]
    GraphUnavailable(DeviceId),

    /// The group collaborator holds no hash-group state for the switch.
    #[error("no group handler for {0}")]
    GroupHandlerUnavailable(DeviceId),

    /// Neither switch of a redundant pair has a master to elect.
    #[error("no candidate owner for {device} (pair {pair})")]
    ElectionFailure { device: DeviceId, pair: DeviceId },

    /// The rule collaborator rejected a programming request.
    #[error("programming failed on {device}: {reason}")]
    Programming { device: DeviceId, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Result type alias for srouted operations.
pub type Result<T> = std::result::Result<T, RoutingError>;
