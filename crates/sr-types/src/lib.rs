//! Fabric identifier types for the segment routing controller.
//!
//! This crate provides the small value types every part of the controller
//! passes around:
//!
//! - [`DeviceId`]: opaque, ordered switch identifier
//! - [`PortNumber`] and [`ConnectPoint`]: a port on a switch
//! - [`Link`]: a unidirectional link between two connect points
//! - [`NodeId`]: controller cluster member identifier
//! - [`IpPrefix`]: IPv4/IPv6 subnet in CIDR notation

mod device;
mod ip;
mod link;
mod node;

pub use device::{ConnectPoint, DeviceId, PortNumber};
pub use ip::IpPrefix;
pub use link::{Link, LinkType};
pub use node::NodeId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    #[error("invalid port number: {0}")]
    InvalidPortNumber(String),

    #[error("invalid connect point (expected <device>/<port>): {0}")]
    InvalidConnectPoint(String),

    #[error("invalid node id: {0:?}")]
    InvalidNodeId(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid link type: {0}")]
    InvalidLinkType(String),
}
