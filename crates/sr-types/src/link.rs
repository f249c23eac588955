//! Unidirectional infrastructure links.

use crate::{ConnectPoint, DeviceId, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of link as reported by topology discovery.
///
/// Only [`LinkType::Direct`] links are ever used for path computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Physical cable between two switch ports.
    #[default]
    Direct,
    /// Link discovered through an intermediate, non-controlled network.
    Indirect,
    /// Link to an edge host.
    Edge,
    /// Tunnel between two switches.
    Tunnel,
    /// Optical transport link.
    Optical,
    /// Virtual link provisioned by configuration.
    Virtual,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkType::Direct => "direct",
            LinkType::Indirect => "indirect",
            LinkType::Edge => "edge",
            LinkType::Tunnel => "tunnel",
            LinkType::Optical => "optical",
            LinkType::Virtual => "virtual",
        };
        f.write_str(s)
    }
}

impl FromStr for LinkType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(LinkType::Direct),
            "indirect" => Ok(LinkType::Indirect),
            "edge" => Ok(LinkType::Edge),
            "tunnel" => Ok(LinkType::Tunnel),
            "optical" => Ok(LinkType::Optical),
            "virtual" => Ok(LinkType::Virtual),
            _ => Err(ParseError::InvalidLinkType(s.to_string())),
        }
    }
}

/// A unidirectional link from `src` to `dst`.
///
/// A physical cable shows up as two links, one per direction. Two links
/// are equal when both endpoints and the type match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    src: ConnectPoint,
    dst: ConnectPoint,
    #[serde(default, rename = "type")]
    link_type: LinkType,
}

impl Link {
    /// Creates a direct link.
    pub fn new(src: ConnectPoint, dst: ConnectPoint) -> Self {
        Self::with_type(src, dst, LinkType::Direct)
    }

    pub fn with_type(src: ConnectPoint, dst: ConnectPoint, link_type: LinkType) -> Self {
        Link {
            src,
            dst,
            link_type,
        }
    }

    pub fn src(&self) -> &ConnectPoint {
        &self.src
    }

    pub fn dst(&self) -> &ConnectPoint {
        &self.dst
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn src_device(&self) -> &DeviceId {
        self.src.device()
    }

    pub fn dst_device(&self) -> &DeviceId {
        self.dst.device()
    }

    /// Returns the link in the opposite direction.
    pub fn reversed(&self) -> Link {
        Link {
            src: self.dst.clone(),
            dst: self.src.clone(),
            link_type: self.link_type,
        }
    }

    /// Returns true if this link connects `a` and `b` in either direction.
    pub fn connects(&self, a: &DeviceId, b: &DeviceId) -> bool {
        (self.src_device() == a && self.dst_device() == b)
            || (self.src_device() == b && self.dst_device() == a)
    }

    /// Returns true if `other` has the same endpoints as this link, in
    /// either direction.
    pub fn same_endpoints(&self, other: &Link) -> bool {
        (self.src == other.src && self.dst == other.dst)
            || (self.src == other.dst && self.dst == other.src)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}
