//! Static fabric description loaded from TOML.
//!
//! Example:
//!
//! ```toml
//! local_node = "10.0.0.1"
//!
//! [devices."leaf1"]
//! edge = true
//! pair = "leaf2"
//! pair_port = 9
//! subnets = ["10.0.1.0/24"]
//! router_ipv4 = "192.168.0.11"
//! ipv4_sid = 111
//! master = "10.0.0.1"
//!
//! [[links]]
//! a = "leaf1/1"
//! b = "spine1/1"
//! ```

use serde::{Deserialize, Serialize};
use sonic_sr_types::{ConnectPoint, DeviceId, IpPrefix, Link, NodeId, PortNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use crate::error::{Result, RoutingError};

/// Segment routing configuration of one switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Leaf switch with attached hosts.
    #[serde(default)]
    pub edge: bool,

    #[serde(default)]
    pub pair: Option<DeviceId>,

    /// Local port of the link towards `pair`.
    #[serde(default)]
    pub pair_port: Option<PortNumber>,

    #[serde(default)]
    pub subnets: BTreeSet<IpPrefix>,

    pub router_ipv4: Ipv4Addr,

    #[serde(default)]
    pub router_ipv6: Option<Ipv6Addr>,

    pub ipv4_sid: u32,

    #[serde(default)]
    pub ipv6_sid: Option<u32>,

    /// Controller node currently mastering the switch.
    #[serde(default)]
    pub master: Option<NodeId>,

    #[serde(default = "default_available")]
    pub available: bool,
}

/// A cable between two ports. Both directions are installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: ConnectPoint,
    pub b: ConnectPoint,
}

impl LinkConfig {
    /// The two unidirectional links of this cable.
    pub fn links(&self) -> [Link; 2] {
        let forward = Link::new(self.a.clone(), self.b.clone());
        let reverse = forward.reversed();
        [forward, reverse]
    }
}

/// Complete fabric description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Identity of this controller instance; may be given on the command
    /// line instead.
    #[serde(default)]
    pub local_node: Option<NodeId>,

    #[serde(default)]
    pub devices: BTreeMap<DeviceId, DeviceConfig>,

    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

fn default_available() -> bool {
    true
}

impl FabricConfig {
    /// Loads a fabric description. Unlike the daemon configuration there is
    /// no fallback: a missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: FabricConfig = toml::from_str(&content).map_err(|e| {
            RoutingError::Config(format!(
                "Failed to parse fabric file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks pair symmetry and that every link endpoint is a known switch.
    pub fn validate(&self) -> Result<()> {
        for (id, device) in &self.devices {
            let Some(pair) = &device.pair else {
                continue;
            };
            if pair == id {
                return Err(RoutingError::Config(format!("{} is paired with itself", id)));
            }
            let back = self.devices.get(pair).and_then(|p| p.pair.as_ref());
            if back != Some(id) {
                return Err(RoutingError::Config(format!(
                    "pair of {} is {} but {} is not paired back",
                    id, pair, pair
                )));
            }
            if !device.edge {
                return Err(RoutingError::Config(format!(
                    "{} has a pair but is not an edge switch",
                    id
                )));
            }
        }
        for link in &self.links {
            for cp in [&link.a, &link.b] {
                if !self.devices.contains_key(cp.device()) {
                    return Err(RoutingError::Config(format!(
                        "link endpoint {} refers to an unknown device",
                        cp
                    )));
                }
            }
        }
        Ok(())
    }
}
