//! In-process topology, configuration and mastership store.

use parking_lot::RwLock;
use sonic_sr_types::{DeviceId, IpPrefix, Link, NodeId, PortNumber};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::time::Instant;
use tracing::debug;

use super::config::{DeviceConfig, FabricConfig};
use crate::error::{Result, RoutingError};
use crate::graph::LinkSource;
use crate::services::{ClusterService, DeviceConfiguration, MastershipService, TopologyService};

struct FabricState {
    devices: BTreeMap<DeviceId, DeviceConfig>,
    links: BTreeSet<Link>,
    last_change: HashMap<DeviceId, Instant>,
    last_cluster_event: Option<Instant>,
}

/// Fabric view backed by a [`FabricConfig`] and mutated by topology events.
///
/// Serves every read-only collaborator contract of the routing core, so a
/// single instance can be shared as topology, device configuration,
/// mastership and cluster service.
pub struct StaticFabric {
    local_node: NodeId,
    state: RwLock<FabricState>,
}

impl StaticFabric {
    pub fn new(config: FabricConfig, local_node: NodeId) -> Self {
        let links = config.links.iter().flat_map(|l| l.links()).collect();
        Self {
            local_node,
            state: RwLock::new(FabricState {
                devices: config.devices,
                links,
                last_change: HashMap::new(),
                last_cluster_event: None,
            }),
        }
    }

    /// Adds a discovered link. Returns false if it was already present.
    pub fn add_link(&self, link: Link) -> bool {
        self.state.write().links.insert(link)
    }

    pub fn remove_link(&self, link: &Link) -> bool {
        self.state.write().links.remove(link)
    }

    pub fn links(&self) -> Vec<Link> {
        self.state.read().links.iter().cloned().collect()
    }

    pub fn set_available(&self, device: &DeviceId, available: bool) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if let Some(config) = state.devices.get_mut(device) {
            if config.available != available {
                config.available = available;
                state.last_change.insert(device.clone(), Instant::now());
                debug!(device = %device, available, "Device availability changed");
            }
        }
    }

    pub fn set_master(&self, device: &DeviceId, master: Option<NodeId>) {
        if let Some(config) = self.state.write().devices.get_mut(device) {
            config.master = master;
        }
    }

    /// Adds or replaces the configuration of a switch.
    pub fn upsert_device(&self, device: DeviceId, config: DeviceConfig) {
        self.state.write().devices.insert(device, config);
    }

    /// Removes a switch and every link touching it.
    pub fn remove_device(&self, device: &DeviceId) -> Option<DeviceConfig> {
        let mut state = self.state.write();
        state
            .links
            .retain(|l| l.src_device() != device && l.dst_device() != device);
        state.last_change.remove(device);
        state.devices.remove(device)
    }

    pub fn set_subnets(&self, device: &DeviceId, subnets: BTreeSet<IpPrefix>) {
        if let Some(config) = self.state.write().devices.get_mut(device) {
            config.subnets = subnets;
        }
    }

    pub fn record_cluster_event(&self) {
        self.state.write().last_cluster_event = Some(Instant::now());
    }

    fn with_device<T>(&self, device: &DeviceId, f: impl FnOnce(&DeviceConfig) -> T) -> Result<T> {
        self.state
            .read()
            .devices
            .get(device)
            .map(f)
            .ok_or_else(|| RoutingError::ConfigurationMissing(device.clone()))
    }
}

impl DeviceConfiguration for StaticFabric {
    fn is_configured(&self, device: &DeviceId) -> bool {
        self.state.read().devices.contains_key(device)
    }

    fn routers(&self) -> Vec<DeviceId> {
        self.state.read().devices.keys().cloned().collect()
    }

    fn is_edge_device(&self, device: &DeviceId) -> Result<bool> {
        self.with_device(device, |c| c.edge)
    }

    fn pair_device(&self, device: &DeviceId) -> Result<Option<DeviceId>> {
        self.with_device(device, |c| c.pair.clone())
    }

    fn pair_local_port(&self, device: &DeviceId) -> Result<Option<PortNumber>> {
        self.with_device(device, |c| c.pair_port)
    }

    fn subnets(&self, device: &DeviceId) -> Result<BTreeSet<IpPrefix>> {
        self.with_device(device, |c| c.subnets.clone())
    }

    fn router_ipv4(&self, device: &DeviceId) -> Result<Ipv4Addr> {
        self.with_device(device, |c| c.router_ipv4)
    }

    fn router_ipv6(&self, device: &DeviceId) -> Result<Option<Ipv6Addr>> {
        self.with_device(device, |c| c.router_ipv6)
    }

    fn ipv4_sid(&self, device: &DeviceId) -> Result<u32> {
        self.with_device(device, |c| c.ipv4_sid)
    }

    fn ipv6_sid(&self, device: &DeviceId) -> Result<Option<u32>> {
        self.with_device(device, |c| c.ipv6_sid)
    }
}

impl LinkSource for StaticFabric {
    fn egress_links(&self, device: &DeviceId) -> Vec<Link> {
        let state = self.state.read();
        let up = |d: &DeviceId| state.devices.get(d).is_some_and(|c| c.available);
        if !up(device) {
            return Vec::new();
        }
        state
            .links
            .iter()
            .filter(|l| l.src_device() == device && up(l.dst_device()))
            .cloned()
            .collect()
    }
}

impl TopologyService for StaticFabric {
    fn devices(&self) -> Vec<DeviceId> {
        self.state.read().devices.keys().cloned().collect()
    }

    fn is_available(&self, device: &DeviceId) -> bool {
        self.state
            .read()
            .devices
            .get(device)
            .is_some_and(|c| c.available)
    }

    fn last_availability_change(&self, device: &DeviceId) -> Option<Instant> {
        self.state.read().last_change.get(device).copied()
    }
}

impl MastershipService for StaticFabric {
    fn is_local_master(&self, device: &DeviceId) -> bool {
        self.master_of(device).as_ref() == Some(&self.local_node)
    }

    fn master_of(&self, device: &DeviceId) -> Option<NodeId> {
        self.state
            .read()
            .devices
            .get(device)
            .and_then(|c| c.master.clone())
    }
}

impl ClusterService for StaticFabric {
    fn local_node(&self) -> NodeId {
        self.local_node.clone()
    }

    fn last_cluster_event(&self) -> Option<Instant> {
        self.state.read().last_cluster_event
    }
}
