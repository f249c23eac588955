//! Collaborator contracts consumed by the routing core.
//!
//! The core never talks to switches, the device store or the cluster
//! directly. Everything it needs is behind one of these traits so the
//! daemon can wire real backends while tests plug in recording mocks.

use async_trait::async_trait;
use sonic_sr_types::{DeviceId, IpPrefix, Link, NodeId, PortNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::time::Instant;

use crate::election::OwnershipStore;
use crate::error::Result;
use crate::filter_retry::PortFilterInfo;
use crate::graph::LinkSource;

/// Next-hop switches from one target toward one destination.
pub type NextHops = BTreeSet<DeviceId>;

/// Next hops keyed by destination switch.
pub type NextHopMap = BTreeMap<DeviceId, NextHops>;

/// Per-switch segment routing configuration.
///
/// Queries for a switch that has no configuration yet fail with
/// [`RoutingError::ConfigurationMissing`](crate::RoutingError::ConfigurationMissing).
pub trait DeviceConfiguration: Send + Sync {
    /// Returns true once configuration for `device` has been received.
    fn is_configured(&self, device: &DeviceId) -> bool;

    /// All configured routers (switches) in the fabric.
    fn routers(&self) -> Vec<DeviceId>;

    fn is_edge_device(&self, device: &DeviceId) -> Result<bool>;

    /// Redundant pair switch, if one is configured.
    fn pair_device(&self, device: &DeviceId) -> Result<Option<DeviceId>>;

    /// Local port of the link towards the redundant pair switch.
    fn pair_local_port(&self, device: &DeviceId) -> Result<Option<PortNumber>>;

    fn subnets(&self, device: &DeviceId) -> Result<BTreeSet<IpPrefix>>;

    fn router_ipv4(&self, device: &DeviceId) -> Result<Ipv4Addr>;

    fn router_ipv6(&self, device: &DeviceId) -> Result<Option<Ipv6Addr>>;

    fn ipv4_sid(&self, device: &DeviceId) -> Result<u32>;

    fn ipv6_sid(&self, device: &DeviceId) -> Result<Option<u32>>;

    /// Pair switch lookup that treats missing configuration as "no pair".
    fn pair_of(&self, device: &DeviceId) -> Option<DeviceId> {
        self.pair_device(device).ok().flatten()
    }
}

/// Read-only view of the discovered topology.
pub trait TopologyService: LinkSource {
    /// Every switch known to the topology store, available or not.
    fn devices(&self) -> Vec<DeviceId>;

    fn is_available(&self, device: &DeviceId) -> bool;

    /// Time of the last availability change reported for `device`.
    fn last_availability_change(&self, device: &DeviceId) -> Option<Instant>;

    fn available_devices(&self) -> Vec<DeviceId> {
        self.devices()
            .into_iter()
            .filter(|d| self.is_available(d))
            .collect()
    }
}

/// Switch mastership authority.
pub trait MastershipService: Send + Sync {
    fn is_local_master(&self, device: &DeviceId) -> bool;

    fn master_of(&self, device: &DeviceId) -> Option<NodeId>;
}

/// Controller cluster membership.
pub trait ClusterService: Send + Sync {
    fn local_node(&self) -> NodeId;

    /// Time of the last membership change (node joined/left).
    fn last_cluster_event(&self) -> Option<Instant>;
}

/// Translates routing decisions into switch instructions.
#[async_trait]
pub trait RulePopulator: Send + Sync {
    /// Installs subnet routes on `target` toward `dest1` (and `dest2` for a
    /// dual-homed edge pair).
    async fn populate_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
        dest1: &DeviceId,
        dest2: Option<&DeviceId>,
        next_hops: &NextHopMap,
    ) -> Result<()>;

    async fn revoke_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
    ) -> Result<()>;

    /// Installs the MPLS transit rule on `target` for the segment id of
    /// `dest`, identified by its router address.
    async fn populate_mpls_rule(
        &self,
        target: &DeviceId,
        dest: &DeviceId,
        next_hops: &NextHops,
        router_ip: IpAddr,
    ) -> Result<()>;

    /// Installs the per-port filtering state of `device`. Returns `None`
    /// when nothing could be installed.
    async fn populate_port_filters(&self, device: &DeviceId) -> Option<PortFilterInfo>;

    /// Number of rules programmed since the last reset.
    fn rule_count(&self) -> u64;

    fn reset_rule_count(&self);
}

/// Edits hash-group buckets in place.
#[async_trait]
pub trait GroupService: Send + Sync {
    /// Fails with `GroupHandlerUnavailable` when `target` has no group state.
    async fn fix_hash_groups(
        &self,
        target: &DeviceId,
        next_hops: &NextHops,
        dest: &DeviceId,
        revoke: bool,
    ) -> Result<()>;

    /// Rehashes groups that use a parallel link.
    async fn retry_hash(&self, link: &Link, link_down: bool, first_time: bool);

    async fn link_state_changed(&self, link: &Link, up: bool);

    /// Drops the hashed next-objective state kept for `device`.
    async fn purge_hashed_groups(&self, device: &DeviceId);
}

/// Every collaborator the routing core talks to.
#[derive(Clone)]
pub struct FabricServices {
    pub topology: Arc<dyn TopologyService>,
    pub config: Arc<dyn DeviceConfiguration>,
    pub mastership: Arc<dyn MastershipService>,
    pub cluster: Arc<dyn ClusterService>,
    pub rules: Arc<dyn RulePopulator>,
    pub groups: Arc<dyn GroupService>,
    pub ownership: Arc<dyn OwnershipStore>,
}
