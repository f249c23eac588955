//! Fixtures and recording collaborators shared by the unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_sr_types::{ConnectPoint, DeviceId, IpPrefix, Link, NodeId, PortNumber};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::RoutingConfig;
use crate::election::{InMemoryOwnershipStore, OwnershipElector};
use crate::error::{Result, RoutingError};
use crate::fabric::{DeviceConfig, FabricConfig, LinkConfig, StaticFabric};
use crate::filter_retry::PortFilterInfo;
use crate::graph::LinkSource;
use crate::routing::RoutingHandler;
use crate::services::{FabricServices, GroupService, NextHopMap, NextHops, RulePopulator};

pub fn dev(id: &str) -> DeviceId {
    DeviceId::new(id).unwrap()
}

pub fn node(id: &str) -> NodeId {
    NodeId::new(id).unwrap()
}

pub fn prefix(s: &str) -> IpPrefix {
    s.parse().unwrap()
}

pub fn cp(device: &str, port: u64) -> ConnectPoint {
    ConnectPoint::new(dev(device), PortNumber::new(port))
}

pub fn link(src: &str, src_port: u64, dst: &str, dst_port: u64) -> Link {
    Link::new(cp(src, src_port), cp(dst, dst_port))
}

/// Fixed link set for graph tests.
pub struct StaticLinks(Vec<Link>);

impl StaticLinks {
    pub fn bidirectional(cables: &[(&str, u64, &str, u64)]) -> Self {
        let links = cables
            .iter()
            .flat_map(|(a, pa, b, pb)| {
                let l = link(a, *pa, b, *pb);
                [l.reversed(), l]
            })
            .collect();
        StaticLinks(links)
    }
}

impl LinkSource for StaticLinks {
    fn egress_links(&self, device: &DeviceId) -> Vec<Link> {
        self.0
            .iter()
            .filter(|l| l.src_device() == device)
            .cloned()
            .collect()
    }
}

/// Builds a [`StaticFabric`]. Switches without an explicit master are
/// mastered by the local node.
pub struct FabricBuilder {
    local: String,
    devices: BTreeMap<DeviceId, DeviceConfig>,
    masters: HashMap<DeviceId, NodeId>,
    links: Vec<LinkConfig>,
}

impl FabricBuilder {
    pub fn new() -> Self {
        Self {
            local: "local".to_string(),
            devices: BTreeMap::new(),
            masters: HashMap::new(),
            links: Vec::new(),
        }
    }

    pub fn local(mut self, node: &str) -> Self {
        self.local = node.to_string();
        self
    }

    fn device(mut self, name: &str, edge: bool) -> Self {
        let n = self.devices.len() as u32 + 1;
        self.devices.insert(
            dev(name),
            DeviceConfig {
                edge,
                pair: None,
                pair_port: None,
                subnets: BTreeSet::new(),
                router_ipv4: Ipv4Addr::new(192, 168, 0, n as u8),
                router_ipv6: None,
                ipv4_sid: 100 + n,
                ipv6_sid: None,
                master: None,
                available: true,
            },
        );
        self
    }

    pub fn spine(self, name: &str) -> Self {
        self.device(name, false)
    }

    pub fn edge(self, name: &str) -> Self {
        self.device(name, true)
    }

    pub fn edge_pair(self, a: &str, a_port: u64, b: &str, b_port: u64) -> Self {
        let mut builder = self.edge(a).edge(b);
        for (this, port, other) in [(a, a_port, b), (b, b_port, a)] {
            if let Some(config) = builder.devices.get_mut(&dev(this)) {
                config.pair = Some(dev(other));
                config.pair_port = Some(PortNumber::new(port));
            }
        }
        builder
    }

    pub fn subnet(mut self, device: &str, subnet: &str) -> Self {
        if let Some(config) = self.devices.get_mut(&dev(device)) {
            config.subnets.insert(prefix(subnet));
        }
        self
    }

    pub fn master(mut self, device: &str, node_id: &str) -> Self {
        self.masters.insert(dev(device), node(node_id));
        self
    }

    pub fn cable(mut self, a: &str, a_port: u64, b: &str, b_port: u64) -> Self {
        self.links.push(LinkConfig {
            a: cp(a, a_port),
            b: cp(b, b_port),
        });
        self
    }

    pub fn build(self) -> Arc<StaticFabric> {
        let local = node(&self.local);
        let mut devices = self.devices;
        for (id, config) in devices.iter_mut() {
            config.master = Some(self.masters.get(id).cloned().unwrap_or_else(|| local.clone()));
        }
        let config = FabricConfig {
            local_node: Some(local.clone()),
            devices,
            links: self.links,
        };
        Arc::new(StaticFabric::new(config, local))
    }
}

pub type SubnetRule = (DeviceId, BTreeSet<IpPrefix>, DeviceId, Option<DeviceId>, NextHopMap);

/// Records every programming request.
#[derive(Default)]
pub struct RecordingRules {
    subnet_rules: Mutex<Vec<SubnetRule>>,
    mpls_rules: Mutex<Vec<(DeviceId, DeviceId, NextHops)>>,
    revoked: Mutex<Vec<(DeviceId, BTreeSet<IpPrefix>)>>,
    filter_script: Mutex<Vec<Option<PortFilterInfo>>>,
    filter_calls: Mutex<HashMap<DeviceId, usize>>,
    budget: Mutex<Option<usize>>,
    count: AtomicU64,
}

impl RecordingRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results of successive port filter runs per switch. The last entry
    /// repeats.
    pub fn script_port_filters(&self, script: Vec<Option<PortFilterInfo>>) {
        *self.filter_script.lock() = script;
    }

    pub fn port_filter_calls(&self, device: &DeviceId) -> usize {
        self.filter_calls.lock().get(device).copied().unwrap_or(0)
    }

    /// Lets `n` more programming calls succeed, then fails every call.
    pub fn fail_after(&self, n: usize) {
        *self.budget.lock() = Some(n);
    }

    pub fn subnet_rules(&self) -> Vec<SubnetRule> {
        self.subnet_rules.lock().clone()
    }

    pub fn mpls_rules(&self) -> Vec<(DeviceId, DeviceId, NextHops)> {
        self.mpls_rules.lock().clone()
    }

    pub fn revoked(&self) -> Vec<(DeviceId, BTreeSet<IpPrefix>)> {
        self.revoked.lock().clone()
    }

    pub fn clear(&self) {
        self.subnet_rules.lock().clear();
        self.mpls_rules.lock().clear();
        self.revoked.lock().clear();
        self.filter_calls.lock().clear();
    }

    fn spend(&self, device: &DeviceId) -> Result<()> {
        let mut budget = self.budget.lock();
        match budget.as_mut() {
            Some(0) => Err(RoutingError::Programming {
                device: device.clone(),
                reason: "injected failure".to_string(),
            }),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RulePopulator for RecordingRules {
    async fn populate_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
        dest1: &DeviceId,
        dest2: Option<&DeviceId>,
        next_hops: &NextHopMap,
    ) -> Result<()> {
        self.spend(target)?;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.subnet_rules.lock().push((
            target.clone(),
            subnets.clone(),
            dest1.clone(),
            dest2.cloned(),
            next_hops.clone(),
        ));
        Ok(())
    }

    async fn revoke_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
    ) -> Result<()> {
        self.spend(target)?;
        self.revoked.lock().push((target.clone(), subnets.clone()));
        Ok(())
    }

    async fn populate_mpls_rule(
        &self,
        target: &DeviceId,
        dest: &DeviceId,
        next_hops: &NextHops,
        _router_ip: IpAddr,
    ) -> Result<()> {
        self.spend(target)?;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.mpls_rules
            .lock()
            .push((target.clone(), dest.clone(), next_hops.clone()));
        Ok(())
    }

    async fn populate_port_filters(&self, device: &DeviceId) -> Option<PortFilterInfo> {
        let call = {
            let mut calls = self.filter_calls.lock();
            let n = calls.entry(device.clone()).or_insert(0);
            *n += 1;
            *n - 1
        };
        let script = self.filter_script.lock();
        match script.get(call).or(script.last()) {
            Some(result) => *result,
            None => Some(PortFilterInfo::default()),
        }
    }

    fn rule_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn reset_rule_count(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Records hash group edits.
#[derive(Default)]
pub struct RecordingGroups {
    fixes: Mutex<Vec<(DeviceId, NextHops, DeviceId, bool)>>,
    failing: Mutex<HashSet<DeviceId>>,
    rehashes: Mutex<Vec<(Link, bool, bool)>>,
    link_changes: Mutex<Vec<(Link, bool)>>,
    purged: Mutex<Vec<DeviceId>>,
}

impl RecordingGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `device` behave as if it had no group state.
    pub fn fail_for(&self, device: &DeviceId) {
        self.failing.lock().insert(device.clone());
    }

    /// Successful repairs as (target, next hops, destination, revoke).
    pub fn fixes(&self) -> Vec<(DeviceId, NextHops, DeviceId, bool)> {
        self.fixes.lock().clone()
    }

    pub fn rehashes(&self) -> Vec<(Link, bool, bool)> {
        self.rehashes.lock().clone()
    }

    pub fn link_changes(&self) -> Vec<(Link, bool)> {
        self.link_changes.lock().clone()
    }

    pub fn purged(&self) -> Vec<DeviceId> {
        self.purged.lock().clone()
    }
}

#[async_trait]
impl GroupService for RecordingGroups {
    async fn fix_hash_groups(
        &self,
        target: &DeviceId,
        next_hops: &NextHops,
        dest: &DeviceId,
        revoke: bool,
    ) -> Result<()> {
        if self.failing.lock().contains(target) {
            return Err(RoutingError::GroupHandlerUnavailable(target.clone()));
        }
        self.fixes
            .lock()
            .push((target.clone(), next_hops.clone(), dest.clone(), revoke));
        Ok(())
    }

    async fn retry_hash(&self, link: &Link, link_down: bool, first_time: bool) {
        self.rehashes
            .lock()
            .push((link.clone(), link_down, first_time));
    }

    async fn link_state_changed(&self, link: &Link, up: bool) {
        self.link_changes.lock().push((link.clone(), up));
    }

    async fn purge_hashed_groups(&self, device: &DeviceId) {
        self.purged.lock().push(device.clone());
    }
}

/// A static fabric wired to recording collaborators.
pub struct Harness {
    pub fabric: Arc<StaticFabric>,
    pub rules: Arc<RecordingRules>,
    pub groups: Arc<RecordingGroups>,
    pub services: FabricServices,
    pub elector: Arc<OwnershipElector>,
}

impl Harness {
    pub fn new(fabric: Arc<StaticFabric>) -> Self {
        let rules = Arc::new(RecordingRules::new());
        let groups = Arc::new(RecordingGroups::new());
        let services = FabricServices {
            topology: fabric.clone(),
            config: fabric.clone(),
            mastership: fabric.clone(),
            cluster: fabric.clone(),
            rules: rules.clone(),
            groups: groups.clone(),
            ownership: Arc::new(InMemoryOwnershipStore::new()),
        };
        let elector = Arc::new(OwnershipElector::new(
            services.config.clone(),
            services.mastership.clone(),
            services.cluster.clone(),
            services.ownership.clone(),
        ));
        Self {
            fabric,
            rules,
            groups,
            services,
            elector,
        }
    }

    pub fn handler(&self) -> Arc<RoutingHandler> {
        Arc::new(RoutingHandler::new(
            self.services.clone(),
            RoutingConfig::default(),
        ))
    }
}
