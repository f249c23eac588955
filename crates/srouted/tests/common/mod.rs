//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sonic_sr_types::{DeviceId, IpPrefix, Link};
use sonic_srouted::election::InMemoryOwnershipStore;
use sonic_srouted::fabric::{FabricConfig, StaticFabric};
use sonic_srouted::filter_retry::PortFilterInfo;
use sonic_srouted::services::{GroupService, NextHopMap, NextHops, RulePopulator};
use sonic_srouted::{FabricServices, Result, RoutingConfig, RoutingError, RoutingHandler};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

/// Two spines, an edge pair (leaf1/leaf2) and a single-homed leaf3.
pub const LEAF_SPINE: &str = r#"
local_node = "n1"

[devices."leaf1"]
edge = true
pair = "leaf2"
pair_port = 9
subnets = ["10.0.12.0/24", "10.0.1.0/24"]
router_ipv4 = "192.168.0.11"
ipv4_sid = 111
master = "n1"

[devices."leaf2"]
edge = true
pair = "leaf1"
pair_port = 9
subnets = ["10.0.12.0/24"]
router_ipv4 = "192.168.0.12"
ipv4_sid = 112
master = "n1"

[devices."leaf3"]
edge = true
subnets = ["10.0.3.0/24"]
router_ipv4 = "192.168.0.13"
router_ipv6 = "2001:db8::13"
ipv4_sid = 113
ipv6_sid = 213
master = "n1"

[devices."spine1"]
router_ipv4 = "192.168.0.1"
ipv4_sid = 101
master = "n1"

[devices."spine2"]
router_ipv4 = "192.168.0.2"
ipv4_sid = 102
master = "n1"

[[links]]
a = "leaf1/1"
b = "spine1/1"

[[links]]
a = "leaf1/2"
b = "spine2/1"

[[links]]
a = "leaf2/1"
b = "spine1/2"

[[links]]
a = "leaf2/2"
b = "spine2/2"

[[links]]
a = "leaf3/1"
b = "spine1/3"

[[links]]
a = "leaf3/2"
b = "spine2/3"

[[links]]
a = "leaf1/9"
b = "leaf2/9"
"#;

pub fn dev(id: &str) -> DeviceId {
    id.parse().unwrap()
}

pub fn prefix(s: &str) -> IpPrefix {
    s.parse().unwrap()
}

pub fn link(src: &str, dst: &str) -> Link {
    Link::new(src.parse().unwrap(), dst.parse().unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Programmed {
    Subnet {
        target: DeviceId,
        subnets: BTreeSet<IpPrefix>,
        dest1: DeviceId,
        dest2: Option<DeviceId>,
        next_hops: NextHopMap,
    },
    Mpls {
        target: DeviceId,
        dest: DeviceId,
        next_hops: NextHops,
        router_ip: IpAddr,
    },
    Revoke {
        target: DeviceId,
        subnets: BTreeSet<IpPrefix>,
    },
    Fix {
        target: DeviceId,
        next_hops: NextHops,
        dest: DeviceId,
        revoke: bool,
    },
}

/// Records programming requests and fails once its budget runs out.
#[derive(Default)]
pub struct Recorder {
    log: Mutex<Vec<Programmed>>,
    budget: Mutex<Option<usize>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<Programmed> {
        std::mem::take(&mut *self.log.lock())
    }

    pub fn fail_after(&self, n: usize) {
        *self.budget.lock() = Some(n);
    }

    pub fn heal(&self) {
        *self.budget.lock() = None;
    }

    fn record(&self, entry: Programmed, device: &DeviceId) -> Result<()> {
        let mut budget = self.budget.lock();
        if let Some(n) = budget.as_mut() {
            if *n == 0 {
                return Err(RoutingError::Programming {
                    device: device.clone(),
                    reason: "switch agent unreachable".to_string(),
                });
            }
            *n -= 1;
        }
        self.log.lock().push(entry);
        Ok(())
    }
}

#[async_trait]
impl RulePopulator for Recorder {
    async fn populate_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
        dest1: &DeviceId,
        dest2: Option<&DeviceId>,
        next_hops: &NextHopMap,
    ) -> Result<()> {
        self.record(
            Programmed::Subnet {
                target: target.clone(),
                subnets: subnets.clone(),
                dest1: dest1.clone(),
                dest2: dest2.cloned(),
                next_hops: next_hops.clone(),
            },
            target,
        )
    }

    async fn revoke_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
    ) -> Result<()> {
        self.record(
            Programmed::Revoke {
                target: target.clone(),
                subnets: subnets.clone(),
            },
            target,
        )
    }

    async fn populate_mpls_rule(
        &self,
        target: &DeviceId,
        dest: &DeviceId,
        next_hops: &NextHops,
        router_ip: IpAddr,
    ) -> Result<()> {
        self.record(
            Programmed::Mpls {
                target: target.clone(),
                dest: dest.clone(),
                next_hops: next_hops.clone(),
                router_ip,
            },
            target,
        )
    }

    async fn populate_port_filters(&self, _device: &DeviceId) -> Option<PortFilterInfo> {
        Some(PortFilterInfo::new(0, 0, 3))
    }

    fn rule_count(&self) -> u64 {
        self.log.lock().len() as u64
    }

    fn reset_rule_count(&self) {}
}

#[async_trait]
impl GroupService for Recorder {
    async fn fix_hash_groups(
        &self,
        target: &DeviceId,
        next_hops: &NextHops,
        dest: &DeviceId,
        revoke: bool,
    ) -> Result<()> {
        self.record(
            Programmed::Fix {
                target: target.clone(),
                next_hops: next_hops.clone(),
                dest: dest.clone(),
                revoke,
            },
            target,
        )
    }

    async fn retry_hash(&self, _link: &Link, _link_down: bool, _first_time: bool) {}

    async fn link_state_changed(&self, _link: &Link, _up: bool) {}

    async fn purge_hashed_groups(&self, _device: &DeviceId) {}
}

pub struct TestFabric {
    pub fabric: Arc<StaticFabric>,
    pub recorder: Arc<Recorder>,
    pub routing: Arc<RoutingHandler>,
}

impl TestFabric {
    pub fn new(description: &str) -> Self {
        let config: FabricConfig = toml::from_str(description).unwrap();
        config.validate().unwrap();
        let local = config.local_node.clone().unwrap();
        let fabric = Arc::new(StaticFabric::new(config, local));
        let recorder = Arc::new(Recorder::default());
        let services = FabricServices {
            topology: fabric.clone(),
            config: fabric.clone(),
            mastership: fabric.clone(),
            cluster: fabric.clone(),
            rules: recorder.clone(),
            groups: recorder.clone(),
            ownership: Arc::new(InMemoryOwnershipStore::new()),
        };
        let routing = Arc::new(RoutingHandler::new(services, RoutingConfig::default()));
        Self {
            fabric,
            recorder,
            routing,
        }
    }

    /// Takes a cable out of the fabric, both directions.
    pub fn cut(&self, l: &Link) {
        self.fabric.remove_link(l);
        self.fabric.remove_link(&l.reversed());
    }
}
