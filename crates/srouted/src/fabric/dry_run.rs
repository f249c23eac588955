//! Programming backend that only logs.
//!
//! Used by the daemon when it runs against a static fabric with no switch
//! agent attached: every instruction that would be pushed is logged and
//! counted instead.

use async_trait::async_trait;
use sonic_sr_types::{DeviceId, IpPrefix, Link};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::StaticFabric;
use crate::error::Result;
use crate::filter_retry::PortFilterInfo;
use crate::services::{GroupService, NextHopMap, NextHops, RulePopulator};

pub struct DryRunProgrammer {
    fabric: Arc<StaticFabric>,
    rules: AtomicU64,
}

impl DryRunProgrammer {
    pub fn new(fabric: Arc<StaticFabric>) -> Self {
        Self {
            fabric,
            rules: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RulePopulator for DryRunProgrammer {
    async fn populate_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
        dest1: &DeviceId,
        dest2: Option<&DeviceId>,
        next_hops: &NextHopMap,
    ) -> Result<()> {
        info!(
            target = %target,
            dest1 = %dest1,
            dest2 = ?dest2,
            ?subnets,
            ?next_hops,
            "Subnet route"
        );
        self.rules.fetch_add(subnets.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn revoke_ip_rule_for_subnet(
        &self,
        target: &DeviceId,
        subnets: &BTreeSet<IpPrefix>,
    ) -> Result<()> {
        info!(target = %target, ?subnets, "Revoke subnet route");
        Ok(())
    }

    async fn populate_mpls_rule(
        &self,
        target: &DeviceId,
        dest: &DeviceId,
        next_hops: &NextHops,
        router_ip: IpAddr,
    ) -> Result<()> {
        info!(target = %target, dest = %dest, %router_ip, ?next_hops, "MPLS transit rule");
        self.rules.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn populate_port_filters(&self, device: &DeviceId) -> Option<PortFilterInfo> {
        let ports = self
            .fabric
            .links()
            .iter()
            .filter(|l| l.src_device() == device)
            .count();
        let info = PortFilterInfo::new(0, 0, u32::try_from(ports).unwrap_or(u32::MAX));
        info!(device = %device, %info, "Port filters");
        Some(info)
    }

    fn rule_count(&self) -> u64 {
        self.rules.load(Ordering::Relaxed)
    }

    fn reset_rule_count(&self) {
        self.rules.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl GroupService for DryRunProgrammer {
    async fn fix_hash_groups(
        &self,
        target: &DeviceId,
        next_hops: &NextHops,
        dest: &DeviceId,
        revoke: bool,
    ) -> Result<()> {
        info!(target = %target, dest = %dest, ?next_hops, revoke, "Fix hash group buckets");
        Ok(())
    }

    async fn retry_hash(&self, link: &Link, link_down: bool, first_time: bool) {
        info!(link = %link, link_down, first_time, "Rehash parallel link");
    }

    async fn link_state_changed(&self, link: &Link, up: bool) {
        info!(link = %link, up, "Link state changed");
    }

    async fn purge_hashed_groups(&self, device: &DeviceId) {
        info!(device = %device, "Purge hashed groups");
    }
}
