//! Reroute orchestration.

use parking_lot::Mutex as SyncMutex;
use sonic_sr_types::{ConnectPoint, DeviceId, IpPrefix, Link};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::state::{GraphMap, RoutingState};
use crate::admission::LinkAdmission;
use crate::config::RoutingConfig;
use crate::election::OwnershipElector;
use crate::error::{Result, RoutingError};
use crate::filter_retry::FilterRetrier;
use crate::graph::EcmpGraph;
use crate::route_change::RouteChangeEngine;
use crate::services::{FabricServices, NextHopMap, NextHops};
use crate::types::{EdgePair, PopulationStatus, RouteChange};

/// One topology event handled by a reroute cycle.
#[derive(Debug, Clone, Copy)]
enum TopologyChange<'a> {
    LinkDown(&'a Link),
    LinkUp { link: &'a Link, seen_before: bool },
    SwitchDown(&'a DeviceId),
}

/// Sequences full and incremental reroutes of the fabric.
///
/// Every reroute cycle runs under the orchestration lock. A trigger that
/// finds the lock held is dropped with a warning and must be re-issued by
/// the caller. Snapshot state is only reachable through the lock.
pub struct RoutingHandler {
    pub(super) services: FabricServices,
    admission: Arc<LinkAdmission>,
    pub(super) elector: Arc<OwnershipElector>,
    pub(super) config: RoutingConfig,
    state: Mutex<RoutingState>,
    last_routing_change: SyncMutex<Option<Instant>>,
    pub(super) last_full_reroute: SyncMutex<Option<Instant>>,
    pub(super) last_edge_port_event: SyncMutex<Option<Instant>>,
    filters: FilterRetrier,
    pub(super) cancel: CancellationToken,
    pub(super) tracker: TaskTracker,
}

impl RoutingHandler {
    pub fn new(services: FabricServices, config: RoutingConfig) -> Self {
        let admission = Arc::new(LinkAdmission::new(services.config.clone()));
        let elector = Arc::new(OwnershipElector::new(
            services.config.clone(),
            services.mastership.clone(),
            services.cluster.clone(),
            services.ownership.clone(),
        ));
        let cancel = CancellationToken::new();
        let filters = FilterRetrier::new(
            services.rules.clone(),
            config.retry.clone(),
            cancel.child_token(),
        );
        Self {
            services,
            admission,
            elector,
            config,
            state: Mutex::new(RoutingState::default()),
            last_routing_change: SyncMutex::new(None),
            last_full_reroute: SyncMutex::new(None),
            last_edge_port_event: SyncMutex::new(None),
            filters,
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    pub fn services(&self) -> &FabricServices {
        &self.services
    }

    pub fn admission(&self) -> &Arc<LinkAdmission> {
        &self.admission
    }

    pub fn elector(&self) -> &Arc<OwnershipElector> {
        &self.elector
    }

    pub fn filters(&self) -> &FilterRetrier {
        &self.filters
    }

    /// Outcome of the most recent reroute cycle.
    pub async fn status(&self) -> PopulationStatus {
        self.state.lock().await.status
    }

    /// Canonical graphs, keyed by root switch.
    pub async fn current_graphs(&self) -> GraphMap {
        self.state.lock().await.current.clone()
    }

    /// Switches this instance programmed in the last cycle.
    pub async fn last_programmed(&self) -> BTreeSet<DeviceId> {
        self.state.lock().await.last_programmed.iter().cloned().collect()
    }

    /// True if no routing change happened within the stability threshold.
    pub fn is_routing_stable(&self) -> bool {
        match *self.last_routing_change.lock() {
            Some(last) => {
                let since = last.elapsed();
                trace!(since_secs = since.as_secs(), "Routing stable since");
                since > self.config.stability_threshold()
            }
            None => true,
        }
    }

    pub fn invalidate_should_program_cache(&self, device: &DeviceId) {
        self.elector.invalidate_cache(device);
    }

    pub fn record_edge_port_event(&self) {
        *self.last_edge_port_event.lock() = Some(Instant::now());
    }

    fn touch_routing_change(&self) {
        *self.last_routing_change.lock() = Some(Instant::now());
    }

    fn try_begin(&self, trigger: &'static str) -> Option<MutexGuard<'_, RoutingState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(trigger, "Previous rule population is not finished, cannot proceed");
                None
            }
        }
    }

    fn build_graph(&self, root: &DeviceId) -> Arc<EcmpGraph> {
        Arc::new(EcmpGraph::build(
            root,
            &*self.services.topology,
            self.admission.as_ref(),
        ))
    }

    /// Fresh graphs for `roots` and their pairs, with the edge pairs met.
    fn snapshot(&self, roots: impl IntoIterator<Item = DeviceId>) -> (GraphMap, BTreeSet<EdgePair>) {
        let mut graphs = GraphMap::new();
        let mut edge_pairs = BTreeSet::new();
        for root in roots {
            // The pair may not be available yet; its graph is still needed.
            if let Some(pair) = self.services.config.pair_of(&root) {
                graphs.insert(pair.clone(), self.build_graph(&pair));
                edge_pairs.insert(EdgePair::new(root.clone(), pair));
            }
            let graph = self.build_graph(&root);
            graphs.insert(root, graph);
        }
        (graphs, edge_pairs)
    }

    /// Runs a full population unless a cycle is already in flight.
    pub async fn start_population_process(&self) {
        self.populate_all_routing_rules().await;
    }

    /// Recomputes every graph and reprograms every route this instance
    /// owns. Typically triggered at startup or after a configuration change.
    pub async fn populate_all_routing_rules(&self) {
        self.touch_routing_change();
        let Some(mut state) = self.try_begin("populate_all_routing_rules") else {
            return;
        };
        state.status = PopulationStatus::Started;
        self.services.rules.reset_rule_count();
        info!("Starting to populate all routing rules");

        let routers = self.services.config.routers();
        let (updated, edge_pairs) = self.snapshot(routers.iter().cloned());
        state.updated = updated;

        let mut route_changes = BTreeSet::new();
        for dst in &routers {
            if !self.elector.should_program(dst).await {
                state.last_programmed.remove(dst);
                continue;
            }
            state.last_programmed.insert(dst.clone());
            // Full reroute: every route toward the switch has changed.
            for dev in self.elector.device_and_pair(dst) {
                for target in &routers {
                    if *target != dev {
                        route_changes.insert(RouteChange::path(target.clone(), dev.clone()));
                    }
                }
            }
        }

        match self.redo_routing(&mut state, route_changes, &edge_pairs, None).await {
            Ok(()) => {
                state.status = PopulationStatus::Succeeded;
                info!(
                    rules = self.services.rules.rule_count(),
                    "Completed all routing rule population"
                );
            }
            Err(e) => {
                state.status = PopulationStatus::Aborted;
                warn!(error = %e, "Failed to repopulate all routing rules");
            }
        }
    }

    /// Programs routes from every other edge switch toward the subnets
    /// attached at `connect_points`, which must be one switch or a
    /// redundant pair. Existing graphs are reused; a graph is only built for
    /// a switch that has none yet.
    ///
    /// Returns true if the cycle succeeded.
    pub async fn populate_subnet(
        &self,
        connect_points: &[ConnectPoint],
        subnets: &BTreeSet<IpPrefix>,
    ) -> bool {
        if connect_points.is_empty() || connect_points.len() > 2 {
            warn!(
                count = connect_points.len(),
                "Skipping populate_subnet due to illegal number of connect points"
            );
            return false;
        }

        self.touch_routing_change();
        let Some(mut state) = self.try_begin("populate_subnet") else {
            return false;
        };
        state.status = PopulationStatus::Started;
        self.services.rules.reset_rule_count();
        info!(?subnets, ?connect_points, "Starting to populate routing rules for added subnets");

        // A subnet change is not a topology change; the current graphs stay valid.
        let current: Vec<_> = state.current.iter().map(|(d, g)| (d.clone(), g.clone())).collect();
        state.updated.extend(current);

        let mut edge_pairs = BTreeSet::new();
        let handle_routing = if let [first, second] = connect_points {
            let (dev1, dev2) = (first.device(), second.device());
            match self.services.config.pair_of(dev1) {
                Some(pair) if pair == *dev2 => {
                    edge_pairs.insert(EdgePair::new(dev1.clone(), pair));
                }
                _ => {
                    warn!(
                        ?connect_points,
                        "Connect points not on paired switches, aborting populate_subnet"
                    );
                    state.status = PopulationStatus::Aborted;
                    return false;
                }
            }
            let mut handle = false;
            for cp in connect_points {
                self.ensure_graph(&mut state, cp.device());
                if self.elector.should_program(cp.device()).await {
                    handle = true;
                }
            }
            handle
        } else {
            let dst = connect_points[0].device();
            self.ensure_graph(&mut state, dst);
            self.elector.should_program(dst).await
        };

        if !handle_routing {
            debug!(?connect_points, "This instance is not handling routing to the connect points");
            state.status = PopulationStatus::Aborted;
            return false;
        }

        // Only edge targets need subnet routes, and never the connect points.
        let mut route_changes = BTreeSet::new();
        for cp in connect_points {
            let dst = cp.device();
            let pair = self.services.config.pair_of(dst);
            for target in self.services.topology.devices() {
                let is_edge = match self.services.config.is_edge_device(&target) {
                    Ok(edge) => edge,
                    Err(e) => {
                        warn!(target = %target, error = %e, "Skipping target in populate_subnet");
                        continue;
                    }
                };
                let is_pair = connect_points.len() == 2 && pair.as_ref() == Some(&target);
                if target == *dst || !is_edge || is_pair {
                    continue;
                }
                route_changes.insert(RouteChange::path(target, dst.clone()));
            }
        }

        match self
            .redo_routing(&mut state, route_changes, &edge_pairs, Some(subnets))
            .await
        {
            Ok(()) => {
                state.status = PopulationStatus::Succeeded;
                info!(
                    rules = self.services.rules.rule_count(),
                    "Completed subnet population"
                );
                true
            }
            Err(e) => {
                state.status = PopulationStatus::Aborted;
                warn!(error = %e, "Failed to repopulate the rules for subnet");
                false
            }
        }
    }

    fn ensure_graph(&self, state: &mut RoutingState, device: &DeviceId) {
        if !state.updated.contains_key(device) {
            warn!(device = %device, "No updated graph for device, creating");
            state.updated.insert(device.clone(), self.build_graph(device));
        }
    }

    /// Handles a link that went down: affected routes get their hash
    /// buckets revoked, never a full reroute.
    pub async fn populate_for_link_down(&self, link: &Link) {
        self.populate_for_topology_change(TopologyChange::LinkDown(link))
            .await;
    }

    /// Handles a link that came up. A link seen before only needs hash
    /// buckets added back; a brand new link reroutes the affected routes.
    pub async fn populate_for_link_up(&self, link: &Link, seen_before: bool) {
        self.populate_for_topology_change(TopologyChange::LinkUp { link, seen_before })
            .await;
    }

    /// Handles a switch that went away, links included.
    pub async fn populate_for_switch_down(&self, device: &DeviceId) {
        self.populate_for_topology_change(TopologyChange::SwitchDown(device))
            .await;
    }

    async fn populate_for_topology_change(&self, change: TopologyChange<'_>) {
        self.touch_routing_change();
        let Some(mut state) = self.try_begin("populate_for_topology_change") else {
            return;
        };

        let mut roots = self.services.topology.devices();
        if let TopologyChange::SwitchDown(failed) = change {
            if !roots.contains(failed) {
                roots.push(failed.clone());
            }
        }
        let (updated, edge_pairs) = self.snapshot(roots);
        state.updated = updated;

        info!(change = ?change, "Starting to populate routing rules from topology change");
        state.status = PopulationStatus::Started;
        self.services.rules.reset_rule_count();

        let engine = RouteChangeEngine::new(&self.services, &self.elector);
        let route_changes = match change {
            TopologyChange::LinkDown(link) => {
                let damaged = engine.diff_against_failed_link(&mut state, link).await;
                self.process_hash_group_change(&mut state, damaged, true, None)
                    .await;
                None
            }
            TopologyChange::LinkUp {
                seen_before: true, ..
            } => {
                let changed = engine.diff_on_topology_event(&mut state, None).await;
                self.process_hash_group_change(&mut state, changed, false, None)
                    .await;
                None
            }
            TopologyChange::LinkUp {
                seen_before: false, ..
            } => Some(engine.diff_on_topology_event(&mut state, None).await),
            TopologyChange::SwitchDown(failed) => {
                let changed = engine.diff_on_topology_event(&mut state, Some(failed)).await;
                self.process_hash_group_change(&mut state, changed, true, Some(failed))
                    .await;
                None
            }
        };

        let route_changes = match route_changes {
            None => {
                info!("Hash groups changed for link status change");
                state.status = PopulationStatus::Succeeded;
                return;
            }
            Some(changes) if changes.is_empty() => {
                info!("No re-route or re-hash attempted for the link status change");
                state.promote_all();
                state.status = PopulationStatus::Succeeded;
                return;
            }
            Some(changes) => changes,
        };

        match self
            .redo_routing(&mut state, route_changes, &edge_pairs, None)
            .await
        {
            Ok(()) => {
                state.status = PopulationStatus::Succeeded;
                info!(
                    rules = self.services.rules.rule_count(),
                    "Completed repopulation of rules for link status change"
                );
            }
            Err(e) => {
                state.status = PopulationStatus::Aborted;
                warn!(error = %e, "Failed to repopulate the rules for link status change");
            }
        }
    }

    /// Programs `route_changes`, edge pairs first. Nothing is promoted
    /// unless every route is programmed.
    async fn redo_routing(
        &self,
        state: &mut RoutingState,
        route_changes: BTreeSet<RouteChange>,
        edge_pairs: &BTreeSet<EdgePair>,
        subnets: Option<&BTreeSet<IpPrefix>>,
    ) -> Result<()> {
        let mut changed: BTreeSet<(DeviceId, DeviceId)> = BTreeSet::new();
        for route in route_changes {
            match route {
                RouteChange::All { root } => {
                    let Some(graph) = state.updated.get(&root) else {
                        warn!(root = %root, "No graph found, aborting redo_routing");
                        return Err(RoutingError::GraphUnavailable(root));
                    };
                    for target in graph.targets() {
                        changed.insert((target.clone(), root.clone()));
                    }
                }
                RouteChange::Path { target, root } => {
                    changed.insert((target, root));
                }
            }
        }

        self.redo_routing_edge_pairs(state, edge_pairs, subnets, &mut changed)
            .await?;
        let impacted = self
            .redo_routing_individual_dests(state, subnets, &changed)
            .await?;

        let mut promote: BTreeSet<DeviceId> = state.updated.keys().cloned().collect();
        for ep in edge_pairs {
            promote.insert(ep.dev1().clone());
            promote.insert(ep.dev2().clone());
        }
        promote.extend(impacted);
        for device in &promote {
            debug!(device = %device, "Updating graph");
            state.promote(device);
        }
        Ok(())
    }

    /// Programs edge targets toward each edge pair. Subnets shared by both
    /// switches of the pair become one dual-destination rule; subnets of one
    /// switch only are programmed toward that switch if a next hop exists.
    /// Handled routes are removed from `changed`.
    async fn redo_routing_edge_pairs(
        &self,
        state: &RoutingState,
        edge_pairs: &BTreeSet<EdgePair>,
        subnets: Option<&BTreeSet<IpPrefix>>,
        changed: &mut BTreeSet<(DeviceId, DeviceId)>,
    ) -> Result<()> {
        let config = &self.services.config;
        for ep in edge_pairs {
            let mut target_routes: BTreeMap<DeviceId, Vec<DeviceId>> = BTreeMap::new();
            let mut remaining = BTreeSet::new();
            for (target, dst) in std::mem::take(changed) {
                if !ep.includes(&dst) || !config.is_edge_device(&target)? {
                    remaining.insert((target, dst));
                    continue;
                }
                target_routes.entry(target).or_default().push(dst);
            }
            *changed = remaining;

            for (target, dsts) in target_routes {
                debug!(target = %target, edge_pair = %ep, "Redo routing toward edge pair");
                let mut per_dst = NextHopMap::new();
                for dst in dsts {
                    let next_hops = self.get_next_hops(state, &target, &dst)?;
                    debug!(target = %target, dst = %dst, ?next_hops, "Route found");
                    per_dst.insert(dst, next_hops);
                }

                let subnets_of = |dev: &DeviceId| match subnets {
                    Some(s) => s.clone(),
                    None => config.subnets(dev).unwrap_or_default(),
                };
                let ip_dev1 = subnets_of(ep.dev1());
                let ip_dev2 = subnets_of(ep.dev2());
                let reachable =
                    |dev: &DeviceId| per_dst.get(dev).is_some_and(|nh| !nh.is_empty());

                if !ep.includes(&target) && (reachable(ep.dev1()) || reachable(ep.dev2())) {
                    let common: BTreeSet<IpPrefix> =
                        ip_dev1.intersection(&ip_dev2).cloned().collect();
                    if !common.is_empty() {
                        self.populate_ecmp_routing_rule_partial(
                            &target,
                            ep.dev1(),
                            Some(ep.dev2()),
                            &per_dst,
                            &common,
                        )
                        .await?;
                    }
                }

                for (dev, own, other) in [
                    (ep.dev1(), &ip_dev1, &ip_dev2),
                    (ep.dev2(), &ip_dev2, &ip_dev1),
                ] {
                    let only: BTreeSet<IpPrefix> = own.difference(other).cloned().collect();
                    let Some(next_hops) = per_dst.get(dev).filter(|nh| !nh.is_empty()) else {
                        continue;
                    };
                    if only.is_empty() {
                        continue;
                    }
                    let single = NextHopMap::from([(dev.clone(), next_hops.clone())]);
                    self.populate_ecmp_routing_rule_partial(&target, dev, None, &single, &only)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Programs the routes left over after edge pairs, one destination at a
    /// time. Returns the destinations that were processed.
    async fn redo_routing_individual_dests(
        &self,
        state: &RoutingState,
        subnets: Option<&BTreeSet<IpPrefix>>,
        changed: &BTreeSet<(DeviceId, DeviceId)>,
    ) -> Result<BTreeSet<DeviceId>> {
        let mut by_dst: BTreeMap<&DeviceId, Vec<&DeviceId>> = BTreeMap::new();
        for (target, dst) in changed {
            by_dst.entry(dst).or_default().push(target);
        }

        let empty = BTreeSet::new();
        let subnets = subnets.unwrap_or(&empty);
        let mut impacted = BTreeSet::new();
        for (dst, targets) in by_dst {
            for target in targets {
                debug!(target = %target, dst = %dst, "Redo routing toward individual destination");
                let next_hops = self.get_next_hops(state, target, dst)?;
                if next_hops.is_empty() {
                    debug!(target = %target, dst = %dst, "No next hop, skipping route");
                    continue;
                }
                let map = NextHopMap::from([(dst.clone(), next_hops)]);
                self.populate_ecmp_routing_rule_partial(target, dst, None, &map, subnets)
                    .await?;
                debug!(target = %target, dst = %dst, "Populated route");
            }
            impacted.insert(dst.clone());
        }
        Ok(impacted)
    }

    /// Installs the rules on `target` toward `dest1` (and `dest2`).
    ///
    /// Edge to edge routes become subnet rules, with the destination's
    /// configured subnets when `subnets` is empty. Non-edge targets get MPLS
    /// rules for the destination's segment id, once per address family when
    /// the v4 and v6 segment ids differ. Edge switches never carry transit
    /// MPLS rules toward non-edge switches.
    async fn populate_ecmp_routing_rule_partial(
        &self,
        target: &DeviceId,
        dest1: &DeviceId,
        dest2: Option<&DeviceId>,
        next_hops: &NextHopMap,
        subnets: &BTreeSet<IpPrefix>,
    ) -> Result<()> {
        let config = &self.services.config;
        let rules = &self.services.rules;

        let target_is_edge = config.is_edge_device(target)?;
        let dest1_is_edge = config.is_edge_device(dest1)?;
        let dest1_ipv4 = config.router_ipv4(dest1)?;
        let dest1_ipv6 = config.router_ipv6(dest1)?;
        if let Some(dest2) = dest2 {
            config.router_ipv4(dest2)?;
        }

        if target_is_edge && dest1_is_edge {
            let subnets = if subnets.is_empty() {
                config.subnets(dest1)?
            } else {
                subnets.clone()
            };
            debug!(
                target = %target,
                dest1 = %dest1,
                dest2 = ?dest2,
                ?subnets,
                "Populating subnet rules"
            );
            rules
                .populate_ip_rule_for_subnet(target, &subnets, dest1, dest2, next_hops)
                .await?;
        }

        if !target_is_edge {
            debug!(target = %target, dest = %dest1, "Populating MPLS rules");
            let empty = NextHops::new();
            let hops = next_hops.get(dest1).unwrap_or(&empty);
            rules
                .populate_mpls_rule(target, dest1, hops, IpAddr::V4(dest1_ipv4))
                .await?;
            if let Some(ipv6) = dest1_ipv6 {
                let distinct_sids = match (config.ipv4_sid(dest1), config.ipv6_sid(dest1)) {
                    (Ok(v4), Ok(Some(v6))) => v4 != v6,
                    _ => false,
                };
                if distinct_sids {
                    rules
                        .populate_mpls_rule(target, dest1, hops, IpAddr::V6(ipv6))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Repairs hash buckets for each route instead of reprogramming it.
    ///
    /// A route that cannot be repaired keeps its graphs unpromoted while
    /// sibling routes are still promoted. Unaffected graphs are promoted only
    /// if every route was repaired.
    async fn process_hash_group_change(
        &self,
        state: &mut RoutingState,
        route_changes: BTreeSet<RouteChange>,
        link_or_switch_failed: bool,
        failed_switch: Option<&DeviceId>,
    ) {
        let mut changed: BTreeSet<(DeviceId, DeviceId)> = BTreeSet::new();
        for route in route_changes {
            match route {
                RouteChange::All { root } => {
                    for sw in self.services.topology.available_devices() {
                        if sw != root {
                            changed.insert((sw, root.clone()));
                        }
                    }
                }
                RouteChange::Path { target, root } => {
                    changed.insert((target, root));
                }
            }
        }

        let mut some_failed = false;
        let mut updated_devices = BTreeSet::new();
        for (target, dst) in &changed {
            if failed_switch == Some(target) {
                // Nothing can be pushed to a switch that is gone.
                state.promote(dst);
                state.current.remove(target);
                debug!(dst = %dst, target = %target, "Updating graph, removing failed switch");
                updated_devices.insert(target.clone());
                updated_devices.insert(dst.clone());
                continue;
            }
            match self
                .fix_hash_groups_for_route(state, target, dst, link_or_switch_failed)
                .await
            {
                Ok(()) => {
                    state.promote(target);
                    state.promote(dst);
                    debug!(target = %target, dst = %dst, "Updating graphs after hash group change");
                    updated_devices.insert(target.clone());
                    updated_devices.insert(dst.clone());
                }
                Err(e) => {
                    warn!(target = %target, dst = %dst, error = %e, "Hash group repair failed");
                    some_failed = true;
                }
            }
        }

        if !some_failed {
            let remaining: Vec<DeviceId> = state
                .updated
                .keys()
                .filter(|d| !updated_devices.contains(*d))
                .cloned()
                .collect();
            for device in &remaining {
                debug!(device = %device, "Updating graph for remaining device");
                state.promote(device);
            }
        }
    }

    async fn fix_hash_groups_for_route(
        &self,
        state: &RoutingState,
        target: &DeviceId,
        dst: &DeviceId,
        revoke: bool,
    ) -> Result<()> {
        let next_hops = self.get_next_hops(state, target, dst)?;
        debug!(
            target = %target,
            dst = %dst,
            ?next_hops,
            revoke,
            "Fixing hash group buckets"
        );
        self.services
            .groups
            .fix_hash_groups(target, &next_hops, dst, revoke)
            .await
    }

    /// Next hops on `target` toward `dst` in the in-flight graph of `dst`.
    ///
    /// Empty if `target` cannot reach `dst`, or if a path would transit an
    /// edge switch: always for edge targets, and beyond one hop for the
    /// others.
    fn get_next_hops(&self, state: &RoutingState, target: &DeviceId, dst: &DeviceId) -> Result<NextHops> {
        let config = &self.services.config;
        let target_is_edge = config.is_edge_device(target).unwrap_or_else(|e| {
            warn!(target = %target, error = %e, "Cannot determine if target is edge");
            false
        });

        let graph = state
            .updated
            .get(dst)
            .ok_or_else(|| RoutingError::GraphUnavailable(dst.clone()))?;
        let Some((distance, vias)) = graph.vias(target) else {
            debug!(target = %target, dst = %dst, "No next hops found");
            return Ok(NextHops::new());
        };

        if target_is_edge || distance > 1 {
            for via in vias {
                if let Some(edge) = via
                    .iter()
                    .find(|hop| matches!(config.is_edge_device(hop), Ok(true)))
                {
                    debug!(
                        target = %target,
                        dst = %dst,
                        distance,
                        edge = %edge,
                        "Avoiding path through an edge switch"
                    );
                    return Ok(NextHops::new());
                }
            }
        }

        let next_hops: NextHops = vias
            .iter()
            .map(|via| via.first().unwrap_or(dst).clone())
            .collect();
        debug!(target = %target, dst = %dst, ?next_hops, "Next hops");
        Ok(next_hops)
    }

    /// Revokes the subnet rules on every available switch this instance
    /// programs. Stops at the first failure.
    pub async fn revoke_subnet(&self, subnets: &BTreeSet<IpPrefix>) -> bool {
        let _state = self.state.lock().await;
        for target in self.services.topology.available_devices() {
            if !self.elector.should_program(&target).await {
                continue;
            }
            if let Err(e) = self
                .services
                .rules
                .revoke_ip_rule_for_subnet(&target, subnets)
                .await
            {
                warn!(target = %target, error = %e, "Failed to revoke subnet rules");
                return false;
            }
        }
        true
    }

    /// Drops the graphs rooted at a switch that is no longer available.
    pub async fn purge_ecmp_graph(&self, device: &DeviceId) {
        let mut state = self.state.lock().await;
        debug!(device = %device, "Purging graphs for unavailable device");
        state.current.remove(device);
        state.updated.remove(device);
    }

    /// Installs the port filters of `device` and keeps retrying until the
    /// result settles.
    pub async fn populate_port_addressing_rules(&self, device: &DeviceId) {
        self.filters.populate(device).await;
    }

    /// Stops every timer task and waits for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.filters.shutdown().await;
        self.tracker.close();
        self.tracker.wait().await;
        info!("Routing handler stopped");
    }
}
