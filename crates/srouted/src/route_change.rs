//! Reduction of topology deltas to the set of routes that must change.

use sonic_sr_types::{DeviceId, Link};
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

use crate::election::OwnershipElector;
use crate::graph::EcmpGraph;
use crate::routing::RoutingState;
use crate::services::FabricServices;
use crate::types::RouteChange;

/// Routes toward `root` that differ between two graphs of the same root,
/// in either direction.
///
/// A target is flagged when it is missing from one graph, when its via
/// sets differ, or when its hop distance changed.
pub fn diff(new: &EcmpGraph, old: &EcmpGraph, root: &DeviceId) -> BTreeSet<RouteChange> {
    let mut changed = compare_graphs(new, old, root);
    changed.extend(compare_graphs(old, new, root));
    changed
}

fn compare_graphs(base: &EcmpGraph, comp: &EcmpGraph, root: &DeviceId) -> BTreeSet<RouteChange> {
    let mut changed = BTreeSet::new();
    for (distance, targets) in base.via_map() {
        for (target, base_vias) in targets {
            let same = match comp.vias(target) {
                Some((d, comp_vias)) => d == *distance && comp_vias == base_vias,
                None => false,
            };
            if !same {
                trace!(target = %target, root = %root, "Impacted route");
                changed.insert(RouteChange::path(target.clone(), root.clone()));
            }
        }
    }
    changed
}

/// Targets of `old` with at least one shortest path crossing the switches
/// joined by `failed`, in either direction.
pub fn diff_against_failed_link(old: &EcmpGraph, failed: &Link) -> BTreeSet<RouteChange> {
    let (a, b) = (failed.src_device(), failed.dst_device());
    old.targets()
        .filter(|target| {
            old.paths(target)
                .iter()
                .any(|path| path.iter().any(|l| l.connects(a, b)))
        })
        .map(|target| {
            debug!(target = %target, root = %old.root(), link = %failed, "Impacted route");
            RouteChange::path(target.clone(), old.root().clone())
        })
        .collect()
}

/// Topology-wide route change computation over the routing snapshots.
///
/// Iterates the switches this instance programs. Gaining responsibility for
/// a switch since the last cycle drops its current graph so that every
/// route toward it is recomputed.
pub struct RouteChangeEngine<'a> {
    services: &'a FabricServices,
    elector: &'a OwnershipElector,
}

impl<'a> RouteChangeEngine<'a> {
    pub fn new(services: &'a FabricServices, elector: &'a OwnershipElector) -> Self {
        Self { services, elector }
    }

    /// Roots of the switches this instance programs, with the bookkeeping
    /// of newly gained responsibility applied.
    async fn responsible_roots(&self, state: &mut RoutingState) -> Vec<DeviceId> {
        let mut roots = Vec::new();
        for sw in self.services.topology.devices() {
            if !self.elector.should_program(&sw).await {
                state.last_programmed.remove(&sw);
                continue;
            }
            if !state.last_programmed.contains(&sw) {
                warn!(device = %sw, "New responsibility to program device, dropping current graph");
                state.current.remove(&sw);
            }
            state.last_programmed.insert(sw.clone());
            roots.extend(self.elector.device_and_pair(&sw));
        }
        roots
    }

    /// Routes whose current paths use the switches joined by `failed`.
    pub async fn diff_against_failed_link(
        &self,
        state: &mut RoutingState,
        failed: &Link,
    ) -> BTreeSet<RouteChange> {
        let mut routes = BTreeSet::new();
        for root in self.responsible_roots(state).await {
            match state.current.get(&root) {
                Some(graph) => routes.extend(diff_against_failed_link(graph, failed)),
                None => {
                    warn!(root = %root, "No existing ECMP graph, assuming all route-paths toward it changed");
                    for target in self.services.config.routers() {
                        if target != root {
                            routes.insert(RouteChange::path(target, root.clone()));
                        }
                    }
                }
            }
        }
        routes
    }

    /// Routes changed between the current and in-flight graphs.
    ///
    /// When `failed_switch` has no available pair, every other locally
    /// mastered switch gets a route toward it since the failed switch can
    /// no longer be a graph root.
    pub async fn diff_on_topology_event(
        &self,
        state: &mut RoutingState,
        failed_switch: Option<&DeviceId>,
    ) -> BTreeSet<RouteChange> {
        let mut changed = BTreeSet::new();
        for root in self.responsible_roots(state).await {
            let Some(current) = state.current.get(&root) else {
                debug!(root = %root, "No existing ECMP graph, adding self as changed route");
                changed.insert(RouteChange::all(root));
                continue;
            };
            let Some(updated) = state.updated.get(&root) else {
                warn!(root = %root, "Cannot find updated ECMP graph");
                continue;
            };
            changed.extend(diff(updated, current, &root));
        }

        if let Some(failed) = failed_switch {
            let topology = &self.services.topology;
            let pair_up = self
                .services
                .config
                .pair_of(failed)
                .is_some_and(|p| topology.is_available(&p));
            if !pair_up {
                debug!(device = %failed, "Proxy route changes to downed switch");
                for dev in topology.devices() {
                    if dev != *failed && self.services.mastership.is_local_master(&dev) {
                        changed.insert(RouteChange::path(dev, failed.clone()));
                    }
                }
            }
        }

        for route in &changed {
            debug!(route = %route, "Route change");
        }
        changed
    }
}
