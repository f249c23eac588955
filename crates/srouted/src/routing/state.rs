//! Snapshot state owned by the routing handler.

use sonic_sr_types::DeviceId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::graph::EcmpGraph;
use crate::types::PopulationStatus;

/// Path graphs keyed by root switch.
pub type GraphMap = HashMap<DeviceId, Arc<EcmpGraph>>;

/// Everything guarded by the orchestration lock.
#[derive(Default)]
pub struct RoutingState {
    pub status: PopulationStatus,
    /// Graphs the programmed state of the fabric corresponds to.
    pub current: GraphMap,
    /// Graphs computed for the cycle in flight.
    pub updated: GraphMap,
    /// Switches this instance was responsible for in the last cycle.
    pub last_programmed: HashSet<DeviceId>,
}

impl RoutingState {
    /// Makes the in-flight graph of `device` canonical. A switch with no
    /// in-flight graph loses its current one.
    pub fn promote(&mut self, device: &DeviceId) {
        match self.updated.get(device) {
            Some(graph) => {
                self.current.insert(device.clone(), graph.clone());
            }
            None => {
                self.current.remove(device);
            }
        }
    }

    /// Promotes every in-flight graph.
    pub fn promote_all(&mut self) {
        for (device, graph) in &self.updated {
            self.current.insert(device.clone(), graph.clone());
        }
    }
}
