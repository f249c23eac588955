//! Mastership change absorber.
//!
//! A mastership change may be the visible part of a controller node
//! joining or leaving the cluster, in which case the whole fabric is
//! rerouted once the dust settles. Plain switch reconnects are ignored.

use sonic_sr_types::DeviceId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::handler::RoutingHandler;

/// What the delayed mastership check decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterChangeAction {
    /// The switch went away and no cluster event explains it.
    IgnoredDeviceLost,
    /// The switch just came back; its own events handle it.
    IgnoredDeviceReturned,
    /// Hashed groups purged and a full reroute scheduled.
    FullReroute,
    /// A full reroute ran too recently.
    FullRerouteSkipped,
    /// Port filters reinstalled after an edge port update.
    EdgePortsReprogrammed,
    /// Routing is stable; nothing to do.
    None,
}

fn within(last: Option<Instant>, window: Duration) -> bool {
    last.is_some_and(|t| t.elapsed() < window)
}

impl RoutingHandler {
    /// Evaluates a mastership change of `device` after the configured delay.
    pub fn check_full_reroute_for_master_change(self: &Arc<Self>, device: DeviceId) {
        let handler = Arc::clone(self);
        let cancel = self.cancel.clone();
        let delay = self.config.master_change.delay();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    handler.evaluate_master_change(&device).await;
                }
            }
        });
    }

    pub async fn evaluate_master_change(self: &Arc<Self>, device: &DeviceId) -> MasterChangeAction {
        let thresholds = &self.config.master_change;
        let topology = &self.services.topology;

        let cluster_event = within(
            self.services.cluster.last_cluster_event(),
            thresholds.cluster_event_threshold(),
        );
        let available = topology.is_available(device);
        let has_master = self.services.mastership.master_of(device).is_some();
        if (!has_master || !available) && !cluster_event {
            debug!(device = %device, "Device lost and no cluster event, ignoring mastership change");
            return MasterChangeAction::IgnoredDeviceLost;
        }

        let device_event = within(
            topology.last_availability_change(device),
            thresholds.device_event_threshold(),
        );
        if available && device_event && !cluster_event {
            debug!(device = %device, "Device recently came back, ignoring mastership change");
            return MasterChangeAction::IgnoredDeviceReturned;
        }

        let edge_port_event = within(
            *self.last_edge_port_event.lock(),
            thresholds.edge_port_event_threshold(),
        );

        if !self.is_routing_stable() && cluster_event {
            warn!(device = %device, "Mastership changed after a cluster event, routing not stable");
            if self.services.mastership.is_local_master(device) {
                self.populate_port_addressing_rules(device).await;
            }

            let due = {
                let mut last = self.last_full_reroute.lock();
                let due = last.map_or(true, |t| t.elapsed() > thresholds.full_reroute_threshold());
                if due {
                    *last = Some(Instant::now());
                }
                due
            };
            if !due {
                warn!(device = %device, "Full reroute attempted too recently, skipping");
                return MasterChangeAction::FullRerouteSkipped;
            }

            info!("Purging hashed groups and scheduling a full reroute");
            for sw in topology.devices() {
                if self.elector.should_program(&sw).await {
                    self.services.groups.purge_hashed_groups(&sw).await;
                }
            }
            self.schedule_full_reroute();
            return MasterChangeAction::FullReroute;
        }

        if edge_port_event && cluster_event {
            warn!(device = %device, "Mastership changed after an edge port update, reprogramming filters");
            if self.elector.should_program(device).await {
                self.populate_port_addressing_rules(device).await;
            }
            return MasterChangeAction::EdgePortsReprogrammed;
        }

        debug!(device = %device, "Stable route after mastership change, nothing to do");
        MasterChangeAction::None
    }

    fn schedule_full_reroute(self: &Arc<Self>) {
        let handler = Arc::clone(self);
        let cancel = self.cancel.clone();
        let delay = self.config.master_change.purge_delay();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    handler.populate_all_routing_rules().await;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dev, FabricBuilder, Harness};
    use crate::types::PopulationStatus;
    use pretty_assertions::assert_eq;

    fn harness() -> Harness {
        Harness::new(
            FabricBuilder::new()
                .spine("S1")
                .edge("L1")
                .cable("L1", 1, "S1", 1)
                .build(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_device_without_cluster_event_is_ignored() {
        let h = harness();
        let handler = h.handler();
        h.fabric.set_available(&dev("L1"), false);
        assert_eq!(
            handler.evaluate_master_change(&dev("L1")).await,
            MasterChangeAction::IgnoredDeviceLost
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_is_ignored() {
        let h = harness();
        let handler = h.handler();
        h.fabric.set_available(&dev("L1"), false);
        h.fabric.set_available(&dev("L1"), true);
        assert_eq!(
            handler.evaluate_master_change(&dev("L1")).await,
            MasterChangeAction::IgnoredDeviceReturned
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cluster_event_during_instability_triggers_full_reroute() {
        let h = harness();
        let handler = h.handler();
        handler.populate_all_routing_rules().await;
        h.rules.clear();
        h.fabric.record_cluster_event();

        assert_eq!(
            handler.evaluate_master_change(&dev("L1")).await,
            MasterChangeAction::FullReroute
        );
        assert_eq!(h.groups.purged().len(), 2);
        assert_eq!(h.rules.port_filter_calls(&dev("L1")), 1);
        // A second change right after is absorbed.
        assert_eq!(
            handler.evaluate_master_change(&dev("S1")).await,
            MasterChangeAction::FullRerouteSkipped
        );

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(handler.status().await, PopulationStatus::Succeeded);
        assert!(!h.rules.mpls_rules().is_empty());
        handler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edge_port_event_reprograms_filters() {
        let h = harness();
        let handler = h.handler();
        h.fabric.record_cluster_event();
        handler.record_edge_port_event();

        assert_eq!(
            handler.evaluate_master_change(&dev("L1")).await,
            MasterChangeAction::EdgePortsReprogrammed
        );
        assert_eq!(h.rules.port_filter_calls(&dev("L1")), 1);
        handler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_routing_needs_nothing() {
        let h = harness();
        let handler = h.handler();
        assert_eq!(
            handler.evaluate_master_change(&dev("S1")).await,
            MasterChangeAction::None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_check_stops_on_shutdown() {
        let h = harness();
        let handler = h.handler();
        handler.populate_all_routing_rules().await;
        h.fabric.record_cluster_event();

        handler.check_full_reroute_for_master_change(dev("L1"));
        handler.shutdown().await;
        assert!(h.groups.purged().is_empty());
    }
}
