//! Link and switch event processing.

use parking_lot::Mutex;
use sonic_sr_types::{DeviceId, Link};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::routing::RoutingHandler;

/// Turns link notifications into topology changes once both directions of
/// a link agree.
pub struct LinkHandler {
    routing: Arc<RoutingHandler>,
    /// Links that were already seen when they last came up, held until
    /// their bidirectional link has been processed.
    seen_before: Mutex<HashSet<Link>>,
}

impl LinkHandler {
    pub fn new(routing: Arc<RoutingHandler>) -> Self {
        Self {
            routing,
            seen_before: Mutex::new(HashSet::new()),
        }
    }

    pub async fn process_link_added(&self, link: &Link) {
        let admission = self.routing.admission();
        if let Some(reason) = admission.check(link) {
            debug!(link = %link, ?reason, "Ignoring link");
            return;
        }

        if admission.update_seen_link(link, true) {
            self.seen_before.lock().insert(link.clone());
        }
        let services = self.routing.services();
        if !services.config.is_configured(link.src_device()) {
            warn!(link = %link, "Source device not configured yet, skipping link");
            return;
        }
        if !admission.is_bidirectional_up(link) {
            debug!(link = %link, "Link up in one direction only, waiting for the reverse");
            return;
        }

        info!(link = %link, "Bidirectional link up");
        let components = admission.bidi_component_links(link);
        for component in &components {
            services.groups.link_state_changed(component, true).await;
        }
        for component in &components {
            let seen_before = self.seen_before.lock().remove(component);
            debug!(link = %component, seen_before, "Processing component link up");
            self.routing
                .populate_for_link_up(component, seen_before)
                .await;
            if services.mastership.is_local_master(component.src_device())
                && admission.is_parallel(component)
            {
                services
                    .groups
                    .retry_hash(component, false, !seen_before)
                    .await;
            }
        }
    }

    pub async fn process_link_removed(&self, link: &Link) {
        let admission = self.routing.admission();
        let services = self.routing.services();
        admission.update_seen_link(link, false);

        let topology = &services.topology;
        if !topology.is_available(link.src_device()) || !topology.is_available(link.dst_device()) {
            // Switch removal takes care of its links.
            debug!(link = %link, "Endpoint unavailable, purging link");
            admission.purge(link);
            return;
        }
        if !admission.is_bidirectional_down(link) {
            debug!(link = %link, "Link down in one direction only, waiting for the reverse");
            return;
        }

        info!(link = %link, "Bidirectional link down");
        for component in admission.bidi_component_links(link) {
            self.routing.populate_for_link_down(&component).await;
            if services.mastership.is_local_master(component.src_device())
                && admission.is_parallel(&component)
            {
                services.groups.retry_hash(&component, true, false).await;
            }
            services.groups.link_state_changed(&component, false).await;
        }
    }

    /// Drops every trace of a switch that left the fabric.
    pub async fn process_device_removed(&self, device: &DeviceId) {
        info!(device = %device, "Device removed");
        self.routing.admission().purge_device(device);
        self.routing.populate_for_switch_down(device).await;
        self.routing.purge_ecmp_graph(device).await;
    }
}
