//! Event dispatch daemon.
//!
//! Topology, mastership and configuration notifications are queued on a
//! bounded channel and handled one at a time by a single worker. Events
//! describe changes already visible through the collaborator services.

use sonic_sr_types::{ConnectPoint, DeviceId, IpPrefix, Link};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::link_handler::LinkHandler;
use crate::routing::RoutingHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    LinkAdded(Link),
    LinkRemoved(Link),
    DeviceAvailable(DeviceId),
    DeviceUnavailable(DeviceId),
    DeviceRemoved(DeviceId),
    MastershipChanged(DeviceId),
    SubnetAdded {
        connect_points: Vec<ConnectPoint>,
        subnets: BTreeSet<IpPrefix>,
    },
    SubnetRemoved(BTreeSet<IpPrefix>),
    EdgePortUpdated(ConnectPoint),
    ConfigChanged,
}

impl fmt::Display for TopologyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyEvent::LinkAdded(l) => write!(f, "LINK_ADDED {}", l),
            TopologyEvent::LinkRemoved(l) => write!(f, "LINK_REMOVED {}", l),
            TopologyEvent::DeviceAvailable(d) => write!(f, "DEVICE_AVAILABLE {}", d),
            TopologyEvent::DeviceUnavailable(d) => write!(f, "DEVICE_UNAVAILABLE {}", d),
            TopologyEvent::DeviceRemoved(d) => write!(f, "DEVICE_REMOVED {}", d),
            TopologyEvent::MastershipChanged(d) => write!(f, "MASTER_CHANGED {}", d),
            TopologyEvent::SubnetAdded { subnets, .. } => {
                write!(f, "SUBNET_ADDED {} prefixes", subnets.len())
            }
            TopologyEvent::SubnetRemoved(s) => write!(f, "SUBNET_REMOVED {} prefixes", s.len()),
            TopologyEvent::EdgePortUpdated(cp) => write!(f, "EDGE_PORT_UPDATED {}", cp),
            TopologyEvent::ConfigChanged => f.write_str("CONFIG_CHANGED"),
        }
    }
}

/// Sending half handed to event producers.
pub type EventSender = mpsc::Sender<TopologyEvent>;

pub struct RoutingDaemon {
    routing: Arc<RoutingHandler>,
    links: LinkHandler,
    events: mpsc::Receiver<TopologyEvent>,
}

impl RoutingDaemon {
    pub fn new(routing: Arc<RoutingHandler>, queue_depth: usize) -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let daemon = Self {
            links: LinkHandler::new(routing.clone()),
            routing,
            events: rx,
        };
        (daemon, tx)
    }

    pub fn routing(&self) -> &Arc<RoutingHandler> {
        &self.routing
    }

    /// Populates the whole fabric, then handles events until `cancel` fires
    /// or every sender is gone. Timer tasks are stopped before returning.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Routing daemon started");
        self.routing.start_population_process().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Event channel closed");
                        break;
                    }
                },
            }
        }

        self.routing.shutdown().await;
        info!("Routing daemon stopped");
    }

    pub async fn handle_event(&self, event: TopologyEvent) {
        debug!(event = %event, "Processing event");
        let services = self.routing.services();
        match event {
            TopologyEvent::LinkAdded(link) => self.links.process_link_added(&link).await,
            TopologyEvent::LinkRemoved(link) => self.links.process_link_removed(&link).await,
            TopologyEvent::DeviceAvailable(device) => {
                if !services.config.is_configured(&device) {
                    warn!(device = %device, "Device configuration not available yet, ignoring");
                    return;
                }
                if services.mastership.is_local_master(&device) {
                    self.routing.populate_port_addressing_rules(&device).await;
                }
            }
            TopologyEvent::DeviceUnavailable(device) | TopologyEvent::DeviceRemoved(device) => {
                self.links.process_device_removed(&device).await;
            }
            TopologyEvent::MastershipChanged(device) => {
                for dev in self.routing.elector().device_and_pair(&device) {
                    self.routing.invalidate_should_program_cache(&dev);
                }
                self.routing.check_full_reroute_for_master_change(device);
            }
            TopologyEvent::SubnetAdded {
                connect_points,
                subnets,
            } => {
                if !self.routing.populate_subnet(&connect_points, &subnets).await {
                    warn!(?subnets, "Subnet population did not complete");
                }
            }
            TopologyEvent::SubnetRemoved(subnets) => {
                if !self.routing.revoke_subnet(&subnets).await {
                    warn!(?subnets, "Subnet revocation did not complete");
                }
            }
            TopologyEvent::EdgePortUpdated(cp) => {
                debug!(port = %cp, "Edge port updated");
                self.routing.record_edge_port_event();
            }
            TopologyEvent::ConfigChanged => {
                for device in services.topology.devices() {
                    self.routing.invalidate_should_program_cache(&device);
                }
                self.routing.start_population_process().await;
            }
        }
    }
}
