//! Segment routing fabric controller core.
//!
//! Computes ECMP shortest-path graphs toward every switch of a leaf-spine
//! fabric and keeps the programmed forwarding state in line with the
//! topology:
//!
//! - [`graph`]: multi-path BFS graph per root switch
//! - [`admission`]: which links path computation may use
//! - [`election`]: which controller instance programs which switch
//! - [`route_change`]: reduces topology deltas to changed routes
//! - [`routing`]: serialized reroute cycles with all-or-nothing promotion
//! - [`filter_retry`]: port filter installation with backoff
//! - [`daemon`]: event dispatch over a single worker
//!
//! Switch programming, topology discovery and cluster membership are
//! reached through the traits in [`services`].

pub mod admission;
pub mod config;
pub mod daemon;
pub mod election;
pub mod error;
pub mod fabric;
pub mod filter_retry;
pub mod graph;
pub mod link_handler;
pub mod route_change;
pub mod routing;
pub mod services;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::RoutingConfig;
pub use daemon::{EventSender, RoutingDaemon, TopologyEvent};
pub use error::{Result, RoutingError};
pub use graph::EcmpGraph;
pub use routing::RoutingHandler;
pub use services::FabricServices;
pub use types::{EdgePair, PopulationStatus, RouteChange};
