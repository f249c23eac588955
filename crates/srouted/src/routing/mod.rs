//! Route orchestration.
//!
//! [`RoutingHandler`] owns the graph snapshots and serializes every reroute
//! behind one lock. Triggers arriving while a cycle runs are dropped, not
//! queued.

mod handler;
mod master_change;
mod state;

pub use handler::RoutingHandler;
pub use master_change::MasterChangeAction;
pub use state::{GraphMap, RoutingState};
