//! Shared routing value types.

use sonic_sr_types::DeviceId;
use std::fmt;

/// Two edge switches configured as each other's redundant pair.
///
/// Equality, ordering and hashing ignore the order the switches were
/// given in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgePair {
    dev1: DeviceId,
    dev2: DeviceId,
}

impl EdgePair {
    pub fn new(a: DeviceId, b: DeviceId) -> Self {
        if a <= b {
            EdgePair { dev1: a, dev2: b }
        } else {
            EdgePair { dev1: b, dev2: a }
        }
    }

    /// The smaller switch id of the pair.
    pub fn dev1(&self) -> &DeviceId {
        &self.dev1
    }

    pub fn dev2(&self) -> &DeviceId {
        &self.dev2
    }

    pub fn includes(&self, device: &DeviceId) -> bool {
        self.dev1 == *device || self.dev2 == *device
    }
}

impl fmt::Display for EdgePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgePair({} & {})", self.dev1, self.dev2)
    }
}

/// A route whose forwarding state must be recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouteChange {
    /// Every other switch toward `root`.
    All { root: DeviceId },
    /// `target`'s state toward `root`.
    Path { target: DeviceId, root: DeviceId },
}

impl RouteChange {
    pub fn all(root: DeviceId) -> Self {
        RouteChange::All { root }
    }

    pub fn path(target: DeviceId, root: DeviceId) -> Self {
        RouteChange::Path { target, root }
    }
}

impl fmt::Display for RouteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteChange::All { root } => write!(f, "[* -> {}]", root),
            RouteChange::Path { target, root } => write!(f, "[{} -> {}]", target, root),
        }
    }
}

/// Outcome of the most recent reroute computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PopulationStatus {
    #[default]
    Idle,
    Started,
    Aborted,
    Succeeded,
}

impl fmt::Display for PopulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PopulationStatus::Idle => "IDLE",
            PopulationStatus::Started => "STARTED",
            PopulationStatus::Aborted => "ABORTED",
            PopulationStatus::Succeeded => "SUCCEEDED",
        };
        f.write_str(s)
    }
}
