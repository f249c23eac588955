//! Link admission policy and the seen-link registry.

use parking_lot::Mutex;
use sonic_sr_types::{DeviceId, Link, LinkType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::graph::LinkPolicy;
use crate::services::DeviceConfiguration;

/// Why a link was refused for path computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotDirect(LinkType),
    SameSwitch,
    LeafToLeaf,
}

/// Decides which links take part in path computation and remembers every
/// link this instance has observed.
///
/// The registry maps a link to its last known state (`true` = up). A link
/// present in the registry has been seen before, whatever its state.
pub struct LinkAdmission {
    config: Arc<dyn DeviceConfiguration>,
    seen: Mutex<HashMap<Link, bool>>,
}

impl LinkAdmission {
    pub fn new(config: Arc<dyn DeviceConfiguration>) -> Self {
        Self {
            config,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns why `link` is refused, or `None` if it is admitted.
    ///
    /// Links between two edge switches are only admitted when they are the
    /// configured pair link. Unconfigured endpoints are admitted so the link
    /// is still tracked until configuration arrives.
    pub fn check(&self, link: &Link) -> Option<Rejection> {
        if link.link_type() != LinkType::Direct {
            return Some(Rejection::NotDirect(link.link_type()));
        }
        if link.src_device() == link.dst_device() {
            return Some(Rejection::SameSwitch);
        }
        let both_edge = match (
            self.config.is_edge_device(link.src_device()),
            self.config.is_edge_device(link.dst_device()),
        ) {
            (Ok(src), Ok(dst)) => src && dst,
            _ => {
                debug!(link = %link, "Endpoints not configured yet, admitting link");
                return None;
            }
        };
        if both_edge && !self.is_redundant_pair_link(link) {
            return Some(Rejection::LeafToLeaf);
        }
        None
    }

    pub fn is_admitted(&self, link: &Link) -> bool {
        self.check(link).is_none()
    }

    /// True if `link` joins two paired edge switches on their configured
    /// pair ports.
    pub fn is_redundant_pair_link(&self, link: &Link) -> bool {
        let (src, dst) = (link.src_device(), link.dst_device());
        let config = &self.config;
        let edge = matches!(config.is_edge_device(src), Ok(true))
            && matches!(config.is_edge_device(dst), Ok(true));
        if !edge {
            return false;
        }
        config.pair_of(src).as_ref() == Some(dst)
            && config.pair_of(dst).as_ref() == Some(src)
            && matches!(config.pair_local_port(src), Ok(Some(p)) if p == link.src().port())
            && matches!(config.pair_local_port(dst), Ok(Some(p)) if p == link.dst().port())
    }

    /// Records the state of `link`. Returns true if it had been seen before.
    pub fn update_seen_link(&self, link: &Link, up: bool) -> bool {
        self.seen.lock().insert(link.clone(), up).is_some()
    }

    pub fn is_seen(&self, link: &Link) -> bool {
        self.seen.lock().contains_key(link)
    }

    /// Last recorded state, `None` if never seen.
    pub fn seen_state(&self, link: &Link) -> Option<bool> {
        self.seen.lock().get(link).copied()
    }

    /// Forgets `link` so it is treated as brand new when it shows up again.
    pub fn purge(&self, link: &Link) {
        self.seen.lock().remove(link);
    }

    /// Forgets every link touching `device`.
    pub fn purge_device(&self, device: &DeviceId) {
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|l, _| l.src_device() != device && l.dst_device() != device);
        debug!(device = %device, purged = before - seen.len(), "Purged seen links");
    }

    /// Seen links touching `device`.
    pub fn device_links(&self, device: &DeviceId) -> Vec<Link> {
        self.seen
            .lock()
            .keys()
            .filter(|l| l.src_device() == device || l.dst_device() == device)
            .cloned()
            .collect()
    }

    /// True if another seen, currently up link shares the source and
    /// destination switches of `link`.
    pub fn is_parallel(&self, link: &Link) -> bool {
        self.seen.lock().iter().any(|(seen, up)| {
            *up && seen != link
                && seen.src_device() == link.src_device()
                && seen.dst_device() == link.dst_device()
        })
    }

    /// The seen link running opposite to `link`, port for port.
    pub fn reverse_link(&self, link: &Link) -> Option<Link> {
        self.seen
            .lock()
            .keys()
            .find(|l| l.src() == link.dst() && l.dst() == link.src())
            .cloned()
    }

    /// True if the reverse of `link` has been seen and is up.
    pub fn is_bidirectional_up(&self, link: &Link) -> bool {
        self.reverse_link(link)
            .and_then(|r| self.seen_state(&r))
            .unwrap_or(false)
    }

    /// True if the reverse of `link` has been seen and is down.
    pub fn is_bidirectional_down(&self, link: &Link) -> bool {
        let Some(reverse) = self.reverse_link(link) else {
            warn!(link = %link, "Query for bidi-link down but reverse link not found");
            return false;
        };
        self.seen_state(&reverse).map(|up| !up).unwrap_or(false)
    }

    /// Both directions of a bidirectional link, reverse first. Empty if the
    /// reverse direction was never seen.
    pub fn bidi_component_links(&self, link: &Link) -> Vec<Link> {
        match self.reverse_link(link) {
            Some(reverse) => vec![reverse, link.clone()],
            None => Vec::new(),
        }
    }
}

impl LinkPolicy for LinkAdmission {
    fn avoid(&self, link: &Link) -> bool {
        !self.is_admitted(link) || self.is_redundant_pair_link(link)
    }

    fn is_fallback(&self, link: &Link) -> bool {
        self.is_redundant_pair_link(link)
    }
}
