//! Programming ownership for redundant switch pairs.
//!
//! Each switch is programmed by exactly one controller instance. For an
//! unpaired switch that is simply its master. For a redundant pair, the
//! owner ("king") is elected once through a shared compare-and-set
//! register and stays in charge of both switches until it no longer
//! masters either of them.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sonic_sr_types::{DeviceId, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{Result, RoutingError};
use crate::services::{ClusterService, DeviceConfiguration, MastershipService};
use crate::types::EdgePair;

/// Election function applied to the currently recorded owner.
pub type ElectFn<'a> = &'a (dyn Fn(Option<&NodeId>) -> Option<NodeId> + Send + Sync);

/// Shared register of pair owners.
///
/// Implementations may be backed by any consistent or eventually
/// consistent store; the core only needs an atomic read-modify-write.
#[async_trait]
pub trait OwnershipStore: Send + Sync {
    /// Atomically replaces the owner recorded for `key` with
    /// `elect(current)` and returns the new owner. A `None` result clears
    /// the entry.
    async fn compare_and_set(&self, key: &EdgePair, elect: ElectFn<'_>) -> Result<Option<NodeId>>;

    async fn owner(&self, key: &EdgePair) -> Option<NodeId>;
}

/// Single-process register guarded by a mutex.
#[derive(Default)]
pub struct InMemoryOwnershipStore {
    records: Mutex<HashMap<EdgePair, NodeId>>,
}

impl InMemoryOwnershipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnershipStore for InMemoryOwnershipStore {
    async fn compare_and_set(&self, key: &EdgePair, elect: ElectFn<'_>) -> Result<Option<NodeId>> {
        let mut records = self.records.lock();
        let next = elect(records.get(key));
        match &next {
            Some(owner) => {
                records.insert(key.clone(), owner.clone());
            }
            None => {
                records.remove(key);
            }
        }
        Ok(next)
    }

    async fn owner(&self, key: &EdgePair) -> Option<NodeId> {
        self.records.lock().get(key).cloned()
    }
}

/// Smallest non-empty candidate.
fn elect(candidates: &[Option<&NodeId>]) -> Option<NodeId> {
    candidates.iter().flatten().min().map(|n| (*n).clone())
}

/// Answers "should this instance program that switch".
pub struct OwnershipElector {
    config: Arc<dyn DeviceConfiguration>,
    mastership: Arc<dyn MastershipService>,
    cluster: Arc<dyn ClusterService>,
    store: Arc<dyn OwnershipStore>,
    cache: DashMap<DeviceId, bool>,
}

impl OwnershipElector {
    pub fn new(
        config: Arc<dyn DeviceConfiguration>,
        mastership: Arc<dyn MastershipService>,
        cluster: Arc<dyn ClusterService>,
        store: Arc<dyn OwnershipStore>,
    ) -> Self {
        Self {
            config,
            mastership,
            cluster,
            store,
            cache: DashMap::new(),
        }
    }

    /// True if this instance is responsible for programming `device`.
    ///
    /// Pair decisions are cached until [`invalidate_cache`] is called for
    /// the switch.
    ///
    /// [`invalidate_cache`]: OwnershipElector::invalidate_cache
    pub async fn should_program(&self, device: &DeviceId) -> bool {
        if let Some(cached) = self.cache.get(device) {
            debug!(device = %device, cached = *cached, "shouldProgram cached");
            return *cached;
        }

        let local = self.cluster.local_node();
        let master = self.mastership.master_of(device);
        let pair = self.config.pair_of(device);
        let pair_master = pair.as_ref().and_then(|p| self.mastership.master_of(p));

        let Some(pair) = pair else {
            debug!(device = %device, local = %local, master = ?master, "No pair device");
            return master.as_ref() == Some(&local);
        };

        if master.as_ref() != Some(&local) && pair_master.as_ref() != Some(&local) {
            debug!(
                device = %device,
                pair = %pair,
                local = %local,
                "Local node masters neither switch of the pair"
            );
            return false;
        }

        let key = EdgePair::new(device.clone(), pair.clone());
        let elect_fn = |current: Option<&NodeId>| match current {
            Some(owner) if Some(owner) == master.as_ref() || Some(owner) == pair_master.as_ref() => {
                Some(owner.clone())
            }
            _ => elect(&[master.as_ref(), pair_master.as_ref()]),
        };

        let king = match self.store.compare_and_set(&key, &elect_fn).await {
            Ok(king) => king,
            Err(e) => {
                error!(device = %device, pair = %pair, error = %e, "Ownership register update failed");
                None
            }
        };

        match king {
            Some(king) => {
                let mine = king == local;
                debug!(device = %device, pair = %pair, king = %king, "Elected pair owner");
                self.cache.insert(device.clone(), mine);
                mine
            }
            None => {
                let e = RoutingError::ElectionFailure {
                    device: device.clone(),
                    pair,
                };
                error!(error = %e, "Failed to elect a king, abort");
                self.cache.remove(device);
                false
            }
        }
    }

    pub fn invalidate_cache(&self, device: &DeviceId) {
        self.cache.remove(device);
    }

    /// `device` and its configured pair, if any.
    pub fn device_and_pair(&self, device: &DeviceId) -> Vec<DeviceId> {
        let mut out = vec![device.clone()];
        if let Some(pair) = self.config.pair_of(device) {
            out.push(pair);
        }
        out
    }
}
