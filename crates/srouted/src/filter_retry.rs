//! Port filter population with backoff retries.
//!
//! A switch may report its ports some time after it connects, so filters
//! are installed once and then re-installed on a growing interval until the
//! outcome has been identical for a number of attempts in a row.

use dashmap::DashMap;
use sonic_sr_types::DeviceId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::RetryConfig;
use crate::services::RulePopulator;

/// Outcome of one filter population run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PortFilterInfo {
    pub disabled_ports: u32,
    pub errored_ports: u32,
    pub filtered_ports: u32,
}

impl PortFilterInfo {
    pub fn new(disabled_ports: u32, errored_ports: u32, filtered_ports: u32) -> Self {
        Self {
            disabled_ports,
            errored_ports,
            filtered_ports,
        }
    }
}

impl fmt::Display for PortFilterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "disabled:{} errored:{} filtered:{}",
            self.disabled_ports, self.errored_ports, self.filtered_ports
        )
    }
}

/// Schedules and tracks the per-switch retry tasks.
///
/// Scheduling a switch again supersedes its running task.
pub struct FilterRetrier {
    rules: Arc<dyn RulePopulator>,
    config: RetryConfig,
    epochs: Arc<DashMap<DeviceId, u64>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl FilterRetrier {
    pub fn new(rules: Arc<dyn RulePopulator>, config: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            rules,
            config,
            epochs: Arc::new(DashMap::new()),
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// Installs the filters of `device` now and starts retrying in the
    /// background.
    pub async fn populate(&self, device: &DeviceId) {
        let first = self
            .rules
            .populate_port_filters(device)
            .await
            .unwrap_or_default();
        self.schedule(device.clone(), first);
    }

    fn schedule(&self, device: DeviceId, first: PortFilterInfo) {
        let epoch = {
            let mut current = self.epochs.entry(device.clone()).or_insert(0);
            *current += 1;
            *current
        };
        let task = RetryTask {
            device,
            epoch,
            epochs: self.epochs.clone(),
            rules: self.rules.clone(),
            config: self.config.clone(),
            prev: first,
            counter: 0,
            constant: self.config.max_constant_attempts,
        };
        let cancel = self.cancel.clone();
        self.tracker.spawn(task.run(cancel));
    }

    /// Number of retry tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every running retry task to finish on its own.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancels every retry task and waits for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Filter retry tasks stopped");
    }
}

struct RetryTask {
    device: DeviceId,
    epoch: u64,
    epochs: Arc<DashMap<DeviceId, u64>>,
    rules: Arc<dyn RulePopulator>,
    config: RetryConfig,
    prev: PortFilterInfo,
    counter: u32,
    constant: u32,
}

impl RetryTask {
    async fn run(mut self, cancel: CancellationToken) {
        let mut delay = Duration::from_millis(self.config.interval_ms);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if self.superseded() {
                debug!(device = %self.device, "Filter retry superseded");
                return;
            }
            if !self.attempt().await {
                return;
            }
            delay = self.config.delay(self.counter);
        }
    }

    fn superseded(&self) -> bool {
        self.epochs
            .get(&self.device)
            .map_or(true, |current| *current != self.epoch)
    }

    /// One retry. Returns true if another one should follow.
    async fn attempt(&mut self) -> bool {
        self.counter += 1;
        debug!(device = %self.device, attempt = self.counter, "Retry filter attempt");
        let this_run = self.rules.populate_port_filters(&self.device).await;
        let same = this_run.as_ref() == Some(&self.prev);
        debug!(
            device = %self.device,
            prev = %self.prev,
            this_run = ?this_run,
            same,
            "Filter retry result"
        );

        let again = this_run.is_none() || !same || {
            self.constant = self.constant.saturating_sub(1);
            self.constant > 0
        };
        if !same {
            self.constant = self.config.max_constant_attempts;
        }
        if let Some(info) = this_run {
            self.prev = info;
        }
        if !again {
            debug!(device = %self.device, attempts = self.counter, "Port filters stable");
        }
        again
    }
}
