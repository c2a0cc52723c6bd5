//! Background expiry of idle sessions.

use crate::registry::SessionRegistryInner;
use std::{sync::Weak, time::Duration};
use tracing::{debug, trace};

/// Periodic sweep over the session map.
///
/// Each pass expires sessions whose last client call is older than the idle
/// timeout. Their outstanding waits resolve as expired instead of running to
/// their deadlines. The pass also drops waiter slots whose callers are gone.
///
/// Sweeps take shard write locks through [`DashMap::retain`], so they run on a
/// plain OS thread rather than a tokio worker.
///
/// [`DashMap::retain`]: dashmap::DashMap::retain
#[derive(Debug)]
pub(crate) struct Reaper {
    registry: Weak<SessionRegistryInner>,
    interval: Duration,
    idle_timeout: Duration,
}

impl Reaper {
    /// Create a new reaper.
    pub(crate) const fn new(
        registry: Weak<SessionRegistryInner>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self { registry, interval, idle_timeout }
    }

    /// Start sweeping on a new thread. The thread exits at the first pass
    /// after the registry has been dropped.
    pub(crate) fn spawn(self) {
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(self.interval);
                let Some(registry) = self.registry.upgrade() else { break };
                trace!(sessions = registry.session_count(), "sweeping sessions");
                let expired = registry.reap_idle(self.idle_timeout);
                if expired > 0 {
                    debug!(expired, "expired idle sessions");
                }
            }
        });
    }
}
