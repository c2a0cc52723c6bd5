//! Fan-out of fired events to waiting sessions.

use crate::{EventNotifier, registry::SessionRegistryInner};
use chrono::{DateTime, Utc};
use node_notify_types::{EventCategory, FiredEvent};
use std::sync::{Arc, Weak};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, trace, warn};

/// Publishes fired events into a [`SessionRegistry`].
///
/// Each event is matched against the sessions registered for its category.
/// Matching sessions with an active wait are woken immediately, others buffer
/// the event until their next wait. Publishing never blocks on clients.
///
/// Cheaply clonable. Obtained from [`SessionRegistry::dispatcher`].
///
/// [`SessionRegistry`]: crate::SessionRegistry
/// [`SessionRegistry::dispatcher`]: crate::SessionRegistry::dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistryInner>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) const fn new(registry: Arc<SessionRegistryInner>) -> Self {
        Self { registry }
    }

    /// Publish a fired event. Returns the number of sessions it matched.
    pub fn publish(&self, event: &FiredEvent) -> usize {
        let matched = self.registry.publish(event);
        trace!(category = %event.category, subjects = event.subject_ids.len(), matched, "published");
        matched
    }

    /// Publish a single-subject event observed now.
    pub fn publish_now(&self, category: EventCategory, subject_id: u64) -> usize {
        self.publish(&FiredEvent::now(category, subject_id))
    }

    /// Publish one occurrence covering several subjects. Each matching session
    /// receives its matches together, in the given order.
    pub fn publish_batch(
        &self,
        category: EventCategory,
        subject_ids: impl IntoIterator<Item = u64>,
        occurred_at: DateTime<Utc>,
    ) -> usize {
        self.publish(&FiredEvent::batch(category, subject_ids, occurred_at))
    }

    /// Spawn a task publishing every event sent through `notifier`.
    ///
    /// The task holds only a weak reference to the registry. It stops when the
    /// registry is dropped, when `cancel` fires, or when every notifier handle
    /// is dropped. If the task falls behind the channel, the skipped events
    /// are lost, and every session is flagged coalesced so clients can tell.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_listener(
        &self,
        notifier: &EventNotifier,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let task = ListenerTask {
            registry: Arc::downgrade(&self.registry),
            events: notifier.subscribe(),
            cancel,
        };
        tokio::spawn(task.run().instrument(debug_span!("notify::listener")))
    }
}

/// Task relaying notifier events into the registry.
#[derive(Debug)]
struct ListenerTask {
    registry: Weak<SessionRegistryInner>,
    events: broadcast::Receiver<FiredEvent>,
    cancel: CancellationToken,
}

impl ListenerTask {
    async fn run(self) {
        let ListenerTask { registry, mut events, cancel } = self;

        loop {
            // NB: biased select ensures we check cancellation before
            // processing new events.
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    trace!("listener cancelled");
                    break;
                }
                res = events.recv() => res,
            };

            let Some(registry) = registry.upgrade() else {
                debug!("registry dropped, stopping listener");
                break;
            };

            match res {
                Ok(event) => {
                    registry.publish(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged, flagging sessions coalesced");
                    registry.mark_all_coalesced();
                }
                Err(RecvError::Closed) => {
                    debug!("event source closed");
                    break;
                }
            }
        }
    }
}
