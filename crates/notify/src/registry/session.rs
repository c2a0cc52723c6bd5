//! Per-session state.

use crate::{
    registry::{buffer::PendingBuffer, table::RegistrationTable},
    waiter::{Resolution, WaiterSlot},
};
use node_notify_types::{EventCategory, MatchedEvent, WaitOutcome};
use std::time::{Duration, Instant};

/// What happened to events handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// An active waiter was woken with the events.
    Woken {
        /// Number of events handed to the waiter.
        count: usize,
    },
    /// No waiter was active, the events were buffered.
    Buffered,
}

/// The server-side state of one client.
///
/// Records the registrations, the events matched but not yet collected, the
/// active waiter if any, and the [`Instant`] of the last client call.
#[derive(Debug)]
pub(crate) struct Session {
    registrations: RegistrationTable,
    pending: PendingBuffer,
    waiter: Option<WaiterSlot>,
    last_active: Instant,
}

impl core::fmt::Display for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Session {{ registrations: {}, pending: {}, coalesced: {}, waiting: {}, ms_since_active: {} }}",
            self.registrations.len(),
            self.pending.len(),
            self.pending.is_coalesced(),
            self.waiter.is_some(),
            self.last_active.elapsed().as_millis(),
        )
    }
}

impl Session {
    /// Create a session whose pending buffer holds `pending_per_category`
    /// events per category.
    pub(crate) fn new(pending_per_category: usize) -> Self {
        Self {
            registrations: RegistrationTable::default(),
            pending: PendingBuffer::new(pending_per_category),
            waiter: None,
            last_active: Instant::now(),
        }
    }

    /// The session's registrations.
    pub(crate) const fn registrations(&self) -> &RegistrationTable {
        &self.registrations
    }

    /// Mutable access to the session's registrations.
    pub(crate) const fn registrations_mut(&mut self) -> &mut RegistrationTable {
        &mut self.registrations
    }

    /// Mark the session as active now.
    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Time since the last client call.
    pub(crate) fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// True if a live waiter occupies the slot.
    pub(crate) fn is_waiting(&self) -> bool {
        self.waiter.as_ref().is_some_and(|slot| !slot.is_orphaned())
    }

    /// Id of the wait in the slot, if any.
    pub(crate) fn waiter_id(&self) -> Option<u64> {
        self.waiter.as_ref().map(WaiterSlot::id)
    }

    /// Install a waiter. The caller must have checked [`Self::is_waiting`]
    /// under the same entry lock. An orphaned slot is replaced.
    pub(crate) fn install_waiter(&mut self, slot: WaiterSlot) {
        debug_assert!(!self.is_waiting());
        self.waiter = Some(slot);
    }

    /// Remove the waiter with the given id. Returns `false` if the slot holds
    /// a different waiter or none, meaning it was already resolved.
    pub(crate) fn release_waiter(&mut self, id: u64) -> bool {
        if self.waiter_id() == Some(id) {
            self.waiter = None;
            true
        } else {
            false
        }
    }

    /// Drop a waiter whose caller is gone, or whose deadline passed more than
    /// `grace` ago without it reclaiming the slot. Returns `true` if one was
    /// cleared.
    pub(crate) fn clear_stale_waiter(&mut self, grace: Duration) -> bool {
        let stale = self.waiter.as_ref().is_some_and(|slot| {
            slot.is_orphaned() || slot.deadline() + grace < tokio::time::Instant::now()
        });
        if stale {
            if let Some(slot) = self.waiter.take() {
                let _ = slot.resolve(Resolution::Ended(WaitOutcome::Cancelled));
            }
        }
        stale
    }

    /// Take buffered events with the coalesced flag. Returns `None` only if
    /// nothing is buffered and nothing was lost, so a lost-events flag is
    /// reported even with an empty buffer.
    pub(crate) fn take_pending(&mut self) -> Option<(Vec<MatchedEvent>, bool)> {
        if self.pending.is_empty() && !self.pending.is_coalesced() {
            None
        } else {
            Some(self.pending.drain())
        }
    }

    /// Mark events as lost. An active waiter is woken at once with whatever
    /// is buffered, possibly nothing, and the flag. Otherwise the flag is
    /// reported by the next wait.
    pub(crate) fn mark_coalesced(&mut self) -> Delivery {
        self.pending.mark_coalesced();
        self.deliver(Vec::new()).0
    }

    /// Hand matched events to the session.
    ///
    /// The events join the pending buffer. If a waiter is active, the whole
    /// buffer is drained into it and it is woken. A waiter whose caller has
    /// gone away gets nothing, and the events stay buffered for the next wait.
    ///
    /// Returns the delivery and the number of buffered events dropped for
    /// capacity.
    pub(crate) fn deliver(&mut self, events: Vec<MatchedEvent>) -> (Delivery, usize) {
        let dropped = self.pending.extend(events);

        let Some(slot) = self.waiter.take() else { return (Delivery::Buffered, dropped) };
        let (events, coalesced) = self.pending.drain();
        let count = events.len();
        match slot.resolve(Resolution::Delivered { events, coalesced }) {
            Ok(()) => (Delivery::Woken { count }, dropped),
            Err(returned) => {
                if let Resolution::Delivered { events, coalesced } = returned {
                    self.pending.restore(events, coalesced);
                }
                (Delivery::Buffered, dropped)
            }
        }
    }

    /// Resolve any active waiter with `outcome` and clear the registrations,
    /// returning the categories that were held.
    pub(crate) fn teardown(&mut self, outcome: WaitOutcome) -> Vec<EventCategory> {
        if let Some(slot) = self.waiter.take() {
            let _ = slot.resolve(Resolution::Ended(outcome));
        }
        self.registrations.clear()
    }

    /// Resolve the active waiter with a cancellation. Returns `true` if a
    /// waiter was active.
    pub(crate) fn cancel_waiter(&mut self) -> bool {
        match self.waiter.take() {
            Some(slot) => slot.resolve(Resolution::Ended(WaitOutcome::Cancelled)).is_ok(),
            None => false,
        }
    }
}
