//! The single in-flight wait of a session.
//!
//! A wait is split in two halves:
//!
//! - **[`WaiterSlot`]** lives in the session's waiter slot. The dispatcher,
//!   the reaper, and transport cancellation resolve it through a one-shot
//!   channel. Resolving consumes the slot, so it can happen at most once.
//! - **[`Waiter`]** is owned by the suspended caller. It waits for the
//!   resolution, the deadline, or a cancellation token, whichever comes first.
//!
//! When the deadline or cancellation wins, the waiter must reclaim its slot
//! from the session before returning. If the slot is already gone, a
//! resolution was sent first and is collected from the channel instead, so a
//! delivery racing a timeout is never lost.

use crate::{metrics, registry::SessionRegistryInner};
use node_notify_types::{MatchedEvent, SessionToken, WaitOutcome, WaitResult};
use std::future::pending;
use tokio::{
    sync::oneshot,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How a waiter slot was resolved from the node side.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// Matched events were drained into the waiter.
    Delivered {
        /// The drained events, in publish order.
        events: Vec<MatchedEvent>,
        /// True if events were dropped before delivery.
        coalesced: bool,
    },
    /// The wait ended without events.
    Ended(WaitOutcome),
}

impl From<Resolution> for WaitResult {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Delivered { events, coalesced } => Self::delivered(events, coalesced),
            Resolution::Ended(outcome) => Self::empty(outcome),
        }
    }
}

/// The session-side half of a wait.
#[derive(Debug)]
pub(crate) struct WaiterSlot {
    id: u64,
    deadline: Instant,
    tx: oneshot::Sender<Resolution>,
}

impl WaiterSlot {
    /// The unique id of the wait this slot belongs to.
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    /// The absolute deadline of the wait.
    pub(crate) const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// True if the caller is gone, e.g. the wait future was dropped by the
    /// transport without cancelling. Such a slot will never be collected.
    pub(crate) fn is_orphaned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolve the wait. On failure the resolution is handed back, so that
    /// delivered events can be returned to the session buffer.
    pub(crate) fn resolve(self, resolution: Resolution) -> Result<(), Resolution> {
        self.tx.send(resolution)
    }
}

/// The caller-side half of a wait.
#[derive(Debug)]
pub(crate) struct Waiter {
    token: SessionToken,
    id: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Resolution>,
}

impl Waiter {
    /// Create both halves of a wait with the given deadline.
    pub(crate) fn new(token: SessionToken, id: u64, deadline: Instant) -> (Self, WaiterSlot) {
        let (tx, rx) = oneshot::channel();
        (Self { token, id, deadline, rx }, WaiterSlot { id, deadline, tx })
    }

    /// The resolution, if the slot side has already sent one.
    #[cfg(test)]
    pub(crate) fn try_resolution(&mut self) -> Option<WaitResult> {
        self.rx.try_recv().ok().map(Into::into)
    }

    /// Suspend until the wait is resolved, the deadline elapses, or `cancel`
    /// fires.
    pub(crate) async fn suspend(
        self,
        registry: &SessionRegistryInner,
        cancel: Option<&CancellationToken>,
    ) -> WaitResult {
        let Waiter { token, id, deadline, mut rx } = self;

        let cancelled = async {
            match cancel {
                Some(cancel) => cancel.cancelled().await,
                None => pending().await,
            }
        };

        // NB: biased select ensures a resolution that is already available
        // wins over a timer or cancellation that fired at the same time.
        let early = tokio::select! {
            biased;
            res = &mut rx => {
                let result: WaitResult = match res {
                    Ok(resolution) => resolution.into(),
                    // the slot was dropped unresolved, only possible when the
                    // session itself went away
                    Err(_) => WaitResult::empty(WaitOutcome::Expired),
                };
                metrics::record_wait_resolved(result.outcome, result.events.len());
                return result;
            }
            _ = cancelled => WaitOutcome::Cancelled,
            _ = sleep_until(deadline) => WaitOutcome::TimedOut,
        };

        let result: WaitResult = if registry.release_waiter(&token, id) {
            trace!(%token, id, outcome = ?early, "wait ended without events");
            WaitResult::empty(early)
        } else {
            // the slot was taken by the node side before we reclaimed it
            match rx.try_recv() {
                Ok(resolution) => resolution.into(),
                Err(_) => WaitResult::empty(early),
            }
        };
        metrics::record_wait_resolved(result.outcome, result.events.len());
        result
    }
}
