//! Handle through which the node's event producers fire events.

use node_notify_types::{EventCategory, FiredEvent};
use tokio::sync::broadcast;

/// Broadcast handle for fired node events.
///
/// Held by the subsystems that produce notifiable occurrences (block and
/// transaction processing, peer management). Sending never blocks. A
/// [`Dispatcher`] listener task drains the channel into the registry. Cloning
/// is cheap.
///
/// # Construction
///
/// ```
/// use node_notify::EventNotifier;
/// use node_notify_types::EventCategory;
///
/// let notifier = EventNotifier::new(128);
/// let mut rx = notifier.subscribe();
///
/// notifier.fire(EventCategory::BlockPushed, 42).unwrap();
/// assert_eq!(rx.try_recv().unwrap().subject_ids, vec![42]);
/// ```
///
/// [`Dispatcher`]: crate::Dispatcher
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<FiredEvent>,
}

impl EventNotifier {
    /// Create a new [`EventNotifier`] backed by a broadcast channel of the
    /// given capacity.
    pub fn new(channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self { tx }
    }

    /// Send a fired event.
    ///
    /// Returns `Ok(receiver_count)` or `Err` if there are no active
    /// receivers (which is not usually an error condition).
    #[allow(clippy::result_large_err)]
    pub fn send(&self, event: FiredEvent) -> Result<usize, broadcast::error::SendError<FiredEvent>> {
        self.tx.send(event)
    }

    /// Send a single-subject event observed now.
    #[allow(clippy::result_large_err)]
    pub fn fire(
        &self,
        category: EventCategory,
        subject_id: u64,
    ) -> Result<usize, broadcast::error::SendError<FiredEvent>> {
        self.send(FiredEvent::now(category, subject_id))
    }

    /// Subscribe to fired events.
    pub fn subscribe(&self) -> broadcast::Receiver<FiredEvent> {
        self.tx.subscribe()
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
