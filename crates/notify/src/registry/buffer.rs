//! Per-session pending event buffers.

use node_notify_types::{EventCategory, MatchedEvent};
use std::collections::{HashMap, VecDeque};

/// Events matched for a session while no wait is collecting them.
///
/// Events are kept in publish order. Each category holds at most `capacity`
/// events; pushing past that drops the oldest event of the same category and
/// marks the buffer coalesced until the next drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingBuffer {
    events: VecDeque<MatchedEvent>,
    per_category: HashMap<EventCategory, usize>,
    capacity: usize,
    coalesced: bool,
}

impl PendingBuffer {
    /// Create an empty buffer holding at most `capacity` events per category.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            per_category: HashMap::new(),
            capacity: capacity.max(1),
            coalesced: false,
        }
    }

    /// True if no events are buffered.
    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events buffered.
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// True if events were dropped since the last drain.
    pub(crate) const fn is_coalesced(&self) -> bool {
        self.coalesced
    }

    /// Mark events as lost without dropping anything from the buffer.
    pub(crate) const fn mark_coalesced(&mut self) {
        self.coalesced = true;
    }

    /// Append an event. Returns `true` if an older event was dropped to make
    /// room.
    pub(crate) fn push(&mut self, event: MatchedEvent) -> bool {
        let count = self.per_category.entry(event.category).or_default();
        let dropped = if *count >= self.capacity {
            // the oldest event of the category is the first one in order
            if let Some(pos) = self.events.iter().position(|e| e.category == event.category) {
                self.events.remove(pos);
            }
            self.coalesced = true;
            true
        } else {
            *count += 1;
            false
        };
        self.events.push_back(event);
        dropped
    }

    /// Append events in order. Returns the number of older events dropped.
    pub(crate) fn extend(&mut self, events: impl IntoIterator<Item = MatchedEvent>) -> usize {
        events.into_iter().filter(|event| self.push(*event)).count()
    }

    /// Take every buffered event along with the coalesced flag, leaving the
    /// buffer empty and clean.
    pub(crate) fn drain(&mut self) -> (Vec<MatchedEvent>, bool) {
        self.per_category.clear();
        let coalesced = std::mem::take(&mut self.coalesced);
        (self.events.drain(..).collect(), coalesced)
    }

    /// Put drained events back at the front of the buffer, ahead of anything
    /// pushed since.
    ///
    /// Used when a drained batch could not be handed to its waiter. Capacity
    /// is enforced again, oldest first.
    pub(crate) fn restore(&mut self, events: Vec<MatchedEvent>, coalesced: bool) {
        let (newer, newer_coalesced) = self.drain();
        self.coalesced = coalesced || newer_coalesced;
        self.extend(events);
        self.extend(newer);
    }
}
