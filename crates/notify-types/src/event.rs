//! Fired and delivered events.

use crate::{EventCategory, Registration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An occurrence produced by the node's event source.
///
/// A fired event carries one or more subject ids sharing a category and a
/// timestamp, e.g. every transaction confirmed by one block. Each subject is
/// matched independently, and the matches for one session are delivered
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiredEvent {
    /// The event category.
    pub category: EventCategory,
    /// The subjects this occurrence pertains to, in source order.
    pub subject_ids: Vec<u64>,
    /// When the node observed the occurrence.
    pub occurred_at: DateTime<Utc>,
}

impl FiredEvent {
    /// A fired event for a single subject.
    pub fn single(category: EventCategory, subject_id: u64, occurred_at: DateTime<Utc>) -> Self {
        Self { category, subject_ids: vec![subject_id], occurred_at }
    }

    /// A fired event for a batch of subjects.
    pub fn batch(
        category: EventCategory,
        subject_ids: impl IntoIterator<Item = u64>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self { category, subject_ids: subject_ids.into_iter().collect(), occurred_at }
    }

    /// A fired event for a single subject, stamped with the current time.
    pub fn now(category: EventCategory, subject_id: u64) -> Self {
        Self::single(category, subject_id, Utc::now())
    }

    /// The delivered form of each subject in this event.
    pub fn matched_events(&self) -> impl Iterator<Item = MatchedEvent> + '_ {
        self.subject_ids
            .iter()
            .map(|&subject_id| MatchedEvent::new(self.category, subject_id, self.occurred_at))
    }
}

/// An event delivered to a waiting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedEvent {
    /// The event category.
    pub category: EventCategory,
    /// The subject the event pertains to.
    pub subject_id: u64,
    /// When the node observed the occurrence.
    pub occurred_at: DateTime<Utc>,
}

impl MatchedEvent {
    /// Create a new matched event.
    pub const fn new(category: EventCategory, subject_id: u64, occurred_at: DateTime<Utc>) -> Self {
        Self { category, subject_id, occurred_at }
    }

    /// The exact registration this event satisfies.
    pub const fn registration(&self) -> Registration {
        Registration::new(self.category, self.subject_id)
    }
}

/// How a wait call was resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitOutcome {
    /// One or more matching events were delivered.
    Delivered,
    /// The deadline elapsed without a match.
    #[default]
    TimedOut,
    /// The transport cancelled the wait, e.g. on client disconnect.
    Cancelled,
    /// The session was expired or closed while waiting.
    Expired,
}

/// Result of a wait call.
///
/// Timeouts and cancellations are not errors. They yield an empty event list
/// so client retry logic treats them alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitResult {
    /// Delivered events, in the order they were published.
    pub events: Vec<MatchedEvent>,
    /// True if buffered events were dropped for capacity before delivery.
    pub coalesced: bool,
    /// How the wait was resolved.
    #[serde(default)]
    pub outcome: WaitOutcome,
}

impl WaitResult {
    /// A result carrying delivered events.
    pub const fn delivered(events: Vec<MatchedEvent>, coalesced: bool) -> Self {
        Self { events, coalesced, outcome: WaitOutcome::Delivered }
    }

    /// An empty result with the given outcome.
    pub const fn empty(outcome: WaitOutcome) -> Self {
        Self { events: Vec::new(), coalesced: false, outcome }
    }

    /// True if no events were delivered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Subject ids delivered for `category`, in delivery order.
    pub fn subjects_for(&self, category: EventCategory) -> Vec<u64> {
        self.events.iter().filter(|e| e.category == category).map(|e| e.subject_id).collect()
    }
}
