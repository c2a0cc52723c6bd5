//! Inverted index from event category to interested sessions.

use dashmap::DashMap;
use node_notify_types::{EventCategory, SessionToken};
use std::collections::HashSet;

/// Maps each category to the sessions holding at least one registration for
/// it, so a publish only visits interested sessions.
///
/// Maintained incrementally by the registry. Readers snapshot a category's
/// token set and release the shard before touching any session, so the index
/// is never held while a session entry is being acquired.
#[derive(Debug, Default)]
pub(crate) struct CategoryIndex {
    map: DashMap<EventCategory, HashSet<SessionToken>>,
}

impl CategoryIndex {
    /// Record that `token` is interested in `category`.
    pub(crate) fn add(&self, category: EventCategory, token: &SessionToken) {
        self.map.entry(category).or_default().insert(token.clone());
    }

    /// Record that `token` is no longer interested in `category`. Empty sets
    /// are pruned.
    pub(crate) fn remove(&self, category: EventCategory, token: &SessionToken) {
        let now_empty = match self.map.get_mut(&category) {
            Some(mut tokens) => {
                tokens.remove(token);
                tokens.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.map.remove_if(&category, |_, tokens| tokens.is_empty());
        }
    }

    /// Snapshot the sessions interested in `category`.
    pub(crate) fn interested(&self, category: EventCategory) -> Vec<SessionToken> {
        self.map.get(&category).map(|tokens| tokens.iter().cloned().collect()).unwrap_or_default()
    }

    /// Number of sessions interested in `category`.
    pub(crate) fn interest_count(&self, category: EventCategory) -> usize {
        self.map.get(&category).map(|tokens| tokens.len()).unwrap_or_default()
    }
}
