//! Per-session registration tables.

use node_notify_types::{EventCategory, Registration, RegistrationSummary};
use std::collections::{HashMap, HashSet};

/// The set of registrations held by one session.
///
/// Membership is the hot path during dispatch. A per-category count is kept
/// alongside the set so the category index can be maintained without scanning
/// the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RegistrationTable {
    entries: HashSet<Registration>,
    per_category: HashMap<EventCategory, usize>,
}

impl RegistrationTable {
    /// Insert a registration. Returns `true` if it is the first registration
    /// for its category.
    pub(crate) fn insert(&mut self, reg: Registration) -> bool {
        if !self.entries.insert(reg) {
            return false;
        }
        let count = self.per_category.entry(reg.category).or_default();
        *count += 1;
        *count == 1
    }

    /// Remove a registration. Returns `true` if it was the last registration
    /// for its category.
    pub(crate) fn remove(&mut self, reg: &Registration) -> bool {
        if !self.entries.remove(reg) {
            return false;
        }
        match self.per_category.get_mut(&reg.category) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                self.per_category.remove(&reg.category);
                true
            }
        }
    }

    /// Clear the table, returning the categories it held.
    pub(crate) fn clear(&mut self) -> Vec<EventCategory> {
        self.entries.clear();
        self.per_category.drain().map(|(category, _)| category).collect()
    }

    /// True if an event `(category, subject_id)` matches this table, either
    /// exactly or through the category wildcard.
    pub(crate) fn matches(&self, category: EventCategory, subject_id: u64) -> bool {
        self.entries.contains(&Registration::new(category, subject_id))
            || self.entries.contains(&Registration::any(category))
    }

    /// True if the table holds `reg` exactly.
    #[cfg(test)]
    pub(crate) fn contains(&self, reg: &Registration) -> bool {
        self.entries.contains(reg)
    }

    /// True if any registration for `category` is held.
    pub(crate) fn has_category(&self, category: EventCategory) -> bool {
        self.per_category.contains_key(&category)
    }

    /// Number of registrations held.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no registrations are held.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A sorted snapshot of the table.
    pub(crate) fn summary(&self) -> RegistrationSummary {
        RegistrationSummary::from_unsorted(self.entries.iter().copied())
    }
}
