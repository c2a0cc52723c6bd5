//! Session interest entries.

use crate::{EventCategory, UnknownEventCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject id meaning "any subject".
pub const ANY_SUBJECT: u64 = 0;

/// A validated interest in a `(category, subject)` pair.
///
/// A subject id of [`ANY_SUBJECT`] matches every event of the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// The event category.
    pub category: EventCategory,
    /// The subject id, or [`ANY_SUBJECT`].
    pub subject_id: u64,
}

impl Registration {
    /// Create a new registration.
    pub const fn new(category: EventCategory, subject_id: u64) -> Self {
        Self { category, subject_id }
    }

    /// Create a registration matching any subject of the category.
    pub const fn any(category: EventCategory) -> Self {
        Self::new(category, ANY_SUBJECT)
    }

    /// True if this registration matches every subject of its category.
    pub const fn is_wildcard(&self) -> bool {
        self.subject_id == ANY_SUBJECT
    }

    /// The wildcard registration for this registration's category.
    pub const fn wildcard(&self) -> Self {
        Self::any(self.category)
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "{}:*", self.category)
        } else {
            write!(f, "{}:{}", self.category, self.subject_id)
        }
    }
}

/// An unvalidated registration entry, as parsed by the transport.
///
/// The category is carried as its wire name and checked against the catalog
/// when the entry is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Wire name of the event category.
    pub category: String,
    /// The subject id, or [`ANY_SUBJECT`].
    #[serde(default)]
    pub subject_id: u64,
}

impl RegistrationRequest {
    /// Create a new request.
    pub fn new(category: impl Into<String>, subject_id: u64) -> Self {
        Self { category: category.into(), subject_id }
    }

    /// Resolve the category name against the catalog.
    ///
    /// Subject scoping is not checked here.
    pub fn resolve(&self) -> Result<Registration, UnknownEventCategory> {
        self.category.parse().map(|category| Registration::new(category, self.subject_id))
    }
}

impl From<Registration> for RegistrationRequest {
    fn from(reg: Registration) -> Self {
        Self { category: reg.category.name().to_owned(), subject_id: reg.subject_id }
    }
}

/// The entries to remove in an unregister call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Unregister {
    /// Clear every registration held by the session.
    All,
    /// Remove the listed entries. Entries not held are ignored.
    Entries(Vec<RegistrationRequest>),
}

impl From<Vec<RegistrationRequest>> for Unregister {
    fn from(entries: Vec<RegistrationRequest>) -> Self {
        Self::Entries(entries)
    }
}

/// The full registration set of a session after a register or unregister
/// call. Entries are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSummary {
    /// The registrations currently held.
    pub registered: Vec<Registration>,
}

impl RegistrationSummary {
    /// Build a summary from any set of registrations.
    pub fn from_unsorted(registered: impl IntoIterator<Item = Registration>) -> Self {
        let mut registered: Vec<_> = registered.into_iter().collect();
        registered.sort_unstable();
        Self { registered }
    }

    /// Number of registrations held.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// True if the session holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// True if the summary contains `reg` exactly.
    pub fn contains(&self, reg: &Registration) -> bool {
        self.registered.binary_search(reg).is_ok()
    }
}
