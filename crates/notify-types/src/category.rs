//! The event catalog.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Whether a category can be filtered by subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryScope {
    /// Node-wide events. Registrations must use subject id `0`.
    Global,
    /// Events that pertain to a specific subject, such as an account.
    Subject,
}

/// Error returned when a category name is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event category: {0}")]
pub struct UnknownEventCategory(pub String);

macro_rules! catalog {
    ($($(#[$meta:meta])* $variant:ident => $name:literal, $scope:ident;)+) => {
        /// A notifiable node event category.
        ///
        /// The set is closed. Categories are identified on the wire by their
        /// dotted name, e.g. `Block.BLOCK_PUSHED`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventCategory {
            $($(#[$meta])* $variant,)+
        }

        impl EventCategory {
            /// Every category in the catalog, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// The wire name of this category.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }

            /// The subject scoping of this category.
            pub const fn scope(self) -> CategoryScope {
                match self {
                    $(Self::$variant => CategoryScope::$scope,)+
                }
            }

            /// Look up a category by its wire name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

catalog! {
    /// A block was generated by this node.
    BlockGenerated => "Block.BLOCK_GENERATED", Global;
    /// A block was popped off the chain head.
    BlockPopped => "Block.BLOCK_POPPED", Global;
    /// A block was accepted onto the chain head.
    BlockPushed => "Block.BLOCK_PUSHED", Global;
    /// A peer connected.
    PeerAdded => "Peer.ADD_PEER", Global;
    /// A peer disconnected or was blacklisted.
    PeerRemoved => "Peer.REMOVE_PEER", Global;
    /// A peer changed connection state.
    PeerStateChanged => "Peer.CHANGED_STATE", Global;
    /// A transaction entered the unconfirmed pool.
    TransactionArrived => "Transaction.ADDED_UNCONFIRMED", Subject;
    /// A transaction was included in a block.
    TransactionConfirmed => "Transaction.ADDED_CONFIRMED", Subject;
    /// A transaction was rejected.
    TransactionRejected => "Transaction.REJECTED", Subject;
    /// A transaction left the unconfirmed pool without confirming.
    TransactionRemovedUnconfirmed => "Transaction.REMOVED_UNCONFIRMED", Subject;
    /// An account ledger entry was added.
    LedgerEntryAdded => "Ledger.ADD_ENTRY", Subject;
}

impl EventCategory {
    /// True if registrations for this category may name a specific subject.
    pub const fn is_scoped(self) -> bool {
        matches!(self.scope(), CategoryScope::Subject)
    }

    /// True if a registration for `subject_id` is legal for this category.
    ///
    /// Subject id `0` is always legal. Global categories accept nothing else.
    pub const fn accepts_subject(self, subject_id: u64) -> bool {
        subject_id == 0 || self.is_scoped()
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventCategory {
    type Err = UnknownEventCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownEventCategory(s.to_owned()))
    }
}

impl Serialize for EventCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EventCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
