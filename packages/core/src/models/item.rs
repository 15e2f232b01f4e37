//! Item Data Structures
//!
//! An `Item` is a single row of the ordered collection. Its position in the
//! visible order is derived entirely from its [`SortKey`]: ascending by rank,
//! then by creation time, then by id.
//!
//! # Examples
//!
//! ```rust
//! use sortorder_core::models::Item;
//!
//! let first = Item::with_rank(-10);
//! let second = Item::with_rank(25);
//! assert!(first.sort_key() < second.sort_key());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Integer sort key. Lower ranks sort earlier (top of the list).
pub type Rank = i64;

/// The rank the head of the visible order carries after a rebalance.
pub const CANONICAL_RANK: Rank = 0;

/// Stable item identity, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Largest possible id; used to build inclusive upper bounds on sort keys.
    fn max() -> Self {
        Self(Uuid::from_u128(u128::MAX))
    }

    fn min() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ItemId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An element of the ordered collection
///
/// The rank is provisional until the engine commits the item; callers create
/// items with [`Item::new`] and hand them to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub rank: Rank,
    /// Tie-breaker only, never the primary sort key
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create a new item with a provisional rank of zero
    pub fn new() -> Self {
        Self::with_rank(CANONICAL_RANK)
    }

    /// Create a new item carrying an explicit rank
    ///
    /// Used to seed stores with pre-existing collections.
    pub fn with_rank(rank: Rank) -> Self {
        Self {
            id: ItemId::new(),
            rank,
            created_at: Utc::now(),
        }
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey {
            rank: self.rank,
            created_at: self.created_at,
            id: self.id,
        }
    }
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

/// Total ordering key of the visible order
///
/// Field order matters: the derived `Ord` compares rank first, then the
/// creation timestamp, then the id so no two distinct items compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortKey {
    pub rank: Rank,
    pub created_at: DateTime<Utc>,
    pub id: ItemId,
}

impl SortKey {
    /// Smallest key carrying `rank`
    pub fn lowest_with_rank(rank: Rank) -> Self {
        Self {
            rank,
            created_at: DateTime::<Utc>::MIN_UTC,
            id: ItemId::min(),
        }
    }

    /// Largest key carrying `rank`
    pub fn highest_with_rank(rank: Rank) -> Self {
        Self {
            rank,
            created_at: DateTime::<Utc>::MAX_UTC,
            id: ItemId::max(),
        }
    }
}
