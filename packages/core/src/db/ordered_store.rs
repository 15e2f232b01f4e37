//! OrderedStore Trait - Persistence Abstraction
//!
//! This module defines the `OrderedStore` trait the ordering engine consumes.
//! The trait is deliberately narrow: position reads, sort-key neighbor reads,
//! a bounded descending scan near a rank, and single-row writes. Anything
//! that can answer ordered, filtered, offset queries (an embedded SQL table
//! with an index on `(rank, created_at, id)`, a key-value store, or the
//! in-memory [`MemoryStore`](super::MemoryStore)) can implement it.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so both embedded and networked
//!    backends fit behind the same trait
//! 2. **Visible Order**: Every positional or neighbor read is defined over the
//!    ascending [`SortKey`] order, never over rank alone
//! 3. **Per-Row Atomicity**: `write_rank` must be atomic for one row and
//!    visible to the next read; multi-row atomicity is the engine's job
//!
//! # Examples
//!
//! ```rust
//! use sortorder_core::db::{MemoryStore, OrderedStore};
//! use sortorder_core::models::Item;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.insert_item(Item::with_rank(10)).await?;
//! store.insert_item(Item::with_rank(-5)).await?;
//!
//! let head = store.item_at_position(0).await?.unwrap();
//! assert_eq!(head.rank, -5);
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{Item, ItemId, Rank, SortKey};
use async_trait::async_trait;

/// Abstraction over the persisted, ordered collection
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the engine can be shared across
/// tasks behind an `Arc`.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    //
    // ROW LIFECYCLE
    //

    /// Number of items in the collection
    async fn len(&self) -> Result<usize, StoreError>;

    /// Get an item by id
    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError>;

    /// Insert a new row
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateItem` if the id is already present.
    async fn insert_item(&self, item: Item) -> Result<(), StoreError>;

    /// Delete a row, returning it if it existed
    async fn delete_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError>;

    /// Persist a rank change for one row
    ///
    /// Must be atomic for the row and visible to subsequent reads.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ItemNotFound` if the row does not exist.
    async fn write_rank(&self, id: &ItemId, rank: Rank) -> Result<(), StoreError>;

    //
    // ORDERED READS
    //

    /// The item at 0-based `position` in visible order
    async fn item_at_position(&self, position: usize) -> Result<Option<Item>, StoreError>;

    /// The greatest item whose sort key is strictly less than `key`
    async fn item_before(&self, key: &SortKey) -> Result<Option<Item>, StoreError>;

    /// The least item whose sort key is strictly greater than `key`
    async fn item_after(&self, key: &SortKey) -> Result<Option<Item>, StoreError>;

    /// Items with `rank <= max_rank`, ordered descending, at most `limit` of them
    async fn items_with_rank_at_most(
        &self,
        max_rank: Rank,
        limit: usize,
    ) -> Result<Vec<Item>, StoreError>;

    /// Every item carrying exactly `rank`, in visible order
    async fn items_with_rank(&self, rank: Rank) -> Result<Vec<Item>, StoreError>;

    /// The whole collection in visible order
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    //
    // RANK NEIGHBORS
    //

    /// Nearest item with `rank <= max_rank`, ties broken toward the newest
    async fn first_item_with_rank_at_most(
        &self,
        max_rank: Rank,
    ) -> Result<Option<Item>, StoreError> {
        let key = SortKey::highest_with_rank(max_rank);
        self.item_before(&key).await
    }

    /// Nearest item with `rank > min_rank`, ties broken toward the oldest
    async fn first_item_with_rank_above(
        &self,
        min_rank: Rank,
    ) -> Result<Option<Item>, StoreError> {
        let key = SortKey::highest_with_rank(min_rank);
        self.item_after(&key).await
    }
}
