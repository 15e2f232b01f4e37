//! Data Models
//!
//! This module contains the data structures shared by every layer:
//!
//! - `Item` - An element of the ordered collection
//! - `ItemId` - Stable item identity
//! - `Rank` - The integer sort key
//! - `SortKey` - The full `(rank, created_at, id)` ordering key

mod item;

pub use item::{Item, ItemId, Rank, SortKey, CANONICAL_RANK};
