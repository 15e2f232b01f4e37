//! SortOrder Core
//!
//! Keeps a user-reorderable list consistently ordered without renumbering
//! every row on each edit. Items carry integer ranks; inserts and moves
//! allocate a rank between the new neighbors, and small local windows are
//! rebalanced when they become too dense to subdivide.
//!
//! # Modules
//!
//! - [`models`] - Items, ids, ranks and the visible-order sort key
//! - [`db`] - The ordered store interface, an in-memory store and events
//! - [`ordering`] - Allocation, neighbor resolution, rebalancing, journaling
//! - [`services`] - The order-maintenance engine

pub mod db;
pub mod models;
pub mod ordering;
pub mod services;

// Re-export commonly used types
pub use db::{MemoryStore, OrderEvent, OrderedStore, StoreError};
pub use models::{Item, ItemId, Rank};
pub use ordering::{OrderError, OrderingConfig};
pub use services::OrderEngine;
