//! Storage Layer
//!
//! This module defines the contract between the ordering engine and whatever
//! persists the collection:
//!
//! - `OrderedStore` - Async trait the engine reads and writes through
//! - `MemoryStore` - In-process reference implementation
//! - `OrderEvent` - Committed changes broadcast to subscribers
//!
//! # Architecture
//!
//! The engine never caches rows. Every neighbor lookup is a fresh query
//! against the store, and every rank change is a single-row write that is
//! visible to the next read. Operation-level atomicity is layered on top by
//! the engine's rank journal, so a backend only needs per-row atomic writes.

mod error;
pub mod events;
mod memory_store;
mod ordered_store;

pub use error::StoreError;
pub use events::{OrderEvent, RankChange};
pub use memory_store::MemoryStore;
pub use ordered_store::OrderedStore;
