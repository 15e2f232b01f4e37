//! Store Error Types
//!
//! This module defines the errors an `OrderedStore` implementation reports
//! back to the engine.

use crate::models::ItemId;
use thiserror::Error;

/// Errors raised by an ordered store backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No row with this id exists
    #[error("Item not found: {id}")]
    ItemNotFound { id: ItemId },

    /// A row with this id already exists
    #[error("Item already exists: {id}")]
    DuplicateItem { id: ItemId },

    /// Backend-specific failure (I/O, connection, constraint)
    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create an item not found error
    pub fn item_not_found(id: ItemId) -> Self {
        Self::ItemNotFound { id }
    }

    /// Create a duplicate item error
    pub fn duplicate_item(id: ItemId) -> Self {
        Self::DuplicateItem { id }
    }

    /// Create a backend failure error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
