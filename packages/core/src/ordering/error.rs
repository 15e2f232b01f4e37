//! Error types for the order-maintenance engine
//!
//! Every engine operation either commits completely or fails with one of
//! these errors and leaves the collection exactly as it was.

use crate::db::StoreError;
use crate::models::{ItemId, Rank};
use thiserror::Error;

/// Errors that can occur while maintaining the visible order
///
/// # Examples
///
/// ```rust
/// use sortorder_core::ordering::OrderError;
///
/// let err = OrderError::rank_exhausted(Some(4), Some(6));
/// assert!(err.to_string().contains("No rank available"));
///
/// let err = OrderError::invalid_request("destination 9 is out of range");
/// assert!(matches!(err, OrderError::InvalidRequest(_)));
/// ```
#[derive(Error, Debug)]
pub enum OrderError {
    /// No rank lies strictly between the bounds, even after widening
    ///
    /// The requested edit is abandoned.
    #[error("No rank available between {lower:?} and {upper:?}")]
    RankExhausted {
        lower: Option<Rank>,
        upper: Option<Rank>,
    },

    /// A neighbor that must exist could not be read
    ///
    /// Indicates the store changed underneath the engine or answered
    /// positional queries inconsistently.
    #[error("Could not resolve neighbor at position {position}")]
    NeighborResolutionFailed { position: usize },

    /// The store rejected a write
    ///
    /// All writes already applied by the same operation have been rolled back.
    #[error("Failed to persist rank {rank} for item {id}: {source}")]
    StoreWriteFailed {
        id: ItemId,
        rank: Rank,
        #[source]
        source: StoreError,
    },

    /// The store failed to answer a read
    #[error("Store read failed: {0}")]
    StoreReadFailed(#[from] StoreError),

    /// Positions out of range, unknown item, or item/position mismatch
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The engine configuration was rejected
    #[error("Invalid ordering configuration: {0}")]
    InvalidConfig(String),
}

impl OrderError {
    /// Create a rank exhausted error
    pub fn rank_exhausted(lower: Option<Rank>, upper: Option<Rank>) -> Self {
        Self::RankExhausted { lower, upper }
    }

    /// Create a neighbor resolution error
    pub fn neighbor_resolution_failed(position: usize) -> Self {
        Self::NeighborResolutionFailed { position }
    }

    /// Create a store write error
    pub fn store_write_failed(id: ItemId, rank: Rank, source: StoreError) -> Self {
        Self::StoreWriteFailed { id, rank, source }
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
