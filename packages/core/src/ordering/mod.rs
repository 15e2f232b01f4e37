//! Fractional-rank order maintenance
//!
//! The building blocks the [`OrderEngine`](crate::services::OrderEngine)
//! orchestrates: allocation of ranks between neighbors, resolution of
//! positions into neighbors, local rebalancing and the journal that makes
//! each operation all-or-nothing.

mod allocator;
mod config;
mod error;
mod journal;
mod rebalancer;
mod resolver;

pub use allocator::RankAllocator;
pub use config::{
    OrderingConfig, GAP_THRESHOLD_ENV, MAX_RANK_ENV, MIN_RANK_ENV, RNG_SEED_ENV, WIDEN_STEP_ENV,
};
pub use error::OrderError;
pub use journal::RankJournal;
pub use rebalancer::{RebalanceMode, RebalanceReport, Rebalancer};
pub use resolver::{Bounds, NeighborResolver};
