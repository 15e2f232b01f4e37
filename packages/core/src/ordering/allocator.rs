//! Rank allocation between two neighbors
//!
//! Picks a rank uniformly at random inside the open interval between two
//! bounds, so repeated inserts at the same logical position land all over
//! the gap instead of converging on one edge.

use crate::models::{Rank, CANONICAL_RANK};
use crate::ordering::{OrderError, OrderingConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fewer free integers than this between two bounds counts as exhausted
const MIN_FREE_RANKS: i128 = 2;

/// Assigns ranks strictly between neighbor bounds
#[derive(Debug)]
pub struct RankAllocator {
    rng: StdRng,
    min_rank: Rank,
    max_rank: Rank,
}

impl RankAllocator {
    pub fn new(config: &OrderingConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            min_rank: config.min_rank,
            max_rank: config.max_rank,
        }
    }

    /// Allocate a rank strictly between `lower` and `upper`
    ///
    /// # Examples
    /// ```
    /// use sortorder_core::ordering::{OrderingConfig, RankAllocator};
    ///
    /// let mut allocator = RankAllocator::new(&OrderingConfig::default().with_seed(1));
    ///
    /// // Empty collection
    /// assert_eq!(allocator.allocate(None, None).unwrap(), 0);
    ///
    /// // Between two neighbors
    /// let rank = allocator.allocate(Some(10), Some(20)).unwrap();
    /// assert!(10 < rank && rank < 20);
    ///
    /// // No room
    /// assert!(allocator.allocate(Some(10), Some(12)).is_err());
    /// ```
    pub fn allocate(
        &mut self,
        lower: Option<Rank>,
        upper: Option<Rank>,
    ) -> Result<Rank, OrderError> {
        let (low, high) = match (lower, upper) {
            (None, None) => return Ok(CANONICAL_RANK),
            (None, Some(upper)) => (self.min_rank, upper),
            (Some(lower), None) => (lower, self.max_rank),
            (Some(lower), Some(upper)) => (lower, upper),
        };

        // Widen before subtracting: the bounds may sit at opposite extremes.
        let free = i128::from(high) - i128::from(low) - 1;
        if free < MIN_FREE_RANKS {
            return Err(OrderError::rank_exhausted(lower, upper));
        }

        Ok(self.rng.gen_range(low + 1..high))
    }
}
