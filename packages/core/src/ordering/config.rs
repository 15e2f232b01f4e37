//! Configuration for the order-maintenance engine
use crate::models::{Rank, CANONICAL_RANK};
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`OrderingConfig::gap_threshold`]
pub const GAP_THRESHOLD_ENV: &str = "SORTORDER_GAP_THRESHOLD";
/// Environment variable overriding [`OrderingConfig::widen_step`]
pub const WIDEN_STEP_ENV: &str = "SORTORDER_WIDEN_STEP";
/// Environment variable overriding [`OrderingConfig::min_rank`]
pub const MIN_RANK_ENV: &str = "SORTORDER_MIN_RANK";
/// Environment variable overriding [`OrderingConfig::max_rank`]
pub const MAX_RANK_ENV: &str = "SORTORDER_MAX_RANK";
/// Environment variable setting [`OrderingConfig::rng_seed`]
pub const RNG_SEED_ENV: &str = "SORTORDER_RNG_SEED";

/// Smallest gap threshold that still leaves two free integers after a rebalance
const MIN_GAP_THRESHOLD: Rank = 3;

/// Tunable parameters of rank allocation and rebalancing
///
/// The spacing constants are heuristics. Larger `gap_threshold` values
/// rebalance earlier and leave more slack; larger `widen_step` values pull
/// more neighbors into each repair window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    /// Lowest rank the engine may assign
    pub min_rank: Rank,

    /// Highest rank the engine may assign
    pub max_rank: Rank,

    /// A window whose rank span is below this is too dense for future inserts
    pub gap_threshold: Rank,

    /// Outward neighbors closer than this to the window edge join the window
    pub widen_step: Rank,

    /// Number of items (including a new one) checked for density on insert
    pub head_region_limit: usize,

    /// Maximum number of collision groups split in one rebalance pass
    pub collision_passes: usize,

    /// Seed for the rank allocator; `None` draws from OS entropy
    pub rng_seed: Option<u64>,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            min_rank: Rank::MIN / 4,
            max_rank: Rank::MAX / 4,
            gap_threshold: 10,
            widen_step: 100,
            head_region_limit: 3,
            collision_passes: 8,
            rng_seed: None,
        }
    }
}

impl OrderingConfig {
    /// Default configuration with overrides read from the environment
    ///
    /// Unparseable values are ignored with a warning so a typo cannot stop
    /// the process from starting.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_override(GAP_THRESHOLD_ENV) {
            config.gap_threshold = value;
        }
        if let Some(value) = env_override(WIDEN_STEP_ENV) {
            config.widen_step = value;
        }
        if let Some(value) = env_override(MIN_RANK_ENV) {
            config.min_rank = value;
        }
        if let Some(value) = env_override(MAX_RANK_ENV) {
            config.max_rank = value;
        }
        if let Some(value) = env_override(RNG_SEED_ENV) {
            config.rng_seed = Some(value);
        }
        config
    }

    /// Builder-style seed setter, mostly for reproducible tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Builder-style rank range setter
    pub fn with_rank_range(mut self, min_rank: Rank, max_rank: Rank) -> Self {
        self.min_rank = min_rank;
        self.max_rank = max_rank;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.gap_threshold < MIN_GAP_THRESHOLD {
            return Err(format!(
                "gap_threshold must be at least {}",
                MIN_GAP_THRESHOLD
            ));
        }

        if self.widen_step <= 0 {
            return Err("widen_step must be greater than 0".to_string());
        }

        // The canonical head rank needs room on both sides of it.
        if self.min_rank > CANONICAL_RANK - self.gap_threshold {
            return Err(format!(
                "min_rank must be at most {} (-gap_threshold)",
                CANONICAL_RANK - self.gap_threshold
            ));
        }

        if self.max_rank < CANONICAL_RANK + self.gap_threshold {
            return Err(format!(
                "max_rank must be at least {} (gap_threshold)",
                CANONICAL_RANK + self.gap_threshold
            ));
        }

        if self.head_region_limit < 2 {
            return Err("head_region_limit must be at least 2".to_string());
        }

        if self.collision_passes == 0 {
            return Err("collision_passes must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}
