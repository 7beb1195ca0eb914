//! # Halom Economics - Index Rebase & Staking Rewards
//!
//! Supply and reward side of the HOM token.
//!
//! ## Key Features
//!
//! - **Index-driven rebase**: every accepted HOI move changes total supply by
//!   the same relative amount, bounded per rebase
//! - **Split delta**: part of each change goes to all holders through one
//!   multiplier, the rest to the staking reward pool
//! - **Anti-whale staking**: rewards follow the fourth root of stake
//! - **Delegation**: validators earn a capped commission on delegated rewards
//!
//! ## Supply Update
//!
//! ```text
//! ┌──────────────┐   (old, new)   ┌──────────────┐  rescale   ┌──────────────┐
//! │ IndexUpdate  │ ─────────────► │ RebaseEngine │ ─────────► │ SupplyLedger │
//! └──────────────┘                └──────┬───────┘            └──────────────┘
//!                                        │ mint to pool
//!                                        ▼
//!                                 ┌──────────────┐
//!                                 │ StakingPool  │  inject_rewards
//!                                 └──────────────┘
//! ```
//!
//! | Parameter | Default |
//! |-----------|---------|
//! | Max supply change per rebase | 10% |
//! | Reward pool share of each delta | 50% |
//! | Rebase cooldown | 1 day |
//! | Max validator commission | 20% |
//! | Minimum stake | 1 HOM |

pub mod rebase;
pub mod rewards;
pub mod staking;
pub mod supply;

// Re-exports
pub use rebase::{
    clamp_delta, raw_delta, split_delta, RebaseConfig, RebaseEngine, RebaseOutcome, RebasePhase,
};
pub use rewards::{fourth_root, Injection, RewardAccumulator, RewardSink};
pub use staking::{Delegation, StakePosition, StakingConfig, StakingPool, ValidatorProfile};
pub use supply::SupplyLedger;

/// HOM token constants
pub mod constants {
    use halom_core::types::{Balance, BasisPoints, ONE_HOM};

    /// Token symbol
    pub const SYMBOL: &str = "HOM";

    /// Token name
    pub const NAME: &str = "Halom";

    /// Largest supply change a single rebase may apply: 10%
    pub const DEFAULT_MAX_REBASE_DELTA_BPS: BasisPoints = 1_000;

    /// Share of each rebase delta routed to the reward pool: 50%
    pub const DEFAULT_REWARD_SHARE_BPS: BasisPoints = 5_000;

    /// Minimum time between rebases: 1 day
    pub const DEFAULT_MIN_REBASE_INTERVAL_SECS: u64 = 24 * 3600;

    /// Validator commission ceiling: 20%
    pub const MAX_COMMISSION_BPS: BasisPoints = 2_000;

    /// Smallest opening stake: 1 HOM
    pub const DEFAULT_MIN_STAKE: u64 = ONE_HOM as u64;

    /// Genesis supply used when no allocations are configured: 100 million HOM
    pub const DEFAULT_GENESIS_SUPPLY: Balance = 100_000_000 * ONE_HOM;
}

pub use constants::*;
