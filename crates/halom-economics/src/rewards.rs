//! # Reward Accumulator
//!
//! Pro-rata distribution in O(1) per injection.
//!
//! ```text
//! weight(stake)        = ⌊stake^(1/4)⌋
//! rewards_per_weight  += injected × 1e18 / total_weight
//! accrued(position)    = weight × rewards_per_weight / 1e18
//! pending(position)    = accrued − reward_debt
//! ```
//!
//! The fourth root compresses large stakes: 16x the stake earns 2x the
//! weight. Rewards injected while nobody is staked are queued and flushed to
//! the first weight that arrives.

use halom_core::error::{HalomError, Result};
use halom_core::events::EventLog;
use halom_core::math::{isqrt, mul_div};
use halom_core::types::{Balance, SCALE};
use serde::{Deserialize, Serialize};

/// Floor integer fourth root
pub fn fourth_root(x: u128) -> u128 {
    isqrt(isqrt(x))
}

/// Receiver of reward-pool inflows produced by a rebase
pub trait RewardSink {
    fn inject_rewards(&mut self, amount: Balance, events: &mut EventLog) -> Result<()>;
}

/// Where an injection went
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Injection {
    /// Spread over the current total weight
    Distributed(Balance),
    /// Held until someone stakes
    Queued(Balance),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RewardAccumulator {
    /// Cumulative rewards per weight unit, 1e18 scale
    rewards_per_weight: u128,
    total_weight: u128,
    queued: Balance,
    total_injected: Balance,
}

impl RewardAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rewards_per_weight(&self) -> u128 {
        self.rewards_per_weight
    }

    pub fn total_weight(&self) -> u128 {
        self.total_weight
    }

    pub fn queued(&self) -> Balance {
        self.queued
    }

    pub fn total_injected(&self) -> Balance {
        self.total_injected
    }

    /// Rewards a weight has accrued since genesis
    pub fn accrued(&self, weight: u128) -> Result<Balance> {
        mul_div(weight, self.rewards_per_weight, SCALE)
    }

    pub fn inject(&mut self, amount: Balance) -> Result<Injection> {
        self.total_injected = self
            .total_injected
            .checked_add(amount)
            .ok_or(HalomError::Overflow("total injected"))?;

        if self.total_weight == 0 {
            self.queued = self
                .queued
                .checked_add(amount)
                .ok_or(HalomError::Overflow("queued rewards"))?;
            return Ok(Injection::Queued(amount));
        }

        self.distribute(amount)?;
        Ok(Injection::Distributed(amount))
    }

    fn distribute(&mut self, amount: Balance) -> Result<()> {
        let increment = mul_div(amount, SCALE, self.total_weight)?;
        self.rewards_per_weight = self
            .rewards_per_weight
            .checked_add(increment)
            .ok_or(HalomError::Overflow("rewards per weight"))?;
        Ok(())
    }

    /// Spread queued rewards once weight exists; returns the flushed amount
    pub fn flush_queued(&mut self) -> Result<Option<Balance>> {
        if self.queued == 0 || self.total_weight == 0 {
            return Ok(None);
        }
        let amount = std::mem::take(&mut self.queued);
        self.distribute(amount)?;
        Ok(Some(amount))
    }

    pub fn replace_weight(&mut self, old: u128, new: u128) -> Result<()> {
        self.total_weight = self
            .total_weight
            .checked_sub(old)
            .and_then(|w| w.checked_add(new))
            .ok_or(HalomError::Overflow("total weight"))?;
        Ok(())
    }
}
