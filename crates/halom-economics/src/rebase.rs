//! # Rebase Engine
//!
//! Converts an accepted index move into a supply change.
//!
//! ```text
//! raw      = total_supply × (new − old) / old
//! applied  = clamp(raw, ±max_rebase_delta_bps × total_supply)
//! pool     = applied × reward_share_bps / 10_000   → minted to the reward pool
//!                                                     or burned from the reserve
//! holders  = applied − pool                         → multiplier rescale
//! ```
//!
//! ## Phases
//!
//! `Idle` between calls, `Rebasing` for the duration of one. A rebase that
//! arrives inside the cooldown window fails with `RebaseTooEarly`; the runtime
//! discards the whole pipeline call including the index publish.

use crate::constants::{
    DEFAULT_MAX_REBASE_DELTA_BPS, DEFAULT_MIN_REBASE_INTERVAL_SECS, DEFAULT_REWARD_SHARE_BPS,
};
use crate::rewards::RewardSink;
use crate::supply::SupplyLedger;
use halom_core::error::{HalomError, Result};
use halom_core::events::{EventLog, ProtocolEvent};
use halom_core::math::{apply_bps, mul_div, mul_div_signed};
use halom_core::types::{
    AccountId, Balance, BasisPoints, IndexValue, Timestamp, BPS_DENOMINATOR,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Rebase parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebaseConfig {
    /// Largest supply change per rebase, either direction
    #[serde(default = "default_max_rebase_delta_bps")]
    pub max_rebase_delta_bps: BasisPoints,

    /// Cooldown between rebases
    #[serde(default = "default_min_rebase_interval_secs")]
    pub min_rebase_interval_secs: u64,

    /// Part of each delta routed to the reward pool
    #[serde(default = "default_reward_share_bps")]
    pub reward_share_bps: BasisPoints,
}

fn default_max_rebase_delta_bps() -> BasisPoints {
    DEFAULT_MAX_REBASE_DELTA_BPS
}

fn default_min_rebase_interval_secs() -> u64 {
    DEFAULT_MIN_REBASE_INTERVAL_SECS
}

fn default_reward_share_bps() -> BasisPoints {
    DEFAULT_REWARD_SHARE_BPS
}

impl Default for RebaseConfig {
    fn default() -> Self {
        Self {
            max_rebase_delta_bps: default_max_rebase_delta_bps(),
            min_rebase_interval_secs: default_min_rebase_interval_secs(),
            reward_share_bps: default_reward_share_bps(),
        }
    }
}

impl RebaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rebase_delta_bps == 0 || self.max_rebase_delta_bps as u128 > BPS_DENOMINATOR {
            return Err(HalomError::InvalidConfig(
                "rebase.max_rebase_delta_bps must be within 1..=10000".to_string(),
            ));
        }
        if self.reward_share_bps as u128 > BPS_DENOMINATOR {
            return Err(HalomError::InvalidConfig(
                "rebase.reward_share_bps must be at most 10000".to_string(),
            ));
        }
        if i64::try_from(self.min_rebase_interval_secs).is_err() {
            return Err(HalomError::InvalidConfig(
                "rebase.min_rebase_interval_secs is out of range".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebasePhase {
    Idle,
    Rebasing,
}

/// What one rebase did to the supply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOutcome {
    pub epoch: u64,
    pub old_index: IndexValue,
    pub new_index: IndexValue,
    pub requested_delta: i128,
    pub applied_delta: i128,
    pub clamped: bool,
    pub holder_delta: i128,
    pub pool_delta: i128,
    pub minted_to_pool: Balance,
    pub burned: Balance,
    pub shortfall: Balance,
    pub new_multiplier: u128,
    pub total_supply: Balance,
}

/// Signed supply change proportional to the index move; zero when `old` is zero
pub fn raw_delta(total_supply: Balance, old: IndexValue, new: IndexValue) -> Result<i128> {
    if old == 0 || old == new {
        return Ok(0);
    }
    let magnitude = mul_div(total_supply, old.abs_diff(new), old)?;
    let magnitude = i128::try_from(magnitude).map_err(|_| HalomError::Overflow("raw delta"))?;
    Ok(if new > old { magnitude } else { -magnitude })
}

/// Bound `delta` to ±`max_bps` of supply; returns (applied, clamped)
pub fn clamp_delta(delta: i128, total_supply: Balance, max_bps: BasisPoints) -> Result<(i128, bool)> {
    let bound = apply_bps(total_supply, max_bps)?;
    if delta.unsigned_abs() <= bound {
        return Ok((delta, false));
    }
    let bound = i128::try_from(bound).map_err(|_| HalomError::Overflow("clamp bound"))?;
    Ok((if delta > 0 { bound } else { -bound }, true))
}

/// (holder share, pool share); the pool share rounds toward zero
pub fn split_delta(delta: i128, reward_share_bps: BasisPoints) -> Result<(i128, i128)> {
    let pool = mul_div_signed(delta, reward_share_bps as u128, BPS_DENOMINATOR)?;
    Ok((delta - pool, pool))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebaseEngine {
    config: RebaseConfig,
    pool_account: AccountId,
    reserve_account: AccountId,
    phase: RebasePhase,
    epoch: u64,
    last_rebase_at: Option<Timestamp>,
    cumulative_shortfall: Balance,
}

impl RebaseEngine {
    pub fn new(config: RebaseConfig, pool_account: AccountId, reserve_account: AccountId) -> Self {
        Self {
            config,
            pool_account,
            reserve_account,
            phase: RebasePhase::Idle,
            epoch: 0,
            last_rebase_at: None,
            cumulative_shortfall: 0,
        }
    }

    pub fn config(&self) -> &RebaseConfig {
        &self.config
    }

    pub fn phase(&self) -> RebasePhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn last_rebase_at(&self) -> Option<Timestamp> {
        self.last_rebase_at
    }

    pub fn cumulative_shortfall(&self) -> Balance {
        self.cumulative_shortfall
    }

    pub fn pool_account(&self) -> AccountId {
        self.pool_account
    }

    pub fn reserve_account(&self) -> AccountId {
        self.reserve_account
    }

    /// Earliest time the next rebase is accepted
    pub fn next_allowed(&self) -> Option<Timestamp> {
        let interval = i64::try_from(self.config.min_rebase_interval_secs).unwrap_or(i64::MAX);
        self.last_rebase_at.map(|last| last.saturating_add(interval))
    }

    /// Apply the supply change for an index move from `old` to `new`
    pub fn rebase(
        &mut self,
        now: Timestamp,
        ledger: &mut SupplyLedger,
        rewards: &mut dyn RewardSink,
        old: IndexValue,
        new: IndexValue,
        events: &mut EventLog,
    ) -> Result<RebaseOutcome> {
        if self.phase == RebasePhase::Rebasing {
            return Err(HalomError::RebaseInProgress);
        }
        if let Some(next_allowed) = self.next_allowed() {
            if now < next_allowed {
                warn!("Rebase rejected: next rebase allowed at {}", next_allowed);
                return Err(HalomError::RebaseTooEarly { next_allowed });
            }
        }

        self.phase = RebasePhase::Rebasing;
        let result = self.execute(now, ledger, rewards, old, new, events);
        self.phase = RebasePhase::Idle;
        result
    }

    fn execute(
        &mut self,
        now: Timestamp,
        ledger: &mut SupplyLedger,
        rewards: &mut dyn RewardSink,
        old: IndexValue,
        new: IndexValue,
        events: &mut EventLog,
    ) -> Result<RebaseOutcome> {
        let total = ledger.total_supply();
        let requested = raw_delta(total, old, new)?;
        let (applied, clamped) = clamp_delta(requested, total, self.config.max_rebase_delta_bps)?;
        if clamped {
            warn!(
                "Rebase delta {} clamped to {} ({} bps bound)",
                requested, applied, self.config.max_rebase_delta_bps
            );
            events.emit(ProtocolEvent::RebaseClamped { requested, applied });
        }

        let (holder_delta, pool_delta) = split_delta(applied, self.config.reward_share_bps)?;
        let new_multiplier = ledger.rescale(holder_delta)?;

        let mut minted_to_pool = 0;
        let mut burned = 0;
        let mut shortfall = 0;
        if pool_delta > 0 {
            minted_to_pool = pool_delta.unsigned_abs();
            ledger.mint(self.pool_account, minted_to_pool)?;
            rewards.inject_rewards(minted_to_pool, events)?;
        } else if pool_delta < 0 {
            let requested_burn = pool_delta.unsigned_abs();
            burned = ledger.burn_up_to(&self.reserve_account, requested_burn)?;
            shortfall = requested_burn - burned;
            if shortfall > 0 {
                self.cumulative_shortfall = self.cumulative_shortfall.saturating_add(shortfall);
                warn!(
                    "Reserve covered {} of {} burn, shortfall {} (cumulative {})",
                    burned, requested_burn, shortfall, self.cumulative_shortfall
                );
                events.emit(ProtocolEvent::BurnShortfall {
                    requested: requested_burn,
                    burned,
                    shortfall,
                });
            }
        }

        self.epoch = self
            .epoch
            .checked_add(1)
            .ok_or(HalomError::Overflow("rebase epoch"))?;
        self.last_rebase_at = Some(now);

        let outcome = RebaseOutcome {
            epoch: self.epoch,
            old_index: old,
            new_index: new,
            requested_delta: requested,
            applied_delta: applied,
            clamped,
            holder_delta,
            pool_delta,
            minted_to_pool,
            burned,
            shortfall,
            new_multiplier,
            total_supply: ledger.total_supply(),
        };

        debug!("Rebase outcome: {:?}", outcome);
        info!(
            "Rebase epoch {}: index {} -> {}, supply delta {}, multiplier {}",
            outcome.epoch, old, new, applied, new_multiplier
        );
        events.emit(ProtocolEvent::RebaseExecuted {
            delta: applied,
            new_multiplier,
        });
        Ok(outcome)
    }
}
