//! # Staking Pool
//!
//! Fourth-root weighted staking with validator delegation.
//!
//! ## Flow
//!
//! ```text
//! stake ──► pool account ──► weight = ⌊stake^(1/4)⌋ ──► accumulator
//!                                                         │
//! rebase mint ──► inject_rewards ─────────────────────────┘
//!                                                         │
//! claim_reward ◄── settle: pending × (1 − commission share) ◄┘
//! ```
//!
//! ## Principal
//!
//! Staked tokens sit in the pool account, which rebases like any other
//! holder. Each position therefore owns a number of *nominal* pool units
//! rather than a fixed token amount: a staker's principal is worth
//! `principal × multiplier` and gains or loses exactly what an unstaked
//! holder would. Delegated amounts are kept in the same units. Weights are
//! recomputed from the effective stake whenever the stake changes.
//!
//! ## Drift Correction
//!
//! Reward tokens held for stakers are rescaled too, so the pool can hold less
//! than it owes (principal plus outstanding rewards). Every payout, reward or
//! principal, is scaled by `min(actual, expected) / expected`; the remainder
//! is written off. Scaling all payouts alike keeps the ratio stable, so the
//! last staker out is paid at the same rate as the first.

use crate::constants::{DEFAULT_MIN_STAKE, MAX_COMMISSION_BPS};
use crate::rewards::{fourth_root, Injection, RewardAccumulator, RewardSink};
use crate::supply::SupplyLedger;
use halom_core::access::CallContext;
use halom_core::error::{HalomError, Result};
use halom_core::events::{EventLog, ProtocolEvent};
use halom_core::math::{apply_bps, mul_div};
use halom_core::types::{AccountId, Balance, BasisPoints, StakeInfo, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Staking parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Highest commission a validator may charge
    #[serde(default = "default_max_commission_bps")]
    pub max_commission_bps: BasisPoints,

    /// Smallest opening stake, and smallest non-zero stake left after an
    /// unstake (base units)
    #[serde(default = "default_min_stake")]
    pub min_stake: u64,
}

fn default_max_commission_bps() -> BasisPoints {
    MAX_COMMISSION_BPS
}

fn default_min_stake() -> u64 {
    DEFAULT_MIN_STAKE
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            max_commission_bps: default_max_commission_bps(),
            min_stake: default_min_stake(),
        }
    }
}

impl StakingConfig {
    pub fn min_stake(&self) -> Balance {
        self.min_stake as Balance
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_commission_bps > MAX_COMMISSION_BPS {
            return Err(HalomError::InvalidConfig(format!(
                "staking.max_commission_bps must be at most {}",
                MAX_COMMISSION_BPS
            )));
        }
        if self.min_stake == 0 {
            return Err(HalomError::InvalidConfig(
                "staking.min_stake must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Active delegation of a staker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub validator: AccountId,
    /// Delegated principal, nominal pool units
    pub amount: u128,
    pub delegated_at: Timestamp,
    pub last_claim_at: Option<Timestamp>,
}

/// One staker's position
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakePosition {
    pub owner: AccountId,
    /// Nominal pool units owned
    pub principal: u128,
    pub weight: u128,
    /// Accrued value already accounted for
    pub reward_debt: Balance,
    /// Settled, not yet paid
    pub claimable: Balance,
    pub delegation: Option<Delegation>,
    pub staked_at: Timestamp,
    pub total_claimed: Balance,
}

impl StakePosition {
    fn new(owner: AccountId, now: Timestamp) -> Self {
        Self {
            owner,
            principal: 0,
            weight: 0,
            reward_debt: 0,
            claimable: 0,
            delegation: None,
            staked_at: now,
            total_claimed: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.principal == 0 && self.claimable == 0
    }
}

/// Per-validator commission state
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidatorProfile {
    pub commission_bps: BasisPoints,
    /// Principal delegated to this validator, nominal pool units
    pub delegated_total: u128,
    pub delegators: u32,
    /// Settled commission awaiting `claim_commission`
    pub commission_balance: Balance,
    pub commission_paid: Balance,
}

/// Split of a position's unsettled rewards
#[derive(Clone, Copy, Debug, Default)]
struct Pending {
    accrued: Balance,
    net: Balance,
    commission: Balance,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakingPool {
    config: StakingConfig,
    pool_account: AccountId,
    positions: HashMap<AccountId, StakePosition>,
    validators: HashMap<AccountId, ValidatorProfile>,
    accumulator: RewardAccumulator,
    /// Σ position principal, nominal pool units
    total_principal: u128,
    /// Injected rewards not yet paid or written off
    reward_liabilities: Balance,
    written_off: Balance,
}

impl StakingPool {
    pub fn new(config: StakingConfig, pool_account: AccountId) -> Self {
        Self {
            config,
            pool_account,
            positions: HashMap::new(),
            validators: HashMap::new(),
            accumulator: RewardAccumulator::new(),
            total_principal: 0,
            reward_liabilities: 0,
            written_off: 0,
        }
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    pub fn pool_account(&self) -> AccountId {
        self.pool_account
    }

    pub fn accumulator(&self) -> &RewardAccumulator {
        &self.accumulator
    }

    pub fn total_principal(&self) -> u128 {
        self.total_principal
    }

    /// All staked principal at the current multiplier
    pub fn total_staked(&self, ledger: &SupplyLedger) -> Balance {
        ledger.effective_of(self.total_principal)
    }

    pub fn reward_liabilities(&self) -> Balance {
        self.reward_liabilities
    }

    /// Rewards and principal lost to drift correction
    pub fn written_off(&self) -> Balance {
        self.written_off
    }

    pub fn position(&self, account: &AccountId) -> Option<&StakePosition> {
        self.positions.get(account)
    }

    pub fn validator(&self, account: &AccountId) -> Option<&ValidatorProfile> {
        self.validators.get(account)
    }

    pub fn staker_count(&self) -> usize {
        self.positions.values().filter(|p| p.principal > 0).count()
    }

    fn principal_of(&self, account: &AccountId) -> u128 {
        self.positions.get(account).map_or(0, |p| p.principal)
    }

    pub fn stake_info(&self, account: &AccountId, ledger: &SupplyLedger) -> StakeInfo {
        match self.positions.get(account) {
            Some(position) => StakeInfo {
                staked: ledger.effective_of(position.principal),
                weight: position.weight,
                delegation: position.delegation.as_ref().map(|d| d.validator),
            },
            None => StakeInfo {
                staked: 0,
                weight: 0,
                delegation: None,
            },
        }
    }

    /// Principal plus every reward the pool still owes
    pub fn expected_pool_balance(&self, ledger: &SupplyLedger) -> Balance {
        self.total_staked(ledger).saturating_add(self.reward_liabilities)
    }

    /// Claimable reward after drift correction, without settling
    pub fn pending_reward(&self, account: &AccountId, ledger: &SupplyLedger) -> Result<Balance> {
        let Some(position) = self.positions.get(account) else {
            return Ok(0);
        };
        let pending = self.pending(position)?;
        let claimable = position
            .claimable
            .checked_add(pending.net)
            .ok_or(HalomError::Overflow("pending reward"))?;
        self.drift_adjusted(claimable, ledger)
    }

    fn pending(&self, position: &StakePosition) -> Result<Pending> {
        let accrued = self.accumulator.accrued(position.weight)?;
        let gross = accrued.saturating_sub(position.reward_debt);

        let commission = match &position.delegation {
            Some(delegation) if gross > 0 && position.principal > 0 => {
                let rate = self
                    .validators
                    .get(&delegation.validator)
                    .map_or(0, |v| v.commission_bps);
                let full = apply_bps(gross, rate)?;
                mul_div(
                    full,
                    delegation.amount.min(position.principal),
                    position.principal,
                )?
            }
            _ => 0,
        };

        Ok(Pending {
            accrued,
            net: gross - commission,
            commission,
        })
    }

    /// Move unsettled rewards into `claimable` and the validator's commission
    fn settle(&mut self, account: &AccountId) -> Result<()> {
        let Some(position) = self.positions.get(account) else {
            return Ok(());
        };
        let pending = self.pending(position)?;
        let validator = position.delegation.as_ref().map(|d| d.validator);

        if let Some(position) = self.positions.get_mut(account) {
            position.reward_debt = pending.accrued;
            position.claimable = position
                .claimable
                .checked_add(pending.net)
                .ok_or(HalomError::Overflow("claimable"))?;
        }

        if pending.commission > 0 {
            if let Some(validator) = validator {
                let profile = self.validators.entry(validator).or_default();
                profile.commission_balance = profile
                    .commission_balance
                    .checked_add(pending.commission)
                    .ok_or(HalomError::Overflow("commission balance"))?;
            }
        }
        Ok(())
    }

    fn settle_delegators_of(&mut self, validator: &AccountId) -> Result<()> {
        let delegators: Vec<AccountId> = self
            .positions
            .values()
            .filter(|p| p.delegation.as_ref().is_some_and(|d| &d.validator == validator))
            .map(|p| p.owner)
            .collect();
        for delegator in delegators {
            self.settle(&delegator)?;
        }
        Ok(())
    }

    /// Recompute weight after a stake change; resets the reward debt
    fn reweight(&mut self, account: &AccountId, ledger: &SupplyLedger) -> Result<u128> {
        let Some(position) = self.positions.get_mut(account) else {
            return Ok(0);
        };
        let weight = fourth_root(ledger.effective_of(position.principal));
        self.accumulator.replace_weight(position.weight, weight)?;
        position.weight = weight;
        position.reward_debt = self.accumulator.accrued(weight)?;
        Ok(weight)
    }

    fn drift_adjusted(&self, amount: Balance, ledger: &SupplyLedger) -> Result<Balance> {
        let expected = self.expected_pool_balance(ledger);
        let actual = ledger.effective_balance(&self.pool_account);
        if expected == 0 || actual >= expected {
            return Ok(amount);
        }
        mul_div(amount, actual, expected)
    }

    fn pay_out(&self, ledger: &mut SupplyLedger, to: AccountId, amount: Balance) -> Result<()> {
        ledger
            .transfer(&self.pool_account, to, amount)
            .map(|_| ())
            .map_err(|e| match e {
                HalomError::InsufficientBalance {
                    requested,
                    available,
                } => HalomError::InsufficientPoolBalance {
                    requested,
                    available,
                },
                other => other,
            })
    }

    /// Nominal units covering `amount` of a holding worth `held_value`
    fn nominal_share(
        ledger: &SupplyLedger,
        amount: Balance,
        held: u128,
        held_value: Balance,
    ) -> Result<u128> {
        if amount >= held_value {
            Ok(held)
        } else {
            Ok(ledger.nominal_of(amount)?.min(held))
        }
    }

    pub fn stake(
        &mut self,
        ctx: &CallContext<'_>,
        ledger: &mut SupplyLedger,
        amount: Balance,
        events: &mut EventLog,
    ) -> Result<StakeInfo> {
        ctx.ensure_active()?;
        if amount == 0 {
            return Err(HalomError::InvalidAmount(amount));
        }
        let account = ctx.caller;
        let minimum = self.config.min_stake();
        if self.principal_of(&account) == 0 && amount < minimum {
            return Err(HalomError::BelowMinimumStake { amount, minimum });
        }
        let moved = ledger.transfer(&account, self.pool_account, amount)?;

        self.settle(&account)?;
        let position = self
            .positions
            .entry(account)
            .or_insert_with(|| StakePosition::new(account, ctx.now));
        position.principal = position
            .principal
            .checked_add(moved)
            .ok_or(HalomError::Overflow("stake"))?;
        self.total_principal = self
            .total_principal
            .checked_add(moved)
            .ok_or(HalomError::Overflow("total principal"))?;
        let weight = self.reweight(&account, ledger)?;

        if let Some(flushed) = self.accumulator.flush_queued()? {
            info!("Flushed {} queued rewards to first stakers", flushed);
            events.emit(ProtocolEvent::RewardsInjected { amount: flushed });
        }

        debug!("{} staked {} (weight {})", account, amount, weight);
        events.emit(ProtocolEvent::Staked {
            account,
            amount,
            weight,
        });
        Ok(self.stake_info(&account, ledger))
    }

    pub fn unstake(
        &mut self,
        ctx: &CallContext<'_>,
        ledger: &mut SupplyLedger,
        amount: Balance,
        events: &mut EventLog,
    ) -> Result<StakeInfo> {
        ctx.ensure_active()?;
        if amount == 0 {
            return Err(HalomError::InvalidAmount(amount));
        }
        let account = ctx.caller;
        let principal = self.principal_of(&account);
        let staked = ledger.effective_of(principal);
        if amount > staked {
            return Err(HalomError::InsufficientStake {
                requested: amount,
                staked,
            });
        }
        let released = Self::nominal_share(ledger, amount, principal, staked)?;
        let remaining = principal - released;
        let minimum = self.config.min_stake();
        if remaining > 0 && ledger.effective_of(remaining) < minimum {
            return Err(HalomError::BelowMinimumStake {
                amount: ledger.effective_of(remaining),
                minimum,
            });
        }

        let expected = self.expected_pool_balance(ledger);
        let available = ledger.effective_balance(&self.pool_account);
        let mut paid_nominal = if expected > 0 && available < expected {
            mul_div(released, available, expected)?
        } else {
            released
        };
        paid_nominal = paid_nominal.min(ledger.nominal_balance(&self.pool_account));
        if paid_nominal == 0 {
            return Err(HalomError::InsufficientPoolBalance {
                requested: amount,
                available,
            });
        }

        self.settle(&account)?;
        if let Some(position) = self.positions.get_mut(&account) {
            position.principal = remaining;
        }
        self.total_principal -= released;
        let weight = self.reweight(&account, ledger)?;
        self.clamp_delegation(&account, ledger, events);
        ledger.transfer_nominal(&self.pool_account, account, paid_nominal)?;

        let paid = ledger.effective_of(paid_nominal);
        let written_off = ledger.effective_of(released).saturating_sub(paid);
        self.written_off = self.written_off.saturating_add(written_off);

        if self.positions.get(&account).is_some_and(StakePosition::is_empty) {
            self.positions.remove(&account);
        }

        if written_off > 0 {
            warn!(
                "Unstake for {} scaled for pool drift: paid {}, wrote off {}",
                account, paid, written_off
            );
        }
        debug!("{} unstaked {} (weight {})", account, paid, weight);
        events.emit(ProtocolEvent::Unstaked {
            account,
            amount: paid,
            written_off,
            weight,
        });
        Ok(self.stake_info(&account, ledger))
    }

    /// Delegated principal never exceeds the stake; a full unstake ends the delegation
    fn clamp_delegation(
        &mut self,
        account: &AccountId,
        ledger: &SupplyLedger,
        events: &mut EventLog,
    ) {
        let Some(position) = self.positions.get_mut(account) else {
            return;
        };
        let principal = position.principal;
        let (validator, released) = match position.delegation.as_mut() {
            Some(delegation) if delegation.amount > principal => {
                let released = delegation.amount - principal;
                delegation.amount = principal;
                (delegation.validator, released)
            }
            _ => return,
        };
        let ended = principal == 0;
        if ended {
            position.delegation = None;
        }

        if let Some(profile) = self.validators.get_mut(&validator) {
            profile.delegated_total = profile.delegated_total.saturating_sub(released);
            if ended {
                profile.delegators = profile.delegators.saturating_sub(1);
            }
        }
        if ended {
            events.emit(ProtocolEvent::Undelegated {
                delegator: *account,
                validator,
                amount: ledger.effective_of(released),
            });
        }
    }

    /// Pay settled rewards to the caller; returns the amount paid
    pub fn claim_reward(
        &mut self,
        ctx: &CallContext<'_>,
        ledger: &mut SupplyLedger,
        events: &mut EventLog,
    ) -> Result<Balance> {
        ctx.ensure_active()?;
        let account = ctx.caller;
        self.settle(&account)?;

        let claimable = self.positions.get(&account).map_or(0, |p| p.claimable);
        if claimable == 0 {
            return Err(HalomError::NoRewardToClaim);
        }
        let paid = self.drift_adjusted(claimable, ledger)?;
        if paid == 0 {
            return Err(HalomError::InsufficientPoolBalance {
                requested: claimable,
                available: ledger.effective_balance(&self.pool_account),
            });
        }
        self.pay_out(ledger, account, paid)?;

        let written_off = claimable - paid;
        self.reward_liabilities = self.reward_liabilities.saturating_sub(claimable);
        self.written_off = self.written_off.saturating_add(written_off);

        if let Some(position) = self.positions.get_mut(&account) {
            position.claimable = 0;
            position.total_claimed = position.total_claimed.saturating_add(paid);
            if let Some(delegation) = position.delegation.as_mut() {
                delegation.last_claim_at = Some(ctx.now);
            }
        }
        if self.positions.get(&account).is_some_and(StakePosition::is_empty) {
            self.positions.remove(&account);
        }

        if written_off > 0 {
            warn!(
                "Reward claim for {} scaled for pool drift: paid {}, wrote off {}",
                account, paid, written_off
            );
        }
        events.emit(ProtocolEvent::RewardClaimed {
            account,
            amount: paid,
            written_off,
        });
        Ok(paid)
    }

    pub fn set_commission_rate(
        &mut self,
        ctx: &CallContext<'_>,
        rate_bps: BasisPoints,
        events: &mut EventLog,
    ) -> Result<()> {
        ctx.ensure_active()?;
        if rate_bps > self.config.max_commission_bps {
            return Err(HalomError::CommissionTooHigh {
                rate: rate_bps,
                max: self.config.max_commission_bps,
            });
        }
        let validator = ctx.caller;
        // rewards accrued so far are charged at the old rate
        self.settle_delegators_of(&validator)?;
        self.validators.entry(validator).or_default().commission_bps = rate_bps;

        info!("Validator {} commission set to {} bps", validator, rate_bps);
        events.emit(ProtocolEvent::CommissionRateSet {
            validator,
            rate_bps,
        });
        Ok(())
    }

    pub fn delegate(
        &mut self,
        ctx: &CallContext<'_>,
        ledger: &SupplyLedger,
        validator: AccountId,
        amount: Balance,
        events: &mut EventLog,
    ) -> Result<()> {
        ctx.ensure_active()?;
        let delegator = ctx.caller;
        if validator == delegator {
            return Err(HalomError::SelfDelegation);
        }
        if amount == 0 {
            return Err(HalomError::InvalidAmount(amount));
        }
        let principal = self.principal_of(&delegator);
        let staked = ledger.effective_of(principal);
        if principal == 0 || amount > staked {
            return Err(HalomError::InsufficientStake {
                requested: amount,
                staked,
            });
        }
        if self.principal_of(&validator) == 0 {
            return Err(HalomError::InvalidDelegationTarget(validator));
        }
        let share = Self::nominal_share(ledger, amount, principal, staked)?;

        self.settle(&delegator)?;
        if let Some(previous) = self.detach_delegation(&delegator) {
            events.emit(ProtocolEvent::Undelegated {
                delegator,
                validator: previous.validator,
                amount: ledger.effective_of(previous.amount),
            });
        }

        let profile = self.validators.entry(validator).or_default();
        profile.delegated_total = profile
            .delegated_total
            .checked_add(share)
            .ok_or(HalomError::Overflow("delegated total"))?;
        profile.delegators += 1;

        if let Some(position) = self.positions.get_mut(&delegator) {
            position.delegation = Some(Delegation {
                validator,
                amount: share,
                delegated_at: ctx.now,
                last_claim_at: None,
            });
        }

        info!("{} delegated {} to {}", delegator, amount, validator);
        events.emit(ProtocolEvent::Delegated {
            delegator,
            validator,
            amount,
        });
        Ok(())
    }

    pub fn undelegate(
        &mut self,
        ctx: &CallContext<'_>,
        ledger: &SupplyLedger,
        events: &mut EventLog,
    ) -> Result<()> {
        ctx.ensure_active()?;
        let delegator = ctx.caller;
        self.settle(&delegator)?;
        let delegation = self
            .detach_delegation(&delegator)
            .ok_or(HalomError::NotDelegated)?;

        info!("{} undelegated from {}", delegator, delegation.validator);
        events.emit(ProtocolEvent::Undelegated {
            delegator,
            validator: delegation.validator,
            amount: ledger.effective_of(delegation.amount),
        });
        Ok(())
    }

    fn detach_delegation(&mut self, delegator: &AccountId) -> Option<Delegation> {
        let delegation = self.positions.get_mut(delegator)?.delegation.take()?;
        if let Some(profile) = self.validators.get_mut(&delegation.validator) {
            profile.delegated_total = profile.delegated_total.saturating_sub(delegation.amount);
            profile.delegators = profile.delegators.saturating_sub(1);
        }
        Some(delegation)
    }

    /// Pay the caller's accumulated validator commission
    pub fn claim_commission(
        &mut self,
        ctx: &CallContext<'_>,
        ledger: &mut SupplyLedger,
        events: &mut EventLog,
    ) -> Result<Balance> {
        ctx.ensure_active()?;
        let validator = ctx.caller;
        self.settle_delegators_of(&validator)?;

        let owed = self
            .validators
            .get(&validator)
            .map_or(0, |v| v.commission_balance);
        if owed == 0 {
            return Err(HalomError::NoRewardToClaim);
        }
        let paid = self.drift_adjusted(owed, ledger)?;
        if paid == 0 {
            return Err(HalomError::InsufficientPoolBalance {
                requested: owed,
                available: ledger.effective_balance(&self.pool_account),
            });
        }
        self.pay_out(ledger, validator, paid)?;

        self.reward_liabilities = self.reward_liabilities.saturating_sub(owed);
        self.written_off = self.written_off.saturating_add(owed - paid);
        if let Some(profile) = self.validators.get_mut(&validator) {
            profile.commission_balance = 0;
            profile.commission_paid = profile.commission_paid.saturating_add(paid);
        }

        info!("Validator {} claimed {} commission", validator, paid);
        events.emit(ProtocolEvent::CommissionClaimed {
            validator,
            amount: paid,
        });
        Ok(paid)
    }
}

impl RewardSink for StakingPool {
    fn inject_rewards(&mut self, amount: Balance, events: &mut EventLog) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.reward_liabilities = self
            .reward_liabilities
            .checked_add(amount)
            .ok_or(HalomError::Overflow("reward liabilities"))?;

        match self.accumulator.inject(amount)? {
            Injection::Distributed(amount) => {
                debug!(
                    "Injected {} rewards over weight {}",
                    amount,
                    self.accumulator.total_weight()
                );
                events.emit(ProtocolEvent::RewardsInjected { amount });
            }
            Injection::Queued(amount) => {
                warn!("No stake to reward, queued {} rewards", amount);
                events.emit(ProtocolEvent::RewardsQueued { amount });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halom_core::access::{CapabilityTable, EmergencySwitch};

    struct Fixture {
        table: CapabilityTable,
        switch: EmergencySwitch,
        ledger: SupplyLedger,
        pool: StakingPool,
        events: EventLog,
    }

    fn ctx_for<'a>(
        table: &'a CapabilityTable,
        switch: &'a EmergencySwitch,
        label: &str,
    ) -> CallContext<'a> {
        CallContext::new(AccountId::from_label(label), 100, table, switch)
    }

    impl Fixture {
        fn new(balances: &[(&str, Balance)]) -> Self {
            let mut ledger = SupplyLedger::new();
            for (label, amount) in balances {
                ledger.mint(AccountId::from_label(label), *amount).unwrap();
            }
            Self {
                table: CapabilityTable::new(),
                switch: EmergencySwitch::new(),
                ledger,
                pool: StakingPool::new(
                    StakingConfig {
                        min_stake: 1,
                        ..StakingConfig::default()
                    },
                    AccountId::from_label("pool"),
                ),
                events: EventLog::new(),
            }
        }

        fn stake(&mut self, label: &str, amount: Balance) -> Result<StakeInfo> {
            let ctx = CallContext::new(AccountId::from_label(label), 100, &self.table, &self.switch);
            self.pool.stake(&ctx, &mut self.ledger, amount, &mut self.events)
        }

        fn unstake(&mut self, label: &str, amount: Balance) -> Result<StakeInfo> {
            let ctx = CallContext::new(AccountId::from_label(label), 100, &self.table, &self.switch);
            self.pool.unstake(&ctx, &mut self.ledger, amount, &mut self.events)
        }

        fn claim(&mut self, label: &str) -> Result<Balance> {
            let ctx = CallContext::new(AccountId::from_label(label), 100, &self.table, &self.switch);
            self.pool.claim_reward(&ctx, &mut self.ledger, &mut self.events)
        }

        /// Mint rewards into the pool account and notify the pool
        fn reward(&mut self, amount: Balance) {
            self.ledger.mint(self.pool.pool_account(), amount).unwrap();
            self.pool.inject_rewards(amount, &mut self.events).unwrap();
        }

        fn balance(&self, label: &str) -> Balance {
            self.ledger.effective_balance(&AccountId::from_label(label))
        }
    }

    #[test]
    fn test_stake_moves_tokens_and_sets_weight() {
        let mut fx = Fixture::new(&[("alice", 10_000)]);
        let info = fx.stake("alice", 10_000).unwrap();

        assert_eq!(info.staked, 10_000);
        assert_eq!(info.weight, 10);
        assert_eq!(fx.balance("alice"), 0);
        assert_eq!(fx.ledger.effective_balance(&fx.pool.pool_account()), 10_000);
        assert_eq!(fx.pool.accumulator().total_weight(), 10);
    }

    #[test]
    fn test_stake_validation() {
        let mut fx = Fixture::new(&[("alice", 100)]);
        assert_eq!(fx.stake("alice", 0).unwrap_err(), HalomError::InvalidAmount(0));
        assert_eq!(
            fx.stake("alice", 101).unwrap_err(),
            HalomError::InsufficientBalance {
                requested: 101,
                available: 100
            }
        );
        assert_eq!(
            fx.unstake("alice", 1).unwrap_err(),
            HalomError::InsufficientStake {
                requested: 1,
                staked: 0
            }
        );
    }

    #[test]
    fn test_rewards_follow_fourth_root_weight() {
        let mut fx = Fixture::new(&[("small", 16), ("whale", 1_296)]);
        fx.stake("small", 16).unwrap(); // weight 2
        fx.stake("whale", 1_296).unwrap(); // weight 6

        fx.reward(800);
        assert_eq!(fx.claim("small").unwrap(), 200);
        assert_eq!(fx.claim("whale").unwrap(), 600);
    }

    #[test]
    fn test_second_claim_has_nothing() {
        let mut fx = Fixture::new(&[("alice", 10_000)]);
        fx.stake("alice", 10_000).unwrap();
        fx.reward(1_000);

        assert_eq!(fx.claim("alice").unwrap(), 1_000);
        assert_eq!(fx.claim("alice").unwrap_err(), HalomError::NoRewardToClaim);
    }

    #[test]
    fn test_queued_rewards_go_to_first_staker() {
        let mut fx = Fixture::new(&[("alice", 10_000)]);
        fx.reward(500);
        assert!(matches!(
            fx.events.events().last(),
            Some(ProtocolEvent::RewardsQueued { amount: 500 })
        ));

        fx.stake("alice", 10_000).unwrap();
        assert!(fx
            .events
            .events()
            .iter()
            .any(|e| matches!(e, ProtocolEvent::RewardsInjected { amount: 500 })));
        assert_eq!(fx.claim("alice").unwrap(), 500);
    }

    #[test]
    fn test_claim_scaled_by_pool_drift() {
        let mut fx = Fixture::new(&[("alice", 10_000)]);
        fx.stake("alice", 10_000).unwrap();
        fx.reward(10_000);
        assert_eq!(fx.pool.expected_pool_balance(&fx.ledger), 20_000);

        // pool ends up 5% short of what it owes
        let pool_account = fx.pool.pool_account();
        fx.ledger.burn(&pool_account, 1_000).unwrap();

        let alice = AccountId::from_label("alice");
        assert_eq!(fx.pool.pending_reward(&alice, &fx.ledger).unwrap(), 9_500);
        assert_eq!(fx.claim("alice").unwrap(), 9_500);
        assert_eq!(fx.pool.written_off(), 500);
        assert!(matches!(
            fx.events.events().last(),
            Some(ProtocolEvent::RewardClaimed {
                amount: 9_500,
                written_off: 500,
                ..
            })
        ));

        // principal takes the same haircut, so the pool empties exactly
        fx.unstake("alice", 10_000).unwrap();
        assert_eq!(fx.balance("alice"), 19_000);
        assert_eq!(fx.ledger.effective_balance(&pool_account), 0);
        assert_eq!(fx.pool.written_off(), 1_000);
        assert!(matches!(
            fx.events.events().last(),
            Some(ProtocolEvent::Unstaked {
                amount: 9_500,
                written_off: 500,
                ..
            })
        ));
    }

    #[test]
    fn test_principal_follows_negative_rebase() {
        let mut fx = Fixture::new(&[("alice", 1_000), ("bob", 1_000), ("carol", 1_000)]);
        fx.stake("alice", 500).unwrap();
        fx.stake("bob", 500).unwrap();

        fx.ledger.rescale(-150).unwrap();
        let alice = AccountId::from_label("alice");
        assert_eq!(fx.pool.stake_info(&alice, &fx.ledger).staked, 475);
        assert_eq!(fx.pool.total_staked(&fx.ledger), 950);
        assert_eq!(
            fx.pool.expected_pool_balance(&fx.ledger),
            fx.ledger.effective_balance(&fx.pool.pool_account())
        );

        fx.unstake("alice", 475).unwrap();
        fx.unstake("bob", 475).unwrap();
        assert_eq!(fx.balance("alice"), 950);
        assert_eq!(fx.balance("bob"), fx.balance("carol"));
        assert_eq!(fx.pool.total_principal(), 0);
        assert_eq!(fx.pool.written_off(), 0);
        assert_eq!(fx.ledger.effective_balance(&fx.pool.pool_account()), 0);
    }

    #[test]
    fn test_principal_follows_positive_rebase() {
        let mut fx = Fixture::new(&[("alice", 1_000), ("carol", 1_000)]);
        fx.stake("alice", 1_000).unwrap();

        fx.ledger.rescale(200).unwrap();
        let alice = AccountId::from_label("alice");
        assert_eq!(fx.pool.stake_info(&alice, &fx.ledger).staked, 1_100);
        assert_eq!(fx.unstake("alice", 1_100).unwrap().staked, 0);

        assert_eq!(fx.balance("alice"), 1_100);
        assert_eq!(fx.balance("alice"), fx.balance("carol"));
        assert_eq!(fx.ledger.effective_balance(&fx.pool.pool_account()), 0);
    }

    #[test]
    fn test_minimum_stake() {
        let mut fx = Fixture::new(&[("alice", 1_000)]);
        fx.pool = StakingPool::new(
            StakingConfig {
                min_stake: 100,
                ..StakingConfig::default()
            },
            AccountId::from_label("pool"),
        );

        assert_eq!(
            fx.stake("alice", 50).unwrap_err(),
            HalomError::BelowMinimumStake {
                amount: 50,
                minimum: 100
            }
        );
        fx.stake("alice", 100).unwrap();
        // top-ups are not floored
        fx.stake("alice", 10).unwrap();

        assert_eq!(
            fx.unstake("alice", 20).unwrap_err(),
            HalomError::BelowMinimumStake {
                amount: 90,
                minimum: 100
            }
        );
        fx.unstake("alice", 10).unwrap();
        fx.unstake("alice", 100).unwrap();
        assert_eq!(fx.balance("alice"), 1_000);

        let zero = StakingConfig {
            min_stake: 0,
            ..StakingConfig::default()
        };
        assert!(matches!(zero.validate(), Err(HalomError::InvalidConfig(_))));
    }

    #[test]
    fn test_delegation_commission_split() {
        let mut fx = Fixture::new(&[("validator", 16), ("delegator", 16)]);
        fx.stake("validator", 16).unwrap();
        fx.stake("delegator", 16).unwrap();

        let ctx = ctx_for(&fx.table, &fx.switch, "validator");
        fx.pool.set_commission_rate(&ctx, 1_000, &mut fx.events).unwrap();
        let validator = AccountId::from_label("validator");
        let ctx = ctx_for(&fx.table, &fx.switch, "delegator");
        fx.pool.delegate(&ctx, &fx.ledger, validator, 16, &mut fx.events).unwrap();

        // equal weights: 1000 units accrue to the delegator
        fx.reward(2_000);

        assert_eq!(fx.claim("delegator").unwrap(), 900);
        let ctx = ctx_for(&fx.table, &fx.switch, "validator");
        assert_eq!(
            fx.pool.claim_commission(&ctx, &mut fx.ledger, &mut fx.events).unwrap(),
            100
        );
        assert_eq!(fx.claim("validator").unwrap(), 1_000);
        assert_eq!(fx.pool.validator(&validator).unwrap().commission_paid, 100);
    }

    #[test]
    fn test_partial_delegation_charges_delegated_share() {
        let mut fx = Fixture::new(&[("validator", 16), ("delegator", 16)]);
        fx.stake("validator", 16).unwrap();
        fx.stake("delegator", 16).unwrap();

        let ctx = ctx_for(&fx.table, &fx.switch, "validator");
        fx.pool.set_commission_rate(&ctx, 2_000, &mut fx.events).unwrap();
        let ctx = ctx_for(&fx.table, &fx.switch, "delegator");
        let validator = AccountId::from_label("validator");
        fx.pool
            .delegate(&ctx, &fx.ledger, validator, 8, &mut fx.events)
            .unwrap();

        fx.reward(2_000);
        // 1000 × 20% × 8/16
        assert_eq!(fx.claim("delegator").unwrap(), 900);
    }

    #[test]
    fn test_delegation_validation() {
        let mut fx = Fixture::new(&[("validator", 16), ("delegator", 16), ("idle", 16)]);
        fx.stake("delegator", 16).unwrap();
        let validator = AccountId::from_label("validator");
        let ctx = ctx_for(&fx.table, &fx.switch, "delegator");

        assert_eq!(
            fx.pool
                .delegate(&ctx, &fx.ledger, ctx.caller, 1, &mut fx.events)
                .unwrap_err(),
            HalomError::SelfDelegation
        );
        assert_eq!(
            fx.pool.delegate(&ctx, &fx.ledger, validator, 0, &mut fx.events).unwrap_err(),
            HalomError::InvalidAmount(0)
        );
        assert_eq!(
            fx.pool.delegate(&ctx, &fx.ledger, validator, 17, &mut fx.events).unwrap_err(),
            HalomError::InsufficientStake {
                requested: 17,
                staked: 16
            }
        );
        assert_eq!(
            fx.pool.delegate(&ctx, &fx.ledger, validator, 16, &mut fx.events).unwrap_err(),
            HalomError::InvalidDelegationTarget(validator)
        );
        assert_eq!(
            fx.pool.undelegate(&ctx, &fx.ledger, &mut fx.events).unwrap_err(),
            HalomError::NotDelegated
        );

        let idle = ctx_for(&fx.table, &fx.switch, "idle");
        assert_eq!(
            fx.pool.delegate(&idle, &fx.ledger, validator, 1, &mut fx.events).unwrap_err(),
            HalomError::InsufficientStake {
                requested: 1,
                staked: 0
            }
        );
        assert_eq!(
            fx.pool.set_commission_rate(&ctx, 2_001, &mut fx.events).unwrap_err(),
            HalomError::CommissionTooHigh {
                rate: 2_001,
                max: 2_000
            }
        );
    }

    #[test]
    fn test_unstake_clamps_then_ends_delegation() {
        let mut fx = Fixture::new(&[("validator", 16), ("delegator", 16)]);
        fx.stake("validator", 16).unwrap();
        fx.stake("delegator", 16).unwrap();
        let validator = AccountId::from_label("validator");
        let ctx = ctx_for(&fx.table, &fx.switch, "delegator");
        fx.pool.delegate(&ctx, &fx.ledger, validator, 16, &mut fx.events).unwrap();

        fx.unstake("delegator", 10).unwrap();
        let delegator = AccountId::from_label("delegator");
        let delegation = fx.pool.position(&delegator).unwrap().delegation.clone().unwrap();
        assert_eq!(delegation.amount, 6);
        assert_eq!(fx.pool.validator(&validator).unwrap().delegated_total, 6);

        fx.unstake("delegator", 6).unwrap();
        assert!(fx.pool.position(&delegator).is_none());
        assert_eq!(fx.pool.stake_info(&delegator, &fx.ledger).delegation, None);
        assert_eq!(fx.pool.validator(&validator).unwrap().delegated_total, 0);
        assert_eq!(fx.balance("delegator"), 16);
    }

    #[test]
    fn test_redelegation_moves_totals() {
        let mut fx = Fixture::new(&[("v1", 16), ("v2", 16), ("delegator", 16)]);
        for label in ["v1", "v2", "delegator"] {
            fx.stake(label, 16).unwrap();
        }
        let (v1, v2) = (AccountId::from_label("v1"), AccountId::from_label("v2"));
        let ctx = ctx_for(&fx.table, &fx.switch, "delegator");
        fx.pool.delegate(&ctx, &fx.ledger, v1, 16, &mut fx.events).unwrap();
        fx.pool.delegate(&ctx, &fx.ledger, v2, 10, &mut fx.events).unwrap();

        assert_eq!(fx.pool.validator(&v1).unwrap().delegated_total, 0);
        assert_eq!(fx.pool.validator(&v2).unwrap().delegated_total, 10);
        assert_eq!(
            fx.pool
                .stake_info(&AccountId::from_label("delegator"), &fx.ledger)
                .delegation,
            Some(v2)
        );
    }

    #[test]
    fn test_paused_pool_rejects_calls() {
        let mut fx = Fixture::new(&[("alice", 100)]);
        fx.switch.pause();
        assert_eq!(fx.stake("alice", 10).unwrap_err(), HalomError::ContractPaused);
        assert!(fx.events.is_empty());
    }
}
