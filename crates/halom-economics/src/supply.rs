//! # Supply Ledger
//!
//! Index-based balance representation for HOM.
//!
//! Holders own *nominal* units. A single global multiplier converts them into
//! the balances users see:
//!
//! ```text
//! effective(account) = nominal(account) × multiplier / 1e18
//! total_supply       = Σ nominal × multiplier / 1e18
//! ```
//!
//! Rescaling every holder is one write to `multiplier`. Because each account
//! balance is floored independently, Σ effective trails total supply by less
//! than one unit per account.

use halom_core::error::{HalomError, Result};
use halom_core::math::mul_div;
use halom_core::types::{AccountId, Balance, SCALE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupplyLedger {
    /// Rebase multiplier, 1e18 == 1.0
    multiplier: u128,
    nominal: HashMap<AccountId, u128>,
    total_nominal: u128,
}

impl Default for SupplyLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplyLedger {
    pub fn new() -> Self {
        Self {
            multiplier: SCALE,
            nominal: HashMap::new(),
            total_nominal: 0,
        }
    }

    pub fn multiplier(&self) -> u128 {
        self.multiplier
    }

    pub fn nominal_balance(&self, account: &AccountId) -> u128 {
        self.nominal.get(account).copied().unwrap_or(0)
    }

    pub fn total_nominal(&self) -> u128 {
        self.total_nominal
    }

    /// Rebase-adjusted balance; saturates instead of failing for display use
    pub fn effective_balance(&self, account: &AccountId) -> Balance {
        self.effective_of(self.nominal_balance(account))
    }

    /// Effective value of `nominal` units at the current multiplier
    pub fn effective_of(&self, nominal: u128) -> Balance {
        self.to_effective(nominal).unwrap_or(Balance::MAX)
    }

    /// Smallest nominal amount worth at least `amount`
    pub fn nominal_of(&self, amount: Balance) -> Result<u128> {
        self.to_nominal_ceil(amount)
    }

    pub fn total_supply(&self) -> Balance {
        self.to_effective(self.total_nominal).unwrap_or(Balance::MAX)
    }

    /// Accounts holding a non-zero nominal balance
    pub fn holder_count(&self) -> usize {
        self.nominal.len()
    }

    /// (account, effective balance) for every holder
    pub fn balances(&self) -> Vec<(AccountId, Balance)> {
        let mut balances: Vec<(AccountId, Balance)> = self
            .nominal
            .keys()
            .map(|account| (*account, self.effective_balance(account)))
            .collect();
        balances.sort_by_key(|(account, _)| *account);
        balances
    }

    fn to_effective(&self, nominal: u128) -> Result<Balance> {
        mul_div(nominal, self.multiplier, SCALE)
    }

    fn to_nominal_floor(&self, amount: Balance) -> Result<u128> {
        mul_div(amount, SCALE, self.multiplier)
    }

    fn to_nominal_ceil(&self, amount: Balance) -> Result<u128> {
        let floor = self.to_nominal_floor(amount)?;
        if self.to_effective(floor)? >= amount {
            Ok(floor)
        } else {
            floor.checked_add(1).ok_or(HalomError::Overflow("to_nominal"))
        }
    }

    fn credit(&mut self, account: AccountId, nominal: u128) -> Result<()> {
        if nominal == 0 {
            return Ok(());
        }
        let entry = self.nominal.entry(account).or_insert(0);
        *entry = entry
            .checked_add(nominal)
            .ok_or(HalomError::Overflow("credit"))?;
        self.total_nominal = self
            .total_nominal
            .checked_add(nominal)
            .ok_or(HalomError::Overflow("total nominal"))?;
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, nominal: u128) {
        if let Some(entry) = self.nominal.get_mut(account) {
            let taken = nominal.min(*entry);
            *entry -= taken;
            self.total_nominal -= taken;
            if *entry == 0 {
                self.nominal.remove(account);
            }
        }
    }

    /// Create `amount` effective tokens for `to`
    pub fn mint(&mut self, to: AccountId, amount: Balance) -> Result<()> {
        let nominal = self.to_nominal_floor(amount)?;
        self.credit(to, nominal)
    }

    /// Destroy exactly `amount` from `from`
    pub fn burn(&mut self, from: &AccountId, amount: Balance) -> Result<()> {
        let available = self.effective_balance(from);
        if amount > available {
            return Err(HalomError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let nominal = self.to_nominal_ceil(amount)?;
        self.debit(from, nominal);
        Ok(())
    }

    /// Destroy up to `amount` from `from`; returns what was actually burned
    pub fn burn_up_to(&mut self, from: &AccountId, amount: Balance) -> Result<Balance> {
        let burnable = amount.min(self.effective_balance(from));
        if burnable > 0 {
            self.burn(from, burnable)?;
        }
        Ok(burnable)
    }

    /// Move `amount` effective tokens; returns the nominal units moved
    pub fn transfer(&mut self, from: &AccountId, to: AccountId, amount: Balance) -> Result<u128> {
        let available = self.effective_balance(from);
        if amount > available {
            return Err(HalomError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        if from == &to || amount == 0 {
            return Ok(0);
        }
        let nominal = self.to_nominal_ceil(amount)?.min(self.nominal_balance(from));
        self.debit(from, nominal);
        self.credit(to, nominal)?;
        Ok(nominal)
    }

    /// Move exactly `nominal` units
    pub fn transfer_nominal(
        &mut self,
        from: &AccountId,
        to: AccountId,
        nominal: u128,
    ) -> Result<()> {
        let held = self.nominal_balance(from);
        if nominal > held {
            return Err(HalomError::InsufficientBalance {
                requested: self.effective_of(nominal),
                available: self.effective_of(held),
            });
        }
        if from == &to || nominal == 0 {
            return Ok(());
        }
        self.debit(from, nominal);
        self.credit(to, nominal)
    }

    /// Grow or shrink every balance so total supply moves by `delta`;
    /// returns the new multiplier
    pub fn rescale(&mut self, delta: i128) -> Result<u128> {
        let total = self.total_supply();
        if total == 0 || delta == 0 {
            return Ok(self.multiplier);
        }

        let target = if delta >= 0 {
            total
                .checked_add(delta.unsigned_abs())
                .ok_or(HalomError::Overflow("rescale"))?
        } else {
            total.saturating_sub(delta.unsigned_abs())
        };

        let multiplier = mul_div(self.multiplier, target, total)?;
        if multiplier == 0 {
            return Err(HalomError::Overflow("rescale: multiplier underflow"));
        }
        self.multiplier = multiplier;
        Ok(multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halom_core::types::ONE_HOM;
    use proptest::prelude::*;

    fn account(n: u8) -> AccountId {
        AccountId::new([n; 32])
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(account(1), 100 * ONE_HOM).unwrap();
        ledger.transfer(&account(1), account(2), 40 * ONE_HOM).unwrap();

        assert_eq!(ledger.effective_balance(&account(1)), 60 * ONE_HOM);
        assert_eq!(ledger.effective_balance(&account(2)), 40 * ONE_HOM);
        assert_eq!(ledger.total_supply(), 100 * ONE_HOM);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(account(1), 10).unwrap();
        assert_eq!(
            ledger.transfer(&account(1), account(2), 11).unwrap_err(),
            HalomError::InsufficientBalance {
                requested: 11,
                available: 10
            }
        );
    }

    #[test]
    fn test_rescale_moves_every_balance() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(account(1), 600 * ONE_HOM).unwrap();
        ledger.mint(account(2), 400 * ONE_HOM).unwrap();

        let multiplier = ledger.rescale(100 * ONE_HOM as i128).unwrap();
        assert_eq!(multiplier, SCALE + SCALE / 10);
        assert_eq!(ledger.total_supply(), 1_100 * ONE_HOM);
        assert_eq!(ledger.effective_balance(&account(1)), 660 * ONE_HOM);
        assert_eq!(ledger.effective_balance(&account(2)), 440 * ONE_HOM);
        // nominal holdings are untouched
        assert_eq!(ledger.nominal_balance(&account(1)), 600 * ONE_HOM);

        ledger.rescale(-(110 * ONE_HOM as i128)).unwrap();
        assert_eq!(ledger.total_supply(), 990 * ONE_HOM);
    }

    #[test]
    fn test_burn_up_to_caps_at_balance() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(account(1), 50).unwrap();
        assert_eq!(ledger.burn_up_to(&account(1), 80).unwrap(), 50);
        assert_eq!(ledger.effective_balance(&account(1)), 0);
        assert_eq!(ledger.holder_count(), 0);
    }

    #[test]
    fn test_transfer_after_rescale_pays_full_amount() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(account(1), 1_000 * ONE_HOM).unwrap();
        ledger.rescale(-(30 * ONE_HOM as i128 + 7)).unwrap();

        let before = ledger.effective_balance(&account(2));
        ledger.transfer(&account(1), account(2), 123_456_789).unwrap();
        assert!(ledger.effective_balance(&account(2)) >= before + 123_456_789);
    }

    #[test]
    fn test_nominal_transfer_follows_rescale() {
        let mut ledger = SupplyLedger::new();
        ledger.mint(account(1), 1_000 * ONE_HOM).unwrap();
        let moved = ledger.transfer(&account(1), account(2), 400 * ONE_HOM).unwrap();
        assert_eq!(moved, 400 * ONE_HOM);

        ledger.rescale(-(100 * ONE_HOM as i128)).unwrap();
        assert_eq!(ledger.effective_of(moved), 360 * ONE_HOM);

        ledger.transfer_nominal(&account(2), account(1), moved).unwrap();
        assert_eq!(ledger.nominal_balance(&account(2)), 0);
        assert_eq!(ledger.effective_balance(&account(1)), 900 * ONE_HOM);
        assert!(matches!(
            ledger.transfer_nominal(&account(2), account(1), 1),
            Err(HalomError::InsufficientBalance { .. })
        ));
    }

    proptest! {
        #[test]
        fn balances_sum_to_supply_within_rounding(
            mints in proptest::collection::vec((0u8..6, 1u128..1_000_000 * ONE_HOM), 1..12),
            deltas in proptest::collection::vec(-50i128..50, 0..6),
        ) {
            let mut ledger = SupplyLedger::new();
            for (who, amount) in &mints {
                ledger.mint(account(*who), *amount).unwrap();
            }
            for pct in deltas {
                let delta = ledger.total_supply() as i128 * pct / 1_000;
                ledger.rescale(delta).unwrap();
            }

            let sum: u128 = ledger.balances().iter().map(|(_, b)| *b).sum();
            let total = ledger.total_supply();
            prop_assert!(sum <= total);
            prop_assert!(total - sum <= ledger.holder_count() as u128);
        }
    }
}
