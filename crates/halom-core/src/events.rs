//! Protocol events
//!
//! Events are buffered with the state of a call and only become visible when
//! the call commits.

use crate::types::{AccountId, Balance, IndexValue, ResolutionMethod, RoundId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    RoundOpened {
        round: RoundId,
        closes_at: Timestamp,
    },
    FeedSubmitted {
        round: RoundId,
        reporter: AccountId,
        value: IndexValue,
    },
    ConsensusResolved {
        round: RoundId,
        value: IndexValue,
        method: ResolutionMethod,
    },
    IndexPublished {
        value: IndexValue,
        nonce: u64,
    },
    RebaseExecuted {
        /// Signed supply delta actually applied
        delta: i128,
        new_multiplier: u128,
    },
    /// Raw delta exceeded the per-rebase bound
    RebaseClamped {
        requested: i128,
        applied: i128,
    },
    /// Reserve could not cover a negative rebase
    BurnShortfall {
        requested: Balance,
        burned: Balance,
        shortfall: Balance,
    },
    RewardsInjected {
        amount: Balance,
    },
    /// Injected while no weight was staked
    RewardsQueued {
        amount: Balance,
    },
    Staked {
        account: AccountId,
        amount: Balance,
        weight: u128,
    },
    Unstaked {
        account: AccountId,
        /// Principal paid out
        amount: Balance,
        /// Principal lost to pool drift
        written_off: Balance,
        weight: u128,
    },
    Delegated {
        delegator: AccountId,
        validator: AccountId,
        amount: Balance,
    },
    Undelegated {
        delegator: AccountId,
        validator: AccountId,
        amount: Balance,
    },
    RewardClaimed {
        account: AccountId,
        amount: Balance,
        /// Portion written off by the drift correction
        written_off: Balance,
    },
    CommissionRateSet {
        validator: AccountId,
        rate_bps: u32,
    },
    CommissionClaimed {
        validator: AccountId,
        amount: Balance,
    },
    Transferred {
        from: AccountId,
        to: AccountId,
        amount: Balance,
    },
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoundOpened { .. } => "RoundOpened",
            Self::FeedSubmitted { .. } => "FeedSubmitted",
            Self::ConsensusResolved { .. } => "ConsensusResolved",
            Self::IndexPublished { .. } => "IndexPublished",
            Self::RebaseExecuted { .. } => "RebaseExecuted",
            Self::RebaseClamped { .. } => "RebaseClamped",
            Self::BurnShortfall { .. } => "BurnShortfall",
            Self::RewardsInjected { .. } => "RewardsInjected",
            Self::RewardsQueued { .. } => "RewardsQueued",
            Self::Staked { .. } => "Staked",
            Self::Unstaked { .. } => "Unstaked",
            Self::Delegated { .. } => "Delegated",
            Self::Undelegated { .. } => "Undelegated",
            Self::RewardClaimed { .. } => "RewardClaimed",
            Self::CommissionRateSet { .. } => "CommissionRateSet",
            Self::CommissionClaimed { .. } => "CommissionClaimed",
            Self::Transferred { .. } => "Transferred",
        }
    }

    /// Bounded degradations that monitoring should surface as warnings
    pub fn is_degradation(&self) -> bool {
        matches!(self, Self::RebaseClamped { .. } | Self::BurnShortfall { .. })
    }
}

/// Append-only event buffer owned by a state snapshot
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand the buffered events to the caller
    pub fn drain(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Move every event of `other` to the end of this log
    pub fn append(&mut self, other: &mut EventLog) {
        self.events.append(&mut other.events);
    }
}
