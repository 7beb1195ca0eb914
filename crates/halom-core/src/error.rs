//! Error types for Halom protocol operations

use crate::types::{AccountId, Balance, RoundId, Timestamp};
use thiserror::Error;

/// Result type alias for Halom operations
pub type Result<T> = std::result::Result<T, HalomError>;

/// Coarse error classification used by monitoring to decide between
/// "fix and resubmit" and "alert operators"
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller lacks permission or the protocol is paused
    Authorization,
    /// Caller input is wrong for the current state
    Validation,
    /// Not enough stake or tokens to honour the call
    Resource,
    /// Arithmetic or state machine fault
    Internal,
}

/// Errors that can occur anywhere in the oracle → rebase → reward pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalomError {
    // === Authorization ===
    /// Caller does not hold the capability required for the call
    #[error("Unauthorized: {0} lacks the required capability")]
    Unauthorized(AccountId),

    /// Emergency pause is active
    #[error("Contract is paused")]
    ContractPaused,

    // === Oracle ===
    /// Reporter already submitted a value for this round
    #[error("Duplicate submission from {reporter} in round {round}")]
    DuplicateSubmission { round: RoundId, reporter: AccountId },

    /// Round no longer accepts submissions
    #[error("Round {0} is closed")]
    RoundClosed(RoundId),

    /// Round was never opened
    #[error("Round {0} not found")]
    RoundNotFound(RoundId),

    /// Round ids must strictly increase
    #[error("Round {requested} cannot be opened after round {latest}")]
    StaleRound { requested: RoundId, latest: RoundId },

    /// Round already produced a value
    #[error("Round {0} already resolved")]
    RoundAlreadyResolved(RoundId),

    /// Neither the submission threshold nor the window end has been reached
    #[error("Round {round} not ready: {submissions} submissions before {closes_at}")]
    ResolutionNotReady {
        round: RoundId,
        submissions: usize,
        closes_at: Timestamp,
    },

    /// Fewer than two usable submissions
    #[error("Insufficient feeds: need {required}, have {available}")]
    InsufficientFeeds { required: usize, available: usize },

    /// Supplied nonce does not match the current index nonce
    #[error("Invalid nonce: expected {expected}, got {supplied}")]
    InvalidNonce { expected: u64, supplied: u64 },

    /// Index values must be strictly positive
    #[error("Invalid index value: {0}")]
    InvalidIndexValue(u128),

    // === Rebase ===
    /// A rebase arrived inside the cooldown window
    #[error("Rebase too early: next rebase allowed at {next_allowed}")]
    RebaseTooEarly { next_allowed: Timestamp },

    /// Re-entrant rebase
    #[error("Rebase already in progress")]
    RebaseInProgress,

    // === Staking ===
    /// Zero or otherwise unusable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(Balance),

    /// Amount exceeds the caller's stake
    #[error("Insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake { requested: Balance, staked: Balance },

    /// Stake, or the remainder after a partial unstake, below the floor
    #[error("Stake {amount} below minimum {minimum}")]
    BelowMinimumStake { amount: Balance, minimum: Balance },

    /// Account cannot cover a transfer
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Balance, available: Balance },

    /// Reward pool cannot cover a payout
    #[error("Insufficient pool balance: requested {requested}, available {available}")]
    InsufficientPoolBalance { requested: Balance, available: Balance },

    /// Nothing to claim
    #[error("No reward to claim")]
    NoRewardToClaim,

    /// Commission above the protocol maximum
    #[error("Commission rate {rate} bps exceeds maximum {max} bps")]
    CommissionTooHigh { rate: u32, max: u32 },

    /// Delegating to oneself
    #[error("Cannot delegate to self")]
    SelfDelegation,

    /// Delegation target is not an active staker
    #[error("Invalid delegation target: {0}")]
    InvalidDelegationTarget(AccountId),

    /// Caller has no active delegation
    #[error("No active delegation")]
    NotDelegated,

    // === General ===
    /// Configuration rejected at load time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Checked arithmetic failed
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl HalomError {
    /// Stable numeric error code for external monitoring
    pub fn code(&self) -> u32 {
        match self {
            Self::Unauthorized(_) => 1001,
            Self::ContractPaused => 1002,
            Self::DuplicateSubmission { .. } => 2001,
            Self::RoundClosed(_) => 2002,
            Self::RoundNotFound(_) => 2003,
            Self::StaleRound { .. } => 2004,
            Self::RoundAlreadyResolved(_) => 2005,
            Self::ResolutionNotReady { .. } => 2006,
            Self::InsufficientFeeds { .. } => 2007,
            Self::InvalidNonce { .. } => 2008,
            Self::InvalidIndexValue(_) => 2009,
            Self::RebaseTooEarly { .. } => 3001,
            Self::RebaseInProgress => 3002,
            Self::InvalidAmount(_) => 4001,
            Self::InsufficientStake { .. } => 4002,
            Self::InsufficientBalance { .. } => 4003,
            Self::InsufficientPoolBalance { .. } => 4004,
            Self::NoRewardToClaim => 4005,
            Self::CommissionTooHigh { .. } => 4006,
            Self::SelfDelegation => 4007,
            Self::InvalidDelegationTarget(_) => 4008,
            Self::NotDelegated => 4009,
            Self::BelowMinimumStake { .. } => 4010,
            Self::InvalidConfig(_) => 9001,
            Self::Overflow(_) => 9999,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) | Self::ContractPaused => ErrorKind::Authorization,
            Self::InsufficientStake { .. }
            | Self::InsufficientBalance { .. }
            | Self::InsufficientPoolBalance { .. } => ErrorKind::Resource,
            Self::RebaseInProgress | Self::Overflow(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }

    /// Validation errors can be fixed by the caller and resubmitted
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Authorization and internal faults need operator attention
    pub fn needs_escalation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Authorization | ErrorKind::Internal)
    }
}
