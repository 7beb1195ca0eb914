//! Protocol runtime
//!
//! Owns the full protocol state and runs every mutating call as one atomic
//! transaction: the state is cloned under the write lock, the call chain
//! runs against the clone, and the clone replaces the state only if every
//! stage succeeded. Events emitted by a failed call are dropped with it.
//!
//! The copy covers every retained round, position and ledger entry, so each
//! call costs time linear in the state size. That suits an in-process
//! simulation of the protocol; a persistent deployment would journal writes
//! instead. Undrained events are moved aside before the copy and do not add
//! to it.
//!
//! ```text
//! resolve_and_publish(round, nonce)
//!   ConsensusEngine::resolve ─► IndexPublisher::publish ─► RebaseEngine::rebase
//!                                                             │
//!                                    SupplyLedger::rescale ◄──┤
//!                                 StakingPool::inject_rewards ◄┘
//! ```

use crate::config::ProtocolConfig;
use halom_core::access::{AccessControl, CallContext, PauseGuard};
use halom_core::clock::Clock;
use halom_core::error::{HalomError, Result};
use halom_core::events::{EventLog, ProtocolEvent};
use halom_core::types::{
    AccountId, Balance, BasisPoints, IndexSnapshot, IndexValue, RoundId, StakeInfo, Timestamp,
};
use halom_economics::{RebaseEngine, RebaseOutcome, StakingPool, SupplyLedger};
use halom_oracle::{ConsensusEngine, ConsensusRound, FeedSubmission, IndexPublisher, IndexUpdate, Resolution};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the protocol owns
#[derive(Clone, Debug, Serialize)]
pub struct ProtocolState {
    pub genesis_time: Timestamp,
    pub genesis_hash: String,
    pub consensus: ConsensusEngine,
    pub publisher: IndexPublisher,
    pub rebase: RebaseEngine,
    pub supply: SupplyLedger,
    pub staking: StakingPool,
    /// Committed events not yet drained
    pub events: EventLog,
}

impl ProtocolState {
    /// Build genesis state from a validated configuration
    pub fn genesis(config: &ProtocolConfig, genesis_time: Timestamp) -> Result<Self> {
        config.validate()?;
        let accounts = config.genesis.accounts()?;

        let mut supply = SupplyLedger::new();
        for (account, amount) in config.genesis.balances()? {
            supply.mint(account, amount)?;
        }

        Ok(Self {
            genesis_time,
            genesis_hash: hex::encode(config.genesis.genesis_hash(genesis_time)),
            consensus: ConsensusEngine::new(config.oracle.clone()),
            publisher: IndexPublisher::new(
                config.genesis.initial_index(),
                accounts.consensus_engine,
                genesis_time,
            ),
            rebase: RebaseEngine::new(config.rebase.clone(), accounts.pool, accounts.reserve),
            supply,
            staking: StakingPool::new(config.staking.clone(), accounts.pool),
            events: EventLog::new(),
        })
    }

    /// Feed an accepted index update into the rebase and reward engines
    fn apply_update(&mut self, now: Timestamp, update: &IndexUpdate) -> Result<RebaseOutcome> {
        self.rebase.rebase(
            now,
            &mut self.supply,
            &mut self.staking,
            update.old_value,
            update.new_value,
            &mut self.events,
        )
    }
}

/// Result of one index-driven pipeline run
#[derive(Clone, Debug, Serialize)]
pub struct PipelineOutcome {
    /// Present when the update came from a consensus round
    pub resolution: Option<Resolution>,
    pub update: IndexUpdate,
    pub rebase: RebaseOutcome,
}

pub struct ProtocolRuntime {
    state: RwLock<ProtocolState>,
    access: Arc<dyn AccessControl>,
    pause: Arc<dyn PauseGuard>,
    clock: Arc<dyn Clock>,
}

impl ProtocolRuntime {
    pub fn new(
        config: &ProtocolConfig,
        access: Arc<dyn AccessControl>,
        pause: Arc<dyn PauseGuard>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let state = ProtocolState::genesis(config, clock.now())?;
        info!(
            "Halom runtime initialised: index {}, supply {}, genesis {}",
            state.publisher.current().value,
            state.supply.total_supply(),
            state.genesis_hash
        );
        Ok(Self {
            state: RwLock::new(state),
            access,
            pause,
            clock,
        })
    }

    /// Run `op` against a copy of the state and commit it only on success
    fn transact<T>(
        &self,
        caller: AccountId,
        operation: &'static str,
        op: impl FnOnce(&mut ProtocolState, &CallContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let now = self.clock.now();
        let ctx = CallContext::new(caller, now, self.access.as_ref(), self.pause.as_ref());

        let mut state = self.state.write();
        let mut committed = std::mem::take(&mut state.events);
        let mut draft = state.clone();
        match op(&mut draft, &ctx) {
            Ok(value) => {
                committed.append(&mut draft.events);
                draft.events = committed;
                *state = draft;
                debug!("{} by {} committed", operation, caller);
                Ok(value)
            }
            Err(e) => {
                state.events = committed;
                if e.needs_escalation() {
                    warn!("{} by {} rolled back: {} (code {})", operation, caller, e, e.code());
                } else {
                    debug!("{} by {} rolled back: {}", operation, caller, e);
                }
                Err(e)
            }
        }
    }

    // ---- oracle ----

    pub fn open_round(&self, caller: AccountId, round: RoundId) -> Result<Timestamp> {
        self.transact(caller, "open_round", |state, ctx| {
            state.consensus.open_round(ctx, round, &mut state.events)
        })
    }

    pub fn submit_feed(
        &self,
        caller: AccountId,
        round: RoundId,
        value: IndexValue,
    ) -> Result<FeedSubmission> {
        self.transact(caller, "submit_feed", |state, ctx| {
            state.consensus.submit(ctx, round, value, &mut state.events)
        })
    }

    /// Resolve `round`, publish its value under the consensus engine identity
    /// and rebase, all or nothing
    pub fn resolve_and_publish(
        &self,
        caller: AccountId,
        round: RoundId,
        nonce: u64,
    ) -> Result<PipelineOutcome> {
        self.transact(caller, "resolve_and_publish", |state, ctx| {
            let resolution = state.consensus.resolve(ctx, round, &mut state.events)?;
            let engine = ctx.with_caller(state.publisher.consensus_engine());
            let update = state
                .publisher
                .publish(&engine, resolution.value, nonce, &mut state.events)?;
            let rebase = state.apply_update(ctx.now, &update)?;
            Ok(PipelineOutcome {
                resolution: Some(resolution),
                update,
                rebase,
            })
        })
    }

    /// Publish a value directly as an authorized updater, then rebase
    pub fn publish_index(
        &self,
        caller: AccountId,
        value: IndexValue,
        nonce: u64,
    ) -> Result<PipelineOutcome> {
        self.transact(caller, "publish_index", |state, ctx| {
            let update = state.publisher.publish(ctx, value, nonce, &mut state.events)?;
            let rebase = state.apply_update(ctx.now, &update)?;
            Ok(PipelineOutcome {
                resolution: None,
                update,
                rebase,
            })
        })
    }

    // ---- staking ----

    pub fn stake(&self, caller: AccountId, amount: Balance) -> Result<StakeInfo> {
        self.transact(caller, "stake", |state, ctx| {
            state
                .staking
                .stake(ctx, &mut state.supply, amount, &mut state.events)
        })
    }

    pub fn unstake(&self, caller: AccountId, amount: Balance) -> Result<StakeInfo> {
        self.transact(caller, "unstake", |state, ctx| {
            state
                .staking
                .unstake(ctx, &mut state.supply, amount, &mut state.events)
        })
    }

    pub fn claim_reward(&self, caller: AccountId) -> Result<Balance> {
        self.transact(caller, "claim_reward", |state, ctx| {
            state
                .staking
                .claim_reward(ctx, &mut state.supply, &mut state.events)
        })
    }

    pub fn set_commission_rate(&self, caller: AccountId, rate_bps: BasisPoints) -> Result<()> {
        self.transact(caller, "set_commission_rate", |state, ctx| {
            state
                .staking
                .set_commission_rate(ctx, rate_bps, &mut state.events)
        })
    }

    pub fn delegate(&self, caller: AccountId, validator: AccountId, amount: Balance) -> Result<()> {
        self.transact(caller, "delegate", |state, ctx| {
            state
                .staking
                .delegate(ctx, &state.supply, validator, amount, &mut state.events)
        })
    }

    pub fn undelegate(&self, caller: AccountId) -> Result<()> {
        self.transact(caller, "undelegate", |state, ctx| {
            state
                .staking
                .undelegate(ctx, &state.supply, &mut state.events)
        })
    }

    pub fn claim_commission(&self, caller: AccountId) -> Result<Balance> {
        self.transact(caller, "claim_commission", |state, ctx| {
            state
                .staking
                .claim_commission(ctx, &mut state.supply, &mut state.events)
        })
    }

    // ---- tokens ----

    pub fn transfer(&self, caller: AccountId, to: AccountId, amount: Balance) -> Result<()> {
        self.transact(caller, "transfer", |state, ctx| {
            ctx.ensure_active()?;
            if amount == 0 {
                return Err(HalomError::InvalidAmount(amount));
            }
            state.supply.transfer(&ctx.caller, to, amount)?;
            state.events.emit(ProtocolEvent::Transferred {
                from: ctx.caller,
                to,
                amount,
            });
            Ok(())
        })
    }

    // ---- queries ----

    pub fn current_index(&self) -> IndexSnapshot {
        self.state.read().publisher.current()
    }

    pub fn effective_balance(&self, account: &AccountId) -> Balance {
        self.state.read().supply.effective_balance(account)
    }

    pub fn total_supply(&self) -> Balance {
        self.state.read().supply.total_supply()
    }

    pub fn multiplier(&self) -> u128 {
        self.state.read().supply.multiplier()
    }

    pub fn pending_reward(&self, account: &AccountId) -> Result<Balance> {
        let state = self.state.read();
        state.staking.pending_reward(account, &state.supply)
    }

    pub fn stake_info(&self, account: &AccountId) -> StakeInfo {
        let state = self.state.read();
        state.staking.stake_info(account, &state.supply)
    }

    pub fn round(&self, round: RoundId) -> Option<ConsensusRound> {
        self.state.read().consensus.round(round).cloned()
    }

    pub fn rebase_epoch(&self) -> u64 {
        self.state.read().rebase.epoch()
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> ProtocolState {
        self.state.read().clone()
    }

    /// Take the committed events, oldest first
    pub fn drain_events(&self) -> Vec<ProtocolEvent> {
        self.state.write().events.drain()
    }

    /// Committed state as pretty JSON
    pub fn export_state(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.state.read())
    }
}
