//! # Index Publisher
//!
//! Holds the last accepted HOI value and the anti-replay nonce.
//!
//! The nonce is the only replay guard: a publish must carry exactly the
//! current nonce, and every accepted publish advances it by one. A stale or
//! repeated update therefore always fails with `InvalidNonce` instead of
//! re-applying an old value.

use halom_core::access::{CallContext, Capability};
use halom_core::error::{HalomError, Result};
use halom_core::events::{EventLog, ProtocolEvent};
use halom_core::types::{AccountId, IndexSnapshot, IndexValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

/// Accepted updates kept for inspection
pub const HISTORY_LEN: usize = 32;

/// One accepted index update, handed to the rebase engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUpdate {
    pub old_value: IndexValue,
    pub new_value: IndexValue,
    /// Nonce the update was accepted under
    pub nonce: u64,
    pub published_at: Timestamp,
    pub publisher: AccountId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexPublisher {
    current: IndexSnapshot,
    /// Identity the consensus engine publishes under
    consensus_engine: AccountId,
    history: VecDeque<IndexUpdate>,
}

impl IndexPublisher {
    /// Genesis index; nonce starts at zero
    pub fn new(initial_value: IndexValue, consensus_engine: AccountId, genesis_time: Timestamp) -> Self {
        Self {
            current: IndexSnapshot {
                value: initial_value,
                nonce: 0,
                updated_at: genesis_time,
            },
            consensus_engine,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn current(&self) -> IndexSnapshot {
        self.current
    }

    pub fn consensus_engine(&self) -> AccountId {
        self.consensus_engine
    }

    pub fn history(&self) -> impl Iterator<Item = &IndexUpdate> {
        self.history.iter()
    }

    fn is_authorized(&self, ctx: &CallContext<'_>) -> bool {
        ctx.caller == self.consensus_engine || ctx.require(Capability::PublishIndex).is_ok()
    }

    /// Accept `new_value` if `supplied_nonce` matches the current nonce
    pub fn publish(
        &mut self,
        ctx: &CallContext<'_>,
        new_value: IndexValue,
        supplied_nonce: u64,
        events: &mut EventLog,
    ) -> Result<IndexUpdate> {
        ctx.ensure_active()?;
        if !self.is_authorized(ctx) {
            warn!("Index publish rejected: {} is not an authorized updater", ctx.caller);
            return Err(HalomError::Unauthorized(ctx.caller));
        }
        if supplied_nonce != self.current.nonce {
            warn!(
                "Index publish rejected: nonce {} does not match {}",
                supplied_nonce, self.current.nonce
            );
            return Err(HalomError::InvalidNonce {
                expected: self.current.nonce,
                supplied: supplied_nonce,
            });
        }
        if new_value == 0 {
            return Err(HalomError::InvalidIndexValue(new_value));
        }

        let next_nonce = self
            .current
            .nonce
            .checked_add(1)
            .ok_or(HalomError::Overflow("index nonce"))?;

        let update = IndexUpdate {
            old_value: self.current.value,
            new_value,
            nonce: supplied_nonce,
            published_at: ctx.now,
            publisher: ctx.caller,
        };

        self.current = IndexSnapshot {
            value: new_value,
            nonce: next_nonce,
            updated_at: ctx.now,
        };
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(update);

        info!(
            "Index published: {} -> {} (nonce {})",
            update.old_value, update.new_value, update.nonce
        );
        events.emit(ProtocolEvent::IndexPublished {
            value: new_value,
            nonce: update.nonce,
        });
        Ok(update)
    }
}
