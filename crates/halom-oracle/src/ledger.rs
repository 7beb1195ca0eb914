//! # Feed Submission Ledger
//!
//! Records one HOI value per reporter per round.
//!
//! ## Round Lifecycle
//!
//! ```text
//! open_round ──► Open ──(window elapsed | round full)──► Closed
//!                  │                                       │
//!                  └──────────────── resolve ──────────────┴──► Resolved
//! ```
//!
//! The ledger only enforces bookkeeping rules (one submission per reporter,
//! in-window, bounded size). Authorization is checked by the consensus engine.

use halom_core::error::{HalomError, Result};
use halom_core::types::{AccountId, IndexValue, ResolutionMethod, RoundId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single reporter value, immutable once recorded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSubmission {
    /// BLAKE3(round || reporter || value || submitted_at)
    pub id: [u8; 32],
    pub round: RoundId,
    pub reporter: AccountId,
    pub value: IndexValue,
    /// Weight used by the fallback mean
    pub confidence: u32,
    pub submitted_at: Timestamp,
}

impl FeedSubmission {
    pub fn new(
        round: RoundId,
        reporter: AccountId,
        value: IndexValue,
        confidence: u32,
        submitted_at: Timestamp,
    ) -> Self {
        let id = Self::generate_id(round, &reporter, value, submitted_at);
        Self {
            id,
            round,
            reporter,
            value,
            confidence,
            submitted_at,
        }
    }

    fn generate_id(round: RoundId, reporter: &AccountId, value: IndexValue, at: Timestamp) -> [u8; 32] {
        let mut data = Vec::with_capacity(8 + 32 + 16 + 8);
        data.extend_from_slice(&round.to_le_bytes());
        data.extend_from_slice(reporter.as_bytes());
        data.extend_from_slice(&value.to_le_bytes());
        data.extend_from_slice(&at.to_le_bytes());
        *blake3::hash(&data).as_bytes()
    }
}

/// Outcome of a resolved round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub round: RoundId,
    pub value: IndexValue,
    pub method: ResolutionMethod,
    pub resolved_at: Timestamp,
    /// Number of in-window submissions considered
    pub submissions_used: usize,
    /// Reporters whose value deviated beyond the bound (median rounds only)
    pub outliers: Vec<AccountId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Open,
    Closed,
    Resolved,
}

/// Submission window for one round
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusRound {
    pub id: RoundId,
    pub opened_at: Timestamp,
    pub closes_at: Timestamp,
    pub max_submissions: usize,
    submissions: Vec<FeedSubmission>,
    resolution: Option<Resolution>,
}

impl ConsensusRound {
    fn new(id: RoundId, opened_at: Timestamp, closes_at: Timestamp, max_submissions: usize) -> Self {
        Self {
            id,
            opened_at,
            closes_at,
            max_submissions,
            submissions: Vec::new(),
            resolution: None,
        }
    }

    pub fn state(&self, now: Timestamp) -> RoundState {
        if self.resolution.is_some() {
            RoundState::Resolved
        } else if now >= self.closes_at || self.submissions.len() >= self.max_submissions {
            RoundState::Closed
        } else {
            RoundState::Open
        }
    }

    pub fn window_elapsed(&self, now: Timestamp) -> bool {
        now >= self.closes_at
    }

    pub fn submissions(&self) -> &[FeedSubmission] {
        &self.submissions
    }

    /// Submissions recorded before the window closed
    pub fn in_window(&self) -> impl Iterator<Item = &FeedSubmission> {
        let closes_at = self.closes_at;
        self.submissions
            .iter()
            .filter(move |s| s.submitted_at < closes_at)
    }

    pub fn has_submitted(&self, reporter: &AccountId) -> bool {
        self.submissions.iter().any(|s| &s.reporter == reporter)
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }
}

/// Round-indexed store of feed submissions
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeedLedger {
    rounds: BTreeMap<RoundId, ConsensusRound>,
    latest_round: Option<RoundId>,
}

impl FeedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a round whose window is `[now, now + window_secs)`
    pub fn open_round(
        &mut self,
        round: RoundId,
        now: Timestamp,
        window_secs: u64,
        max_submissions: usize,
    ) -> Result<&ConsensusRound> {
        if let Some(latest) = self.latest_round {
            if round <= latest {
                return Err(HalomError::StaleRound {
                    requested: round,
                    latest,
                });
            }
        }

        let closes_at = now.saturating_add(window_secs as i64);
        self.latest_round = Some(round);
        Ok(self
            .rounds
            .entry(round)
            .or_insert_with(|| ConsensusRound::new(round, now, closes_at, max_submissions)))
    }

    /// Record a submission; duplicates and late arrivals are rejected
    pub fn record(
        &mut self,
        round: RoundId,
        reporter: AccountId,
        value: IndexValue,
        confidence: u32,
        now: Timestamp,
    ) -> Result<&FeedSubmission> {
        let entry = self
            .rounds
            .get_mut(&round)
            .ok_or(HalomError::RoundNotFound(round))?;

        if entry.has_submitted(&reporter) {
            return Err(HalomError::DuplicateSubmission { round, reporter });
        }
        if entry.state(now) != RoundState::Open {
            return Err(HalomError::RoundClosed(round));
        }

        let slot = entry.submissions.len();
        entry
            .submissions
            .push(FeedSubmission::new(round, reporter, value, confidence, now));
        Ok(&entry.submissions[slot])
    }

    pub fn mark_resolved(&mut self, resolution: Resolution) -> Result<()> {
        let entry = self
            .rounds
            .get_mut(&resolution.round)
            .ok_or(HalomError::RoundNotFound(resolution.round))?;
        if entry.resolution.is_some() {
            return Err(HalomError::RoundAlreadyResolved(resolution.round));
        }
        entry.resolution = Some(resolution);
        Ok(())
    }

    pub fn round(&self, round: RoundId) -> Option<&ConsensusRound> {
        self.rounds.get(&round)
    }

    pub fn latest_round(&self) -> Option<RoundId> {
        self.latest_round
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Keep only the newest `keep` rounds
    pub fn prune(&mut self, keep: usize) {
        while self.rounds.len() > keep {
            let oldest = match self.rounds.keys().next() {
                Some(id) => *id,
                None => break,
            };
            self.rounds.remove(&oldest);
        }
    }
}
