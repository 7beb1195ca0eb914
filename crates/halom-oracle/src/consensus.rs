//! # Consensus Engine
//!
//! Resolves a consensus round into a single HOI value.
//!
//! ## Resolution Rules
//!
//! | In-window submissions | Result |
//! |-----------------------|--------|
//! | ≥ `min_consensus_feeds` | median, outliers beyond `max_deviation_bps` noted |
//! | 2 .. `min_consensus_feeds` | confidence-weighted mean (fallback) |
//! | < 2 | `InsufficientFeeds`, nothing downstream runs |
//!
//! A round becomes resolvable once it holds `min_valid_feeds` submissions or
//! its window has elapsed.

use crate::ledger::{ConsensusRound, FeedLedger, FeedSubmission, Resolution};
use crate::reputation::ReputationBook;
use halom_core::access::{CallContext, Capability};
use halom_core::error::{HalomError, Result};
use halom_core::events::{EventLog, ProtocolEvent};
use halom_core::math::mul_div;
use halom_core::types::{AccountId, IndexValue, ResolutionMethod, RoundId, Timestamp, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Fewest submissions any resolution can use
pub const MIN_FALLBACK_FEEDS: usize = 2;

/// Upper bound for feed-count parameters
pub const MAX_FEED_PARAMETER: usize = 10;

/// Oracle configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Length of a round's submission window
    #[serde(default = "default_submission_window")]
    pub submission_window_secs: u64,

    /// Submissions after which a round may resolve before its window ends
    #[serde(default = "default_min_feeds")]
    pub min_valid_feeds: usize,

    /// Submissions required for a median resolution
    #[serde(default = "default_min_feeds")]
    pub min_consensus_feeds: usize,

    /// Deviation from the median above which a submission is an outlier
    #[serde(default = "default_max_deviation_bps")]
    pub max_deviation_bps: u32,

    /// A round stops accepting submissions once this many are recorded
    #[serde(default = "default_max_submissions")]
    pub max_submissions_per_round: usize,

    /// Resolved rounds kept in the ledger
    #[serde(default = "default_round_retention")]
    pub round_retention: usize,
}

fn default_submission_window() -> u64 {
    300
}

fn default_min_feeds() -> usize {
    3
}

fn default_max_deviation_bps() -> u32 {
    500
}

fn default_max_submissions() -> usize {
    MAX_FEED_PARAMETER
}

fn default_round_retention() -> usize {
    64
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            submission_window_secs: default_submission_window(),
            min_valid_feeds: default_min_feeds(),
            min_consensus_feeds: default_min_feeds(),
            max_deviation_bps: default_max_deviation_bps(),
            max_submissions_per_round: default_max_submissions(),
            round_retention: default_round_retention(),
        }
    }
}

impl OracleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.submission_window_secs == 0 {
            return Err(HalomError::InvalidConfig(
                "oracle.submission_window_secs must be positive".into(),
            ));
        }
        for (name, value) in [
            ("min_valid_feeds", self.min_valid_feeds),
            ("min_consensus_feeds", self.min_consensus_feeds),
        ] {
            if value == 0 || value > MAX_FEED_PARAMETER {
                return Err(HalomError::InvalidConfig(format!(
                    "oracle.{name} must be within 1..={MAX_FEED_PARAMETER}"
                )));
            }
        }
        if self.max_deviation_bps == 0 || self.max_deviation_bps as u128 > BPS_DENOMINATOR {
            return Err(HalomError::InvalidConfig(
                "oracle.max_deviation_bps must be within 1..=10000".into(),
            ));
        }
        if self.max_submissions_per_round < self.min_consensus_feeds.max(MIN_FALLBACK_FEEDS) {
            return Err(HalomError::InvalidConfig(
                "oracle.max_submissions_per_round must allow a median round".into(),
            ));
        }
        if self.round_retention == 0 {
            return Err(HalomError::InvalidConfig(
                "oracle.round_retention must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregated value before it is stamped onto a round
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aggregate {
    pub value: IndexValue,
    pub method: ResolutionMethod,
    pub outliers: Vec<AccountId>,
}

/// Median; the floor mean of the two middle values for even counts
pub fn median(values: &[IndexValue]) -> Option<IndexValue> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        let (a, b) = (sorted[mid - 1], sorted[mid]);
        Some(a / 2 + b / 2 + (a % 2 + b % 2) / 2)
    }
}

/// Confidence-weighted mean; equal weights when every confidence is zero
pub fn weighted_mean(samples: &[(IndexValue, u32)]) -> Result<Option<IndexValue>> {
    if samples.is_empty() {
        return Ok(None);
    }
    let total_weight: u128 = samples.iter().map(|(_, w)| *w as u128).sum();
    let equal = total_weight == 0;

    let mut weighted_sum: u128 = 0;
    for (value, weight) in samples {
        let weight = if equal { 1 } else { *weight as u128 };
        let term = value
            .checked_mul(weight)
            .ok_or(HalomError::Overflow("weighted_mean"))?;
        weighted_sum = weighted_sum
            .checked_add(term)
            .ok_or(HalomError::Overflow("weighted_mean"))?;
    }
    let denominator = if equal { samples.len() as u128 } else { total_weight };
    Ok(Some(weighted_sum / denominator))
}

/// |value - reference| in basis points of `reference`
pub fn deviation_bps(value: IndexValue, reference: IndexValue) -> Result<u128> {
    if reference == 0 {
        return Ok(if value == 0 { 0 } else { u128::MAX });
    }
    mul_div(value.abs_diff(reference), BPS_DENOMINATOR, reference)
}

/// Pure resolution over a set of in-window submissions
pub fn aggregate(submissions: &[&FeedSubmission], config: &OracleConfig) -> Result<Aggregate> {
    let count = submissions.len();
    if count < MIN_FALLBACK_FEEDS {
        return Err(HalomError::InsufficientFeeds {
            required: MIN_FALLBACK_FEEDS,
            available: count,
        });
    }

    if count >= config.min_consensus_feeds {
        let values: Vec<IndexValue> = submissions.iter().map(|s| s.value).collect();
        let value = median(&values).ok_or(HalomError::InsufficientFeeds {
            required: MIN_FALLBACK_FEEDS,
            available: 0,
        })?;

        let mut outliers = Vec::new();
        for submission in submissions {
            if deviation_bps(submission.value, value)? > config.max_deviation_bps as u128 {
                outliers.push(submission.reporter);
            }
        }

        return Ok(Aggregate {
            value,
            method: ResolutionMethod::Median,
            outliers,
        });
    }

    let samples: Vec<(IndexValue, u32)> = submissions
        .iter()
        .map(|s| (s.value, s.confidence))
        .collect();
    let value = weighted_mean(&samples)?.ok_or(HalomError::InsufficientFeeds {
        required: MIN_FALLBACK_FEEDS,
        available: 0,
    })?;

    Ok(Aggregate {
        value,
        method: ResolutionMethod::Fallback,
        outliers: Vec::new(),
    })
}

/// Consensus engine: submission intake, round resolution, reporter reputation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusEngine {
    config: OracleConfig,
    ledger: FeedLedger,
    reputation: ReputationBook,
}

impl ConsensusEngine {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            config,
            ledger: FeedLedger::new(),
            reputation: ReputationBook::new(),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn ledger(&self) -> &FeedLedger {
        &self.ledger
    }

    pub fn reputation(&self) -> &ReputationBook {
        &self.reputation
    }

    pub fn round(&self, round: RoundId) -> Option<&ConsensusRound> {
        self.ledger.round(round)
    }

    /// Open the next round; returns when its window closes
    pub fn open_round(
        &mut self,
        ctx: &CallContext<'_>,
        round: RoundId,
        events: &mut EventLog,
    ) -> Result<Timestamp> {
        ctx.ensure_active()?;
        ctx.require(Capability::ManageRounds)?;

        let closes_at = self
            .ledger
            .open_round(
                round,
                ctx.now,
                self.config.submission_window_secs,
                self.config.max_submissions_per_round,
            )?
            .closes_at;
        self.ledger.prune(self.config.round_retention);

        debug!("Opened round {} closing at {}", round, closes_at);
        events.emit(ProtocolEvent::RoundOpened { round, closes_at });
        Ok(closes_at)
    }

    /// Record the caller's value for `round`
    pub fn submit(
        &mut self,
        ctx: &CallContext<'_>,
        round: RoundId,
        value: IndexValue,
        events: &mut EventLog,
    ) -> Result<FeedSubmission> {
        ctx.ensure_active()?;
        ctx.require(Capability::SubmitFeed)?;
        if value == 0 {
            return Err(HalomError::InvalidIndexValue(value));
        }

        let confidence = self.reputation.score(&ctx.caller);
        let submission = self
            .ledger
            .record(round, ctx.caller, value, confidence, ctx.now)?
            .clone();

        debug!(
            "Round {}: reporter {} submitted {} (confidence {})",
            round, ctx.caller, value, confidence
        );
        events.emit(ProtocolEvent::FeedSubmitted {
            round,
            reporter: ctx.caller,
            value,
        });
        Ok(submission)
    }

    /// Resolve `round` into a single value
    pub fn resolve(
        &mut self,
        ctx: &CallContext<'_>,
        round: RoundId,
        events: &mut EventLog,
    ) -> Result<Resolution> {
        ctx.ensure_active()?;

        let entry = self
            .ledger
            .round(round)
            .ok_or(HalomError::RoundNotFound(round))?;
        if entry.resolution().is_some() {
            return Err(HalomError::RoundAlreadyResolved(round));
        }

        let counted: Vec<&FeedSubmission> = entry.in_window().collect();
        if counted.len() < self.config.min_valid_feeds && !entry.window_elapsed(ctx.now) {
            return Err(HalomError::ResolutionNotReady {
                round,
                submissions: counted.len(),
                closes_at: entry.closes_at,
            });
        }

        let aggregate = match aggregate(&counted, &self.config) {
            Ok(aggregate) => aggregate,
            Err(e) => {
                warn!("Round {} failed to resolve: {}", round, e);
                return Err(e);
            }
        };

        let resolution = Resolution {
            round,
            value: aggregate.value,
            method: aggregate.method,
            resolved_at: ctx.now,
            submissions_used: counted.len(),
            outliers: aggregate.outliers,
        };

        if resolution.method == ResolutionMethod::Median {
            let reporters: Vec<AccountId> = counted.iter().map(|s| s.reporter).collect();
            for reporter in reporters {
                if resolution.outliers.contains(&reporter) {
                    let score = self.reputation.penalize(reporter);
                    warn!(
                        "Round {}: reporter {} deviated beyond {} bps (reputation {})",
                        round, reporter, self.config.max_deviation_bps, score
                    );
                } else {
                    self.reputation.reward(reporter);
                }
            }
        } else {
            warn!(
                "Round {} resolved by fallback with {} submissions",
                round, resolution.submissions_used
            );
        }

        self.ledger.mark_resolved(resolution.clone())?;

        info!(
            "Round {} resolved to {} by {}",
            round, resolution.value, resolution.method
        );
        events.emit(ProtocolEvent::ConsensusResolved {
            round,
            value: resolution.value,
            method: resolution.method,
        });
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halom_core::access::{CapabilityTable, EmergencySwitch};
    use proptest::prelude::*;

    struct Harness {
        table: CapabilityTable,
        switch: EmergencySwitch,
        admin: AccountId,
        reporters: Vec<AccountId>,
    }

    impl Harness {
        fn new(reporters: usize) -> Self {
            let table = CapabilityTable::new();
            let admin = AccountId::from_label("admin");
            table.grant(admin, Capability::ManageRounds, 0);
            let reporters: Vec<AccountId> = (0..reporters)
                .map(|i| AccountId::from_label(&format!("reporter-{i}")))
                .collect();
            for r in &reporters {
                table.grant(*r, Capability::SubmitFeed, 0);
            }
            Self {
                table,
                switch: EmergencySwitch::new(),
                admin,
                reporters,
            }
        }

        fn ctx(&self, caller: AccountId, now: Timestamp) -> CallContext<'_> {
            CallContext::new(caller, now, &self.table, &self.switch)
        }
    }

    fn run_round(values: &[IndexValue]) -> (ConsensusEngine, Result<Resolution>) {
        let h = Harness::new(values.len());
        let mut engine = ConsensusEngine::new(OracleConfig::default());
        let mut events = EventLog::new();
        engine.open_round(&h.ctx(h.admin, 0), 5, &mut events).unwrap();
        for (i, value) in values.iter().enumerate() {
            engine
                .submit(&h.ctx(h.reporters[i], 10 + i as i64), 5, *value, &mut events)
                .unwrap();
        }
        let result = engine.resolve(&h.ctx(h.admin, 400), 5, &mut events);
        (engine, result)
    }

    #[test]
    fn test_happy_path_median() {
        let (_, result) = run_round(&[100, 102, 98]);
        let resolution = result.unwrap();
        assert_eq!(resolution.value, 100);
        assert_eq!(resolution.method, ResolutionMethod::Median);
        assert!(resolution.outliers.is_empty());
    }

    #[test]
    fn test_fallback_equal_confidence() {
        let (_, result) = run_round(&[100, 110]);
        let resolution = result.unwrap();
        assert_eq!(resolution.value, 105);
        assert_eq!(resolution.method, ResolutionMethod::Fallback);
    }

    #[test]
    fn test_single_feed_is_insufficient() {
        let (engine, result) = run_round(&[100]);
        assert_eq!(
            result.unwrap_err(),
            HalomError::InsufficientFeeds {
                required: 2,
                available: 1
            }
        );
        assert!(engine.round(5).unwrap().resolution().is_none());
    }

    #[test]
    fn test_outlier_flagged_and_penalized() {
        let (engine, result) = run_round(&[1_000, 1_010, 990, 1_200]);
        let resolution = result.unwrap();
        // middles 1000 and 1010
        assert_eq!(resolution.value, 1_005);
        assert_eq!(resolution.outliers.len(), 1);

        let outlier = resolution.outliers[0];
        assert_eq!(engine.reputation().score(&outlier), 95);
    }

    #[test]
    fn test_not_ready_before_threshold() {
        let h = Harness::new(2);
        let mut engine = ConsensusEngine::new(OracleConfig::default());
        let mut events = EventLog::new();
        engine.open_round(&h.ctx(h.admin, 0), 1, &mut events).unwrap();
        engine.submit(&h.ctx(h.reporters[0], 1), 1, 100, &mut events).unwrap();
        engine.submit(&h.ctx(h.reporters[1], 2), 1, 110, &mut events).unwrap();

        assert!(matches!(
            engine.resolve(&h.ctx(h.admin, 10), 1, &mut events),
            Err(HalomError::ResolutionNotReady { submissions: 2, .. })
        ));
        assert!(engine.resolve(&h.ctx(h.admin, 300), 1, &mut events).is_ok());
        assert_eq!(
            engine.resolve(&h.ctx(h.admin, 301), 1, &mut events).unwrap_err(),
            HalomError::RoundAlreadyResolved(1)
        );
    }

    #[test]
    fn test_unauthorized_reporter() {
        let h = Harness::new(1);
        let mut engine = ConsensusEngine::new(OracleConfig::default());
        let mut events = EventLog::new();
        engine.open_round(&h.ctx(h.admin, 0), 1, &mut events).unwrap();

        let stranger = AccountId::from_label("stranger");
        assert_eq!(
            engine.submit(&h.ctx(stranger, 1), 1, 100, &mut events).unwrap_err(),
            HalomError::Unauthorized(stranger)
        );

        h.table.revoke(&h.reporters[0], Capability::SubmitFeed, 5);
        assert!(engine.submit(&h.ctx(h.reporters[0], 6), 1, 100, &mut events).is_err());
    }

    #[test]
    fn test_paused_rejects_submissions() {
        let h = Harness::new(1);
        let mut engine = ConsensusEngine::new(OracleConfig::default());
        let mut events = EventLog::new();
        engine.open_round(&h.ctx(h.admin, 0), 1, &mut events).unwrap();

        h.switch.pause();
        assert_eq!(
            engine.submit(&h.ctx(h.reporters[0], 1), 1, 100, &mut events).unwrap_err(),
            HalomError::ContractPaused
        );
    }

    #[test]
    fn test_reputation_weights_fallback() {
        let mut config = OracleConfig::default();
        config.min_consensus_feeds = 3;
        let a = FeedSubmission::new(1, AccountId::new([1; 32]), 100, 100, 0);
        let b = FeedSubmission::new(1, AccountId::new([2; 32]), 200, 25, 0);
        let agg = aggregate(&[&a, &b], &config).unwrap();
        // (100*100 + 200*25) / 125
        assert_eq!(agg.value, 120);
        assert_eq!(agg.method, ResolutionMethod::Fallback);
    }

    #[test]
    fn test_zero_confidence_falls_back_to_equal_weights() {
        assert_eq!(weighted_mean(&[(100, 0), (110, 0)]).unwrap(), Some(105));
    }

    #[test]
    fn test_config_validation() {
        assert!(OracleConfig::default().validate().is_ok());

        let mut config = OracleConfig::default();
        config.min_valid_feeds = 11;
        assert!(config.validate().is_err());

        let mut config = OracleConfig::default();
        config.max_deviation_bps = 0;
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn median_of_odd_set_is_middle(values in proptest::collection::vec(1u128..1_000_000_000_000, 1..25)) {
            let mut values = values;
            if values.len() % 2 == 0 {
                values.pop();
            }
            let result = median(&values).unwrap();
            let mut sorted = values.clone();
            sorted.sort_unstable();
            prop_assert_eq!(result, sorted[sorted.len() / 2]);
        }

        #[test]
        fn median_of_even_set_is_mean_of_middles(values in proptest::collection::vec(1u128..1_000_000_000_000, 1..12)) {
            let mut doubled = values.clone();
            doubled.extend(values.iter().map(|v| v + 7));
            let result = median(&doubled).unwrap();
            let mut sorted = doubled.clone();
            sorted.sort_unstable();
            let mid = sorted.len() / 2;
            prop_assert_eq!(result, (sorted[mid - 1] + sorted[mid]) / 2);
        }
    }
}
