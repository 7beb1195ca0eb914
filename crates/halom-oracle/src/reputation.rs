//! Reporter reputation
//!
//! Reporters start at full reputation. A median round rewards every reporter
//! inside the deviation band and penalises every outlier. The score doubles as
//! the confidence weight of the reporter's next submissions.

use halom_core::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reputation score (0-100)
pub type ReputationScore = u32;

pub const MAX_REPUTATION: ReputationScore = 100;

/// Score of a reporter never seen before
pub const INITIAL_REPUTATION: ReputationScore = 100;

/// Gain for a submission inside the deviation band
pub const REPUTATION_REWARD: ReputationScore = 1;

/// Loss for an outlier submission
pub const REPUTATION_PENALTY: ReputationScore = 5;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReputationBook {
    scores: HashMap<AccountId, ReputationScore>,
}

impl ReputationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, reporter: &AccountId) -> ReputationScore {
        self.scores
            .get(reporter)
            .copied()
            .unwrap_or(INITIAL_REPUTATION)
    }

    pub fn reward(&mut self, reporter: AccountId) -> ReputationScore {
        let score = (self.score(&reporter) + REPUTATION_REWARD).min(MAX_REPUTATION);
        self.scores.insert(reporter, score);
        score
    }

    pub fn penalize(&mut self, reporter: AccountId) -> ReputationScore {
        let score = self.score(&reporter).saturating_sub(REPUTATION_PENALTY);
        self.scores.insert(reporter, score);
        score
    }

    /// Reporters with a tracked (non-default) score
    pub fn tracked(&self) -> usize {
        self.scores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reputation_bounds() {
        let mut book = ReputationBook::new();
        let reporter = AccountId::from_label("r1");

        assert_eq!(book.score(&reporter), INITIAL_REPUTATION);
        assert_eq!(book.reward(reporter), MAX_REPUTATION);

        for _ in 0..30 {
            book.penalize(reporter);
        }
        assert_eq!(book.score(&reporter), 0);

        assert_eq!(book.reward(reporter), 1);
        assert_eq!(book.tracked(), 1);
    }
}
