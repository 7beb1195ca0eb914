//! # Halom Oracle
//!
//! Turns independent HOI reporter submissions into one nonce-gated index
//! update.
//!
//! ```text
//!  reporter A ─┐
//!  reporter B ─┼─► FeedLedger ─► ConsensusEngine ─► IndexPublisher ─► (old, new)
//!  reporter C ─┘     round N       median/fallback      nonce == n
//! ```
//!
//! - [`ledger`] - one submission per reporter per round, bounded windows
//! - [`consensus`] - median with deviation filtering, weighted fallback
//! - [`reputation`] - reporter scores used as fallback confidence
//! - [`publisher`] - strict-nonce index singleton

pub mod consensus;
pub mod ledger;
pub mod publisher;
pub mod reputation;

pub use consensus::{aggregate, median, weighted_mean, Aggregate, ConsensusEngine, OracleConfig};
pub use ledger::{ConsensusRound, FeedLedger, FeedSubmission, Resolution, RoundState};
pub use publisher::{IndexPublisher, IndexUpdate};
pub use reputation::{ReputationBook, ReputationScore};
