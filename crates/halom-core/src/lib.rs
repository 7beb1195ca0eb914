//! # Halom Core
//!
//! Shared vocabulary for the Halom index-rebase protocol.
//!
//! - `AccountId`, fixed-point scales and amount aliases
//! - `HalomError` with stable codes and retry classification
//! - `Capability` checks and the emergency pause, injected into every engine
//! - `ProtocolEvent`, buffered per call and published on commit
//! - Deterministic integer math (`mul_div`, `isqrt`)
//!
//! ## Pipeline
//!
//! ```text
//!  reporters ──► FeedLedger ──► ConsensusEngine ──► IndexPublisher
//!                                                      │ (old, new)
//!                                                      ▼
//!                 StakingPool ◄── rewards ──────── RebaseEngine
//! ```

pub mod access;
pub mod clock;
pub mod error;
pub mod events;
pub mod math;
pub mod types;

pub use access::*;
pub use clock::*;
pub use error::*;
pub use events::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::{AccessControl, CallContext, Capability, PauseGuard};
    pub use crate::clock::Clock;
    pub use crate::error::{ErrorKind, HalomError, Result};
    pub use crate::events::{EventLog, ProtocolEvent};
    pub use crate::math::{apply_bps, isqrt, mul_div};
    pub use crate::types::*;
}
