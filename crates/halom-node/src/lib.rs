//! # Halom Node
//!
//! Wires the oracle and economics engines into one atomic protocol runtime.
//!
//! - [`config`] - TOML configuration with per-section defaults
//! - [`genesis`] - initial index, allocations and protocol accounts
//! - [`runtime`] - clone-and-commit transactions over the protocol state
//! - [`telemetry`] - `tracing` subscriber setup

pub mod config;
pub mod genesis;
pub mod runtime;
pub mod telemetry;

pub use config::{LogFormat, LoggingConfig, ProtocolConfig};
pub use genesis::{GenesisAccounts, GenesisConfig, TokenAllocation};
pub use runtime::{PipelineOutcome, ProtocolRuntime, ProtocolState};
pub use telemetry::init_logging;
