//! Genesis state for Halom
//!
//! - Initial HOI value (1.0 unless configured)
//! - Token allocations credited before the first rebase
//! - Reward pool, reserve and consensus engine identities

use halom_core::error::{HalomError, Result};
use halom_core::types::{AccountId, Balance, IndexValue, Timestamp, INDEX_SCALE};
use serde::{Deserialize, Serialize};

/// Labels used to derive protocol accounts when none are configured
pub const POOL_ACCOUNT_LABEL: &str = "halom:reward-pool";
pub const RESERVE_ACCOUNT_LABEL: &str = "halom:reserve";
pub const CONSENSUS_ENGINE_LABEL: &str = "halom:consensus-engine";

/// Genesis configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Initial index, 1e9 == 1.0
    #[serde(default = "default_initial_index")]
    pub initial_index: u64,

    /// Reward pool account (hex); derived from a fixed label when absent
    #[serde(default)]
    pub pool_account: Option<String>,

    /// Account burned from on negative rebases (hex)
    #[serde(default)]
    pub reserve_account: Option<String>,

    /// Identity the consensus engine publishes under (hex)
    #[serde(default)]
    pub consensus_engine: Option<String>,

    /// Initial token distribution
    #[serde(default)]
    pub allocations: Vec<TokenAllocation>,
}

/// Token allocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAllocation {
    /// Account (hex, optional 0x prefix)
    pub address: String,
    /// Amount in base units (9 decimals); a string since TOML integers stop at i64
    pub amount: String,
    /// Description/purpose
    #[serde(default)]
    pub label: String,
}

fn default_initial_index() -> u64 {
    INDEX_SCALE as u64
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            initial_index: default_initial_index(),
            pool_account: None,
            reserve_account: None,
            consensus_engine: None,
            allocations: Vec::new(),
        }
    }
}

/// Protocol-owned accounts resolved from genesis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccounts {
    pub pool: AccountId,
    pub reserve: AccountId,
    pub consensus_engine: AccountId,
}

fn parse_account(field: &str, value: &Option<String>, label: &str) -> Result<AccountId> {
    match value {
        Some(hex) => AccountId::from_hex(hex)
            .map_err(|e| HalomError::InvalidConfig(format!("genesis.{}: {}", field, e))),
        None => Ok(AccountId::from_label(label)),
    }
}

impl GenesisConfig {
    pub fn initial_index(&self) -> IndexValue {
        self.initial_index as IndexValue
    }

    pub fn accounts(&self) -> Result<GenesisAccounts> {
        Ok(GenesisAccounts {
            pool: parse_account("pool_account", &self.pool_account, POOL_ACCOUNT_LABEL)?,
            reserve: parse_account("reserve_account", &self.reserve_account, RESERVE_ACCOUNT_LABEL)?,
            consensus_engine: parse_account(
                "consensus_engine",
                &self.consensus_engine,
                CONSENSUS_ENGINE_LABEL,
            )?,
        })
    }

    /// Allocations with parsed accounts and amounts
    pub fn balances(&self) -> Result<Vec<(AccountId, Balance)>> {
        self.allocations
            .iter()
            .map(|allocation| {
                let account = AccountId::from_hex(&allocation.address).map_err(|e| {
                    HalomError::InvalidConfig(format!(
                        "genesis allocation '{}': bad address: {}",
                        allocation.label, e
                    ))
                })?;
                let amount = allocation.amount.parse::<Balance>().map_err(|e| {
                    HalomError::InvalidConfig(format!(
                        "genesis allocation '{}': bad amount: {}",
                        allocation.label, e
                    ))
                })?;
                Ok((account, amount))
            })
            .collect()
    }

    pub fn total_allocation(&self) -> Result<Balance> {
        self.balances()?.iter().try_fold(0u128, |total, (_, amount)| {
            total
                .checked_add(*amount)
                .ok_or(HalomError::Overflow("genesis allocation"))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_index == 0 {
            return Err(HalomError::InvalidConfig(
                "genesis.initial_index must be positive".to_string(),
            ));
        }
        let accounts = self.accounts()?;
        if accounts.pool == accounts.reserve {
            return Err(HalomError::InvalidConfig(
                "genesis pool and reserve accounts must differ".to_string(),
            ));
        }
        self.total_allocation()?;
        Ok(())
    }

    /// BLAKE3 fingerprint of the genesis parameters
    pub fn genesis_hash(&self, timestamp: Timestamp) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"HALOM_GENESIS_V1");
        hasher.update(&timestamp.to_le_bytes());
        hasher.update(&self.initial_index.to_le_bytes());
        for allocation in &self.allocations {
            hasher.update(allocation.address.as_bytes());
            hasher.update(allocation.amount.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

/// Allocation for `account` of `amount` base units
pub fn allocation(account: AccountId, amount: Balance, label: &str) -> TokenAllocation {
    TokenAllocation {
        address: format!("0x{}", account.to_hex()),
        amount: amount.to_string(),
        label: label.to_string(),
    }
}

/// Development genesis: two funded users and a funded reserve
pub fn generate_dev_genesis() -> GenesisConfig {
    use halom_core::types::ONE_HOM;

    GenesisConfig {
        allocations: vec![
            allocation(AccountId::from_label("alice"), 1_000_000 * ONE_HOM, "Alice"),
            allocation(AccountId::from_label("bob"), 1_000_000 * ONE_HOM, "Bob"),
            allocation(
                AccountId::from_label(RESERVE_ACCOUNT_LABEL),
                500_000 * ONE_HOM,
                "Rebase reserve",
            ),
        ],
        ..GenesisConfig::default()
    }
}
