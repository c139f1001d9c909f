//! Configuration for the escrow ledger

use crate::application::ledger::RandomVirtualPorts;
use crate::application::orders::OrderSettings;
use crate::domain::account::Account;
use crate::domain::house::House;
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the RocksDB directory.
pub const ENV_DB_PATH: &str = "ESCROW_LEDGER_DB_PATH";
/// Environment variable holding a `tracing` filter directive.
pub const ENV_LOG: &str = "ESCROW_LEDGER_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RocksDB directory; the in-memory store is used when unset
    pub db_path: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is not set
    pub log_filter: String,

    pub virtual_port: VirtualPortConfig,

    pub orders: OrderSettings,

    /// Accounts served by the built-in account directory
    pub accounts: Vec<Account>,

    /// Listings served by the built-in house catalog
    pub houses: Vec<House>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            log_filter: "warn".to_string(),
            virtual_port: VirtualPortConfig::default(),
            orders: OrderSettings::default(),
            accounts: Vec::new(),
            houses: Vec::new(),
        }
    }
}

/// Virtual port token shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualPortConfig {
    pub prefix: String,
    pub length: usize,
}

impl Default for VirtualPortConfig {
    fn default() -> Self {
        Self {
            prefix: "VP-".to_string(),
            length: 12,
        }
    }
}

impl VirtualPortConfig {
    pub fn generator(&self) -> RandomVirtualPorts {
        RandomVirtualPorts::new(self.prefix.clone(), self.length)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        Ok(config)
    }

    /// Overrides file values with `ESCROW_LEDGER_*` variables that are set
    pub fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var(ENV_DB_PATH) {
            self.db_path = Some(PathBuf::from(db_path));
        }
        if let Ok(filter) = std::env::var(ENV_LOG) {
            self.log_filter = filter;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.virtual_port.length == 0 {
            return Err(LedgerError::Config(
                "virtual_port.length must be at least 1".to_string(),
            ));
        }
        let rate = self.orders.reservation_deposit_rate;
        if rate <= rust_decimal::Decimal::ZERO || rate > rust_decimal::Decimal::ONE {
            return Err(LedgerError::Config(format!(
                "orders.reservation_deposit_rate must be in (0, 1], got {rate}"
            )));
        }
        Ok(())
    }
}
