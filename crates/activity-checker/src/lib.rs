//! Verifies, through block-explorer transaction-list APIs alone,
//! whether a wallet address transacted on a chain during a campaign
//! month. Calendar months map to block ranges via a static registry;
//! each range is scanned in bounded-concurrency chunks with early exit
//! on the first evidence of activity, and resolutions are memoized in a
//! local TTL cache.

use std::path::PathBuf;

use alloy::primitives::Address;
use clap::Parser;

pub mod cache;
pub mod checker;
pub mod config;
pub mod errors;
pub mod explorer;
pub mod registry;
pub mod scanner;
pub mod strategy;

#[cfg(test)]
pub(crate) mod tests;

pub use cache::{ActivityCache, CacheObj, SqliteCache};
pub use checker::{ActivityChecker, CheckerErr};
pub use config::{Config, ConfigLock, ConfigWatcher};
pub use explorer::{ExplorerApi, ExplorerClient, ExplorerObj, ProbeOutcome};
pub use registry::{ChainConfig, ChainRegistry, Month, MonthConfig};
pub use strategy::{ScanStrategy, StrategyTable};

/// Current wall-clock time in epoch milliseconds, the cache stamp unit.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Command line arguments
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Wallet address to check
    #[clap(long, env = "CHECKER_ADDRESS")]
    pub address: Address,
    /// Chain slug; every active chain when omitted
    #[clap(long, env = "CHECKER_CHAIN")]
    pub chain: Option<String>,
    /// Single month to check; every configured month when omitted
    #[clap(long)]
    pub month: Option<Month>,
    /// Path to the TOML config file; built-in defaults when absent
    #[clap(long, env = "CHECKER_CONFIG", default_value = "checker.toml")]
    pub config_file: PathBuf,
    /// Cache database connection string
    #[clap(long, env = "CHECKER_DB_URL", default_value = "sqlite::memory:")]
    pub db_url: String,
    /// Drop cached results for the requested scope before checking
    #[clap(long)]
    pub clear_cache: bool,
    /// Emit logs as JSON
    #[clap(long, env)]
    pub log_json: bool,
}
