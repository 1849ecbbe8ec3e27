use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use thiserror::Error;

use crate::cache::{ActivityCache, CacheObj, SqliteCache};
use crate::config::ConfigLock;
use crate::errors::{impl_coded_debug, CodedError};
use crate::explorer::{ExplorerClient, ExplorerObj};
use crate::registry::{ChainConfig, ChainRegistry, Month, MonthConfig};
use crate::scanner;
use crate::strategy::{StrategyTable, TipCache};

/// Configuration mistakes are the one hard error in this subsystem;
/// transport, parse and storage failures are all absorbed downstream.
#[derive(Error)]
pub enum CheckerErr {
    #[error("{code} Unknown chain: {0}", code = self.code())]
    UnknownChain(String),

    #[error("{code} No {1} config for chain {0}", code = self.code())]
    UnknownMonth(String, Month),
}

impl_coded_debug!(CheckerErr);

impl CodedError for CheckerErr {
    fn code(&self) -> &str {
        match self {
            CheckerErr::UnknownChain(_) => "[AC-CHK-401]",
            CheckerErr::UnknownMonth(_, _) => "[AC-CHK-402]",
        }
    }
}

/// Month orchestrator: cache lookup, strategy selection, chunked scan,
/// cache write-back. One instance serves any number of checks.
pub struct ActivityChecker {
    registry: Arc<ChainRegistry>,
    cache: CacheObj,
    explorer: ExplorerObj,
    strategies: StrategyTable,
    /// One latest-block cache per chain that needs tip resolution.
    tips: HashMap<String, TipCache>,
}

impl ActivityChecker {
    pub fn new(
        registry: Arc<ChainRegistry>,
        cache: CacheObj,
        explorer: ExplorerObj,
        strategies: StrategyTable,
        tip_ttl: Duration,
    ) -> Self {
        let tips = strategies
            .tip_resolved_chains()
            .map(|slug| (slug.to_string(), TipCache::new(tip_ttl)))
            .collect();
        Self { registry, cache, explorer, strategies, tips }
    }

    /// Wires the bundled registry, a SQLite cache and the HTTP explorer
    /// client from the current config snapshot.
    pub async fn from_config(config: &ConfigLock, db_url: &str) -> Result<Self> {
        let (cache_cfg, explorer_cfg, scan_cfg) = {
            let config = config.lock_all().context("Failed to lock config")?;
            (config.cache.clone(), config.explorer.clone(), config.scan.clone())
        };

        let registry = Arc::new(ChainRegistry::bundled());
        let cache =
            SqliteCache::new(db_url, Duration::from_secs(cache_cfg.ttl_secs)).await?;
        let explorer = ExplorerClient::from_config(&explorer_cfg);
        let strategies = StrategyTable::new(&registry, &scan_cfg);

        Ok(Self::new(
            registry,
            Arc::new(cache),
            Arc::new(explorer),
            strategies,
            Duration::from_secs(cache_cfg.tip_ttl_secs),
        ))
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Did `address` transact on `chain_slug` during `month`?
    ///
    /// Months without a deployed contract resolve to `false` with no
    /// cache or network traffic. Otherwise the cache answers first; on
    /// a miss the month's block range is scanned and the result cached.
    /// `on_progress(chunks_checked, total_chunks)` fires once per probe
    /// batch during a scan.
    pub async fn check_month<F>(
        &self,
        address: Address,
        chain_slug: &str,
        month: Month,
        on_progress: F,
    ) -> Result<bool, CheckerErr>
    where
        F: FnMut(u64, u64),
    {
        let chain = self
            .registry
            .chain(chain_slug)
            .ok_or_else(|| CheckerErr::UnknownChain(chain_slug.to_string()))?;
        let month_config = self
            .registry
            .config_for_chain(chain_slug, month)
            .ok_or_else(|| CheckerErr::UnknownMonth(chain_slug.to_string(), month))?;

        if month_config.contract_address.is_none() {
            tracing::debug!("{month} is not live on {chain_slug}, skipping");
            return Ok(false);
        }

        if let Some(cached) = self.cache.get(address, chain_slug, month).await {
            tracing::debug!("Cache hit for {address:#x} {chain_slug} {month}: {cached}");
            return Ok(cached);
        }

        let has_activity = self.scan_month(address, chain, month_config, on_progress).await;
        self.cache.set(address, chain_slug, month, has_activity).await;

        tracing::info!(
            "Resolved {month} {} activity for {address:#x} on {chain_slug}: {has_activity}",
            month_config.year
        );
        Ok(has_activity)
    }

    async fn scan_month<F>(
        &self,
        address: Address,
        chain: &ChainConfig,
        month_config: &MonthConfig,
        on_progress: F,
    ) -> bool
    where
        F: FnMut(u64, u64),
    {
        let strategy = self.strategies.for_chain(&chain.slug);

        let mut end_block = month_config.end_block;
        if strategy.resolve_tip {
            if let Some(tips) = self.tips.get(&chain.slug) {
                if let Some(tip) = tips.latest(self.explorer.as_ref(), chain).await {
                    end_block = end_block.min(tip);
                }
            }
        }

        scanner::scan(
            self.explorer.as_ref(),
            address,
            chain,
            month_config.start_block,
            end_block,
            strategy.chunk_size,
            strategy.max_concurrency,
            on_progress,
        )
        .await
    }

    /// Checks every configured month for the chain, strictly
    /// sequentially and in chronological order, so at most one month's
    /// probes are ever in flight against the provider.
    /// `on_month(month, result)` fires after each month resolves.
    pub async fn check_all_months<F>(
        &self,
        address: Address,
        chain_slug: &str,
        mut on_month: F,
    ) -> Result<BTreeMap<Month, bool>, CheckerErr>
    where
        F: FnMut(Month, bool),
    {
        if self.registry.chain(chain_slug).is_none() {
            return Err(CheckerErr::UnknownChain(chain_slug.to_string()));
        }

        let mut results = BTreeMap::new();
        for month_config in self.registry.configs_for_chain(chain_slug) {
            let month = month_config.month;
            let has_activity = self.check_month(address, chain_slug, month, |_, _| {}).await?;
            on_month(month, has_activity);
            results.insert(month, has_activity);
        }
        Ok(results)
    }

    /// With both arguments: removes exactly the cached entries for that
    /// pair's configured months. Otherwise: clears everything under the
    /// cache's reserved prefix.
    pub async fn clear_cache(&self, address: Option<Address>, chain_slug: Option<&str>) {
        match (address, chain_slug) {
            (Some(address), Some(chain_slug)) => {
                for month_config in self.registry.configs_for_chain(chain_slug) {
                    self.cache.remove(address, chain_slug, month_config.month).await;
                }
            }
            _ => self.cache.clear_all().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_TTL;
    use crate::strategy::DEFAULT_TIP_TTL;
    use crate::tests::fakes::{FakeExplorer, TestRegistry};

    fn addr() -> Address {
        "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap()
    }

    async fn checker_with(explorer: Arc<FakeExplorer>) -> ActivityChecker {
        let registry = Arc::new(TestRegistry::build());
        let cache = SqliteCache::new("sqlite::memory:", DEFAULT_TTL).await.unwrap();
        let strategies = StrategyTable::new(&registry, &TestRegistry::scan_config());
        ActivityChecker::new(registry, Arc::new(cache), explorer, strategies, DEFAULT_TIP_TTL)
    }

    #[tokio::test]
    async fn unknown_chain_is_a_hard_error() {
        let checker = checker_with(Arc::new(FakeExplorer::empty())).await;
        let err = checker.check_month(addr(), "dogechain", Month::September, |_, _| {}).await;
        assert!(matches!(err, Err(CheckerErr::UnknownChain(_))));

        let err = checker.check_all_months(addr(), "dogechain", |_, _| {}).await;
        assert!(matches!(err, Err(CheckerErr::UnknownChain(_))));
    }

    #[tokio::test]
    async fn unknown_month_is_a_hard_error() {
        // TestRegistry's "tiny" chain only configures September.
        let checker = checker_with(Arc::new(FakeExplorer::empty())).await;
        let err = checker.check_month(addr(), "tiny", Month::December, |_, _| {}).await;
        assert!(matches!(err, Err(CheckerErr::UnknownMonth(_, Month::December))));
    }

    #[tokio::test]
    async fn unlaunched_month_skips_cache_and_network() {
        let explorer = Arc::new(FakeExplorer::with_activity(&[0]));
        let checker = checker_with(explorer.clone()).await;

        // February has no contract address in the test registry.
        let result =
            checker.check_month(addr(), "testnet", Month::February, |_, _| {}).await.unwrap();
        assert!(!result);
        assert_eq!(explorer.probe_count(), 0);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_scan() {
        let explorer = Arc::new(FakeExplorer::with_activity(&[150]));
        let checker = checker_with(explorer.clone()).await;

        let first =
            checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap();
        assert!(first);
        let probes_after_first = explorer.probe_count();
        assert!(probes_after_first > 0);

        let second =
            checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap();
        assert!(second);
        assert_eq!(explorer.probe_count(), probes_after_first);
    }

    #[tokio::test]
    async fn negative_results_are_cached_too() {
        let explorer = Arc::new(FakeExplorer::empty());
        let checker = checker_with(explorer.clone()).await;

        assert!(!checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap());
        let probes = explorer.probe_count();
        assert!(!checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap());
        assert_eq!(explorer.probe_count(), probes);
    }

    #[tokio::test]
    async fn all_months_run_in_order_and_skip_unlaunched() {
        let explorer = Arc::new(FakeExplorer::with_activity(&[150]));
        let checker = checker_with(explorer.clone()).await;

        let mut reported = Vec::new();
        let results = checker
            .check_all_months(addr(), "testnet", |month, result| reported.push((month, result)))
            .await
            .unwrap();

        // September has the activity; October is clean; February has no
        // contract and never hits the network.
        assert_eq!(results.get(&Month::September), Some(&true));
        assert_eq!(results.get(&Month::October), Some(&false));
        assert_eq!(results.get(&Month::February), Some(&false));
        assert_eq!(
            reported,
            vec![(Month::September, true), (Month::October, false), (Month::February, false)]
        );
    }

    #[tokio::test]
    async fn tip_clamps_the_scanned_range() {
        // The tip-resolved chain has range [0, 999] and chunk size 100,
        // but the tip is block 499 -> only 5 chunks probed.
        let explorer = Arc::new(FakeExplorer::with_tip(499));
        let checker = checker_with(explorer.clone()).await;

        assert!(!checker.check_month(addr(), "linea", Month::September, |_, _| {}).await.unwrap());
        assert_eq!(explorer.probe_count(), 5);
        assert_eq!(explorer.tip_calls(), 1);
    }

    #[tokio::test]
    async fn tip_failure_falls_back_to_configured_end() {
        // Tip resolution fails: the full configured range is scanned,
        // producing the same chunk set as if resolution never ran.
        let explorer = Arc::new(FakeExplorer::empty());
        let checker = checker_with(explorer.clone()).await;

        assert!(!checker.check_month(addr(), "linea", Month::September, |_, _| {}).await.unwrap());
        assert_eq!(explorer.probe_count(), 10);
        assert_eq!(explorer.tip_calls(), 1);
    }

    #[tokio::test]
    async fn scoped_clear_only_forgets_one_pair() {
        let explorer = Arc::new(FakeExplorer::empty());
        let checker = checker_with(explorer.clone()).await;
        let other: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();

        checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap();
        checker.check_month(other, "testnet", Month::September, |_, _| {}).await.unwrap();
        let probes = explorer.probe_count();

        checker.clear_cache(Some(addr()), Some("testnet")).await;

        // The cleared pair re-scans; the other address stays cached.
        checker.check_month(other, "testnet", Month::September, |_, _| {}).await.unwrap();
        assert_eq!(explorer.probe_count(), probes);
        checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap();
        assert!(explorer.probe_count() > probes);
    }

    #[tokio::test]
    async fn global_clear_forgets_everything() {
        let explorer = Arc::new(FakeExplorer::empty());
        let checker = checker_with(explorer.clone()).await;

        checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap();
        let probes = explorer.probe_count();

        checker.clear_cache(None, None).await;
        checker.check_month(addr(), "testnet", Month::September, |_, _| {}).await.unwrap();
        assert!(explorer.probe_count() > probes);
    }
}
