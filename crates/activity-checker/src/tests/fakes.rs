use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{address, Address};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use url::Url;

use crate::config::{ScanChainOverride, ScanConfig};
use crate::explorer::{ExplorerApi, ProbeOutcome};
use crate::registry::{ChainConfig, ChainRegistry, Month, MonthConfig};

/// In-memory [`ExplorerApi`]: activity at fixed block heights, an
/// optional tip, and call counters.
pub(crate) struct FakeExplorer {
    active_blocks: Vec<u64>,
    tip: Option<u64>,
    probes: AtomicU64,
    tip_requests: AtomicU64,
}

impl FakeExplorer {
    /// No activity anywhere; tip resolution fails.
    pub fn empty() -> Self {
        Self::build(Vec::new(), None)
    }

    /// Transactions exist exactly at the given block heights.
    pub fn with_activity(blocks: &[u64]) -> Self {
        Self::build(blocks.to_vec(), None)
    }

    /// No activity, but tip resolution succeeds with `tip`.
    pub fn with_tip(tip: u64) -> Self {
        Self::build(Vec::new(), Some(tip))
    }

    fn build(active_blocks: Vec<u64>, tip: Option<u64>) -> Self {
        Self { active_blocks, tip, probes: AtomicU64::new(0), tip_requests: AtomicU64::new(0) }
    }

    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn tip_calls(&self) -> u64 {
        self.tip_requests.load(Ordering::SeqCst)
    }

    pub fn test_chain(slug: &str) -> ChainConfig {
        ChainConfig {
            slug: slug.to_string(),
            chain_id: 1337,
            explorer_url: Url::parse("http://localhost/api").unwrap(),
            display_name: slug.to_string(),
            requires_proxy: false,
            active: true,
        }
    }
}

#[async_trait]
impl ExplorerApi for FakeExplorer {
    async fn probe(
        &self,
        _address: Address,
        _chain: &ChainConfig,
        start_block: u64,
        end_block: u64,
    ) -> ProbeOutcome {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.active_blocks.iter().any(|&b| start_block <= b && b <= end_block) {
            ProbeOutcome::Found
        } else {
            ProbeOutcome::NotFound
        }
    }

    async fn latest_block(&self, _chain: &ChainConfig) -> Result<u64> {
        self.tip_requests.fetch_add(1, Ordering::SeqCst);
        self.tip.ok_or_else(|| anyhow!("tip endpoint unavailable"))
    }
}

/// Small registry for orchestrator tests:
/// - `testnet`: September and October live, February not yet;
/// - `tiny`: September only;
/// - `linea`: September only, with dynamic tip resolution (the slug
///   carries the built-in tip-resolving strategy).
pub(crate) struct TestRegistry;

impl TestRegistry {
    pub fn build() -> ChainRegistry {
        let chains = vec![
            FakeExplorer::test_chain("testnet"),
            FakeExplorer::test_chain("tiny"),
            FakeExplorer::test_chain("linea"),
        ];

        let mut months = HashMap::new();
        months.insert(
            "testnet".to_string(),
            vec![
                month(Month::September, 2024, 0, 999, true),
                month(Month::October, 2024, 1000, 1999, true),
                month(Month::February, 2025, 2000, 2999, false),
            ],
        );
        months.insert("tiny".to_string(), vec![month(Month::September, 2024, 0, 999, true)]);
        months.insert("linea".to_string(), vec![month(Month::September, 2024, 0, 999, true)]);

        ChainRegistry::new(chains, months)
    }

    /// Scan tuning that keeps test ranges at a handful of chunks.
    pub fn scan_config() -> ScanConfig {
        let mut scan = ScanConfig::default();
        scan.chains.insert(
            "linea".to_string(),
            ScanChainOverride { chunk_size: Some(100), max_concurrency: Some(2) },
        );
        scan
    }
}

pub(crate) fn month(
    month: Month,
    year: i32,
    start_block: u64,
    end_block: u64,
    live: bool,
) -> MonthConfig {
    MonthConfig {
        month,
        year,
        start_block,
        end_block,
        contract_address: live.then_some(address!("00000000000000000000000000000000000000c1")),
        metadata_uri: format!("ipfs://test/{}.json", month.as_str().to_ascii_lowercase()),
    }
}
