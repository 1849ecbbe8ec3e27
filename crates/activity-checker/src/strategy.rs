use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::ScanConfig;
use crate::explorer::ExplorerApi;
use crate::registry::{ChainConfig, ChainRegistry};

/// Latest-block cache TTL when no config overrides it.
pub const DEFAULT_TIP_TTL: Duration = Duration::from_secs(300);

/// How one chain gets scanned. Looked up once per scan instead of
/// branching on the slug at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStrategy {
    pub chunk_size: u64,
    pub max_concurrency: usize,
    pub requires_proxy: bool,
    /// Clamp the configured end block to the chain's real tip before
    /// partitioning (chains whose tables extend into the future).
    pub resolve_tip: bool,
}

/// Built-in per-chain tuning: (chunk_size, max_concurrency, resolve_tip).
fn builtin(slug: &str) -> Option<(u64, usize, bool)> {
    match slug {
        "base" => Some((500_000, 4, false)),
        "arbitrum" => Some((2_000_000, 5, false)),
        "optimism" => Some((500_000, 4, false)),
        "scroll" => Some((200_000, 3, false)),
        // Linea's block tables run ahead of the chain head.
        "linea" => Some((200_000, 2, true)),
        "zksync" => Some((250_000, 2, false)),
        _ => None,
    }
}

/// Slug-keyed strategy table, built once from the registry plus config
/// overrides.
pub struct StrategyTable {
    entries: HashMap<String, ScanStrategy>,
    fallback: ScanStrategy,
}

impl StrategyTable {
    pub fn new(registry: &ChainRegistry, scan: &ScanConfig) -> Self {
        let fallback = ScanStrategy {
            chunk_size: scan.chunk_size,
            max_concurrency: scan.max_concurrency,
            requires_proxy: false,
            resolve_tip: false,
        };

        let entries = registry
            .chains()
            .iter()
            .map(|chain| {
                let (mut chunk_size, mut max_concurrency, resolve_tip) =
                    builtin(&chain.slug).unwrap_or((scan.chunk_size, scan.max_concurrency, false));
                if let Some(overrides) = scan.chains.get(&chain.slug) {
                    if let Some(size) = overrides.chunk_size {
                        chunk_size = size;
                    }
                    if let Some(concurrency) = overrides.max_concurrency {
                        max_concurrency = concurrency;
                    }
                }
                let strategy = ScanStrategy {
                    chunk_size,
                    max_concurrency,
                    requires_proxy: chain.requires_proxy,
                    resolve_tip,
                };
                (chain.slug.clone(), strategy)
            })
            .collect();

        Self { entries, fallback }
    }

    pub fn for_chain(&self, slug: &str) -> ScanStrategy {
        self.entries.get(slug).copied().unwrap_or(self.fallback)
    }

    /// Slugs whose strategy wants dynamic tip resolution.
    pub fn tip_resolved_chains(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, strategy)| strategy.resolve_tip)
            .map(|(slug, _)| slug.as_str())
    }
}

struct TipSnapshot {
    block: u64,
    resolved_at: Instant,
}

/// Per-chain latest-block cache. Resolution failures are absorbed: the
/// caller falls back to the statically configured end block, which at
/// worst scans not-yet-existing ranges that simply return no results.
pub struct TipCache {
    ttl: Duration,
    inner: RwLock<Option<TipSnapshot>>,
}

impl TipCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, inner: RwLock::new(None) }
    }

    pub async fn latest(&self, api: &dyn ExplorerApi, chain: &ChainConfig) -> Option<u64> {
        if let Some(snapshot) = &*self.inner.read().await {
            if snapshot.resolved_at.elapsed() < self.ttl {
                return Some(snapshot.block);
            }
        }

        let mut guard = self.inner.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(snapshot) = &*guard {
            if snapshot.resolved_at.elapsed() < self.ttl {
                return Some(snapshot.block);
            }
        }

        match api.latest_block(chain).await {
            Ok(block) => {
                tracing::debug!("Resolved {} tip to block {block}", chain.slug);
                *guard = Some(TipSnapshot { block, resolved_at: Instant::now() });
                Some(block)
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to resolve {} tip, falling back to configured end block: {err:#}",
                    chain.slug
                );
                None
            }
        }
    }
}
