use alloy::primitives::Address;
use futures::future::join_all;

use crate::explorer::ExplorerApi;
use crate::registry::ChainConfig;

/// Ephemeral inclusive block sub-range; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
}

/// Splits `[start_block, end_block]` into consecutive inclusive chunks
/// of at most `chunk_size` blocks; the last chunk may be shorter. The
/// union exactly covers the range with no gaps or overlaps.
pub(crate) fn partition(start_block: u64, end_block: u64, chunk_size: u64) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = start_block;
    while start <= end_block {
        let end = end_block.min(start.saturating_add(chunk_size - 1));
        chunks.push(Chunk { start, end });
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

/// Linear scan with early exit: probes chunks in sequential batches of
/// `max_concurrency`, ORs each batch's outcomes, and stops at the first
/// positive batch. `on_progress(checked, total)` fires exactly once per
/// batch. The expensive case (no activity at all) always costs one
/// probe per chunk.
pub async fn scan<F>(
    api: &dyn ExplorerApi,
    address: Address,
    chain: &ChainConfig,
    start_block: u64,
    end_block: u64,
    chunk_size: u64,
    max_concurrency: usize,
    mut on_progress: F,
) -> bool
where
    F: FnMut(u64, u64),
{
    if start_block > end_block {
        // Degenerate or future month; nothing to probe.
        tracing::debug!(
            "Empty scan range [{start_block}, {end_block}] on {}, reporting no activity",
            chain.slug
        );
        return false;
    }

    let chunks = partition(start_block, end_block, chunk_size);
    let total = chunks.len() as u64;
    let mut checked = 0u64;

    tracing::debug!(
        "Scanning {} chunks of <= {chunk_size} blocks on {} for {address:#x}, {} at a time",
        total,
        chain.slug,
        max_concurrency.max(1)
    );

    for batch in chunks.chunks(max_concurrency.max(1)) {
        let outcomes =
            join_all(batch.iter().map(|c| api.probe(address, chain, c.start, c.end))).await;

        checked += batch.len() as u64;
        on_progress(checked, total);

        if outcomes.iter().any(|outcome| outcome.found()) {
            tracing::debug!(
                "Activity found for {address:#x} on {} after {checked}/{total} chunks",
                chain.slug
            );
            return true;
        }
    }

    false
}
