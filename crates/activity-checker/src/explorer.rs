use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::ExplorerConfig;
use crate::registry::ChainConfig;

/// `closest=before` clamps a far-future timestamp to the chain head.
const TIP_TIMESTAMP: u64 = 99_999_999_999;

/// Outcome of a single existence probe.
///
/// `Inconclusive` covers transport failures, unparseable bodies and
/// rate-limited responses. Callers collapse it to "no evidence found";
/// a false negative only costs a re-check after the cache expires, it
/// never grants eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found,
    NotFound,
    Inconclusive,
}

impl ProbeOutcome {
    pub fn found(self) -> bool {
        matches!(self, ProbeOutcome::Found)
    }
}

/// Read-only view of a chain's block explorer.
#[async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Asks "does at least one transaction for `address` exist in
    /// `[start_block, end_block]`". Never errors.
    async fn probe(
        &self,
        address: Address,
        chain: &ChainConfig,
        start_block: u64,
        end_block: u64,
    ) -> ProbeOutcome;

    /// Current chain height via the block-by-timestamp endpoint.
    async fn latest_block(&self, chain: &ChainConfig) -> Result<u64>;
}

pub type ExplorerObj = Arc<dyn ExplorerApi>;

/// Etherscan-style `{status, message, result}` envelope. `result` is
/// left dynamic: a transaction array for `txlist`, a height (string or
/// object) for `getblocknobytime`, and an error string on failures.
#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// HTTP prober backed by `reqwest`.
///
/// Chains flagged `requires_proxy` are routed through the configured
/// proxy endpoint, which injects the provider key server-side and
/// enforces its own fixed-window rate limit. No request timeout is set;
/// a hung probe stalls its batch.
#[derive(Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    proxy_url: Option<Url>,
    api_keys: HashMap<String, String>,
}

impl ExplorerClient {
    pub fn new(proxy_url: Option<Url>, api_keys: HashMap<String, String>) -> Self {
        Self { http: reqwest::Client::new(), proxy_url, api_keys }
    }

    pub fn from_config(config: &ExplorerConfig) -> Self {
        Self::new(config.proxy_url.clone(), config.api_keys.clone())
    }

    /// Builds a GET for the given query, routed through the proxy when
    /// the chain needs it (falling back to the direct endpoint if no
    /// proxy is configured).
    fn request(&self, chain: &ChainConfig, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        if chain.requires_proxy {
            if let Some(proxy_url) = &self.proxy_url {
                return self
                    .http
                    .get(proxy_url.clone())
                    .query(&[("chain", chain.slug.as_str())])
                    .query(params);
            }
            tracing::warn!("Chain {} requires a proxy but none is configured", chain.slug);
        }

        let mut request = self.http.get(chain.explorer_url.clone()).query(params);
        if let Some(key) = self.api_keys.get(&chain.slug) {
            request = request.query(&[("apikey", key.as_str())]);
        }
        request
    }

    async fn fetch(&self, chain: &ChainConfig, params: &[(&str, &str)]) -> Result<Envelope> {
        let response = self
            .request(chain, params)
            .send()
            .await
            .with_context(|| format!("Explorer request failed for {}", chain.slug))?;

        let status = response.status();
        if !status.is_success() {
            // Covers proxy rate-limit responses; no retry.
            anyhow::bail!("Explorer returned HTTP {status} for {}", chain.slug);
        }

        response
            .json::<Envelope>()
            .await
            .with_context(|| format!("Malformed explorer response from {}", chain.slug))
    }
}

#[async_trait]
impl ExplorerApi for ExplorerClient {
    async fn probe(
        &self,
        address: Address,
        chain: &ChainConfig,
        start_block: u64,
        end_block: u64,
    ) -> ProbeOutcome {
        let address = format!("{address:#x}");
        let start = start_block.to_string();
        let end = end_block.to_string();
        let params: &[(&str, &str)] = &[
            ("module", "account"),
            ("action", "txlist"),
            ("address", &address),
            ("startblock", &start),
            ("endblock", &end),
            // One row is enough to prove existence.
            ("page", "1"),
            ("offset", "1"),
            ("sort", "asc"),
        ];

        match self.fetch(chain, params).await {
            Ok(envelope) => {
                if envelope.status == "1"
                    && envelope.result.as_array().is_some_and(|txs| !txs.is_empty())
                {
                    ProbeOutcome::Found
                } else {
                    tracing::trace!(
                        "No transactions for {address} on {} in [{start}, {end}]: {}",
                        chain.slug,
                        envelope.message
                    );
                    ProbeOutcome::NotFound
                }
            }
            Err(err) => {
                tracing::debug!(
                    "Probe inconclusive for {address} on {} in [{start}, {end}]: {err:#}",
                    chain.slug
                );
                ProbeOutcome::Inconclusive
            }
        }
    }

    async fn latest_block(&self, chain: &ChainConfig) -> Result<u64> {
        let timestamp = TIP_TIMESTAMP.to_string();
        let params: &[(&str, &str)] = &[
            ("module", "block"),
            ("action", "getblocknobytime"),
            ("timestamp", &timestamp),
            ("closest", "before"),
        ];

        let envelope = self.fetch(chain, params).await?;
        parse_block_height(&envelope.result).with_context(|| {
            format!("Unrecognized block height in explorer response: {}", envelope.result)
        })
    }
}

/// Explorers answer `getblocknobytime` with either a numeric string or
/// an object carrying one.
fn parse_block_height(result: &serde_json::Value) -> Option<u64> {
    match result {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::Object(map) => map.get("blockNumber").and_then(parse_block_height),
        _ => None,
    }
}
