use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Campaign months, in chronological order across the two-year span.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Month {
    September,
    October,
    November,
    December,
    January,
    February,
}

impl Month {
    pub const ALL: [Month; 6] = [
        Month::September,
        Month::October,
        Month::November,
        Month::December,
        Month::January,
        Month::February,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
            Month::January => "January",
            Month::February => "February",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("unknown month: {0}")]
pub struct ParseMonthErr(String);

impl FromStr for Month {
    type Err = ParseMonthErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "september" => Ok(Month::September),
            "october" => Ok(Month::October),
            "november" => Ok(Month::November),
            "december" => Ok(Month::December),
            "january" => Ok(Month::January),
            "february" => Ok(Month::February),
            other => Err(ParseMonthErr(other.to_string())),
        }
    }
}

/// A supported network, keyed by slug. Immutable after process start.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub slug: String,
    pub chain_id: u64,
    /// Explorer API endpoint (etherscan-style query interface).
    pub explorer_url: Url,
    pub display_name: String,
    /// The explorer blocks cross-origin requests; route through the proxy.
    pub requires_proxy: bool,
    pub active: bool,
}

/// One campaign month on one chain: the inclusive block range the month
/// maps to, and the reward contract (absent while not yet live).
#[derive(Debug, Clone)]
pub struct MonthConfig {
    pub month: Month,
    pub year: i32,
    pub start_block: u64,
    pub end_block: u64,
    pub contract_address: Option<Address>,
    pub metadata_uri: String,
}

/// Static table of supported chains and their per-month block ranges.
///
/// Lookups are total: unknown slugs yield empty/`None` results, never
/// errors. Block-range tables are input data; per chain they are
/// contiguous and non-overlapping by construction (`end(N) + 1 ==
/// start(N+1)`), but nothing here re-derives them from block times.
pub struct ChainRegistry {
    chains: Vec<ChainConfig>,
    months: HashMap<String, Vec<MonthConfig>>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainConfig>, months: HashMap<String, Vec<MonthConfig>>) -> Self {
        Self { chains, months }
    }

    /// The table shipped with the binary.
    pub fn bundled() -> Self {
        let chains = vec![
            chain("base", 8453, "Base", "https://api.basescan.org/api", false, true),
            chain("arbitrum", 42161, "Arbitrum One", "https://api.arbiscan.io/api", false, true),
            chain(
                "optimism",
                10,
                "OP Mainnet",
                "https://api-optimistic.etherscan.io/api",
                false,
                true,
            ),
            chain("scroll", 534352, "Scroll", "https://api.scrollscan.com/api", true, true),
            chain("linea", 59144, "Linea", "https://api.lineascan.build/api", true, true),
            chain("zksync", 324, "zkSync Era", "https://api-era.zksync.network/api", true, false),
        ];

        let mut months = HashMap::new();
        // Anchors are the block heights at 2024-09-01 00:00 UTC; spans
        // use the chain's nominal blocks-per-day figure.
        months.insert(
            "base".to_string(),
            month_table(
                "base",
                18_600_000,
                43_200,
                [
                    Some(address!("8f3a9c71b24de05a6c4829f641ceba7192d6e3b0")),
                    Some(address!("c26b11e4af1a972e42d5a34db2c13d0e6f7b81d5")),
                    Some(address!("4de1f0a85b2c9377cc05d8b163a4fe92810c72aa")),
                    Some(address!("91b82cd4e73fa6105598de0cc2b7a4f3d61e88c1")),
                    Some(address!("3aa74bd2c9e8f11608b5dc47a2391efc05d6b942")),
                    None,
                ],
            ),
        );
        months.insert(
            "arbitrum".to_string(),
            month_table(
                "arbitrum",
                250_000_000,
                345_600,
                [
                    Some(address!("7c55e9b1d8f34a20b6dd14c5e20a9f8317cb60d4")),
                    Some(address!("e3129fd06b84cc571a80241dd9aef5f20c3b7a16")),
                    Some(address!("50c4a8e217f9bb3dd86013942cfa5ed3981e06f8")),
                    Some(address!("bd6e210a94cc8f57e3b01d8462fa9ce5170da433")),
                    Some(address!("17f803bc2e9d44a5108cf6a92035e1b477d09c58")),
                    None,
                ],
            ),
        );
        months.insert(
            "optimism".to_string(),
            month_table(
                "optimism",
                124_800_000,
                43_200,
                [
                    Some(address!("a49b5cf07d13e8624c3f1ed4a60728915d0b8e62")),
                    Some(address!("02d7f1be84965cf30a2cdc6b4a35912fe71c08a9")),
                    Some(address!("6ff04bea1c80d52ab31e01d2a73496dc3c6a27e5")),
                    Some(address!("d80235ae71c9f5e46d05132ba86ce0fd2e13b944")),
                    Some(address!("38c1e5db70214f0afa6c02e9d48ab75f19c0dd61")),
                    None,
                ],
            ),
        );
        months.insert(
            "scroll".to_string(),
            month_table(
                "scroll",
                9_600_000,
                28_800,
                [
                    Some(address!("f25a80cd417cb2e50354ad96e1c09835d0b4a771")),
                    Some(address!("9ce3401d6bf2a1825c7e04a9f0878db562f010c3")),
                    Some(address!("61d74fa2cb08e59510f3a06d8e135b90c2e4a8fd")),
                    Some(address!("0a9f351cd842b7e06c98d5e021fa47ce6310b8d4")),
                    Some(address!("c78d11502ab3f964e0a65d7319cfe0b842691aa0")),
                    None,
                ],
            ),
        );
        months.insert(
            "linea".to_string(),
            month_table(
                "linea",
                8_500_000,
                28_800,
                [
                    Some(address!("b91e67ac530d7f2a9c11e845c8de09b3741f6a02")),
                    Some(address!("5da22c08f179bb3e1d6045a9c3b8fe6210d974ce")),
                    Some(address!("e09c4ba1872f6dd035a18ce2940b5f17d36c80a5")),
                    Some(address!("2fd80c3ae5196bb470d2e8a9341ff05c867d1b09")),
                    Some(address!("8a165cd09e3b2f74610dc4ab85297fe0d143b6c7")),
                    None,
                ],
            ),
        );

        Self { chains, months }
    }

    pub fn chain(&self, slug: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.slug == slug)
    }

    pub fn active_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.active)
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    /// Configured months for a chain, chronological. Empty for unknown
    /// chains.
    pub fn configs_for_chain(&self, slug: &str) -> &[MonthConfig] {
        self.months.get(slug).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn config_for_chain(&self, slug: &str, month: Month) -> Option<&MonthConfig> {
        self.configs_for_chain(slug).iter().find(|m| m.month == month)
    }

    pub fn contract_address_for(&self, slug: &str, month: Month) -> Option<Address> {
        self.config_for_chain(slug, month).and_then(|m| m.contract_address)
    }
}

fn chain(
    slug: &str,
    chain_id: u64,
    display_name: &str,
    explorer_url: &str,
    requires_proxy: bool,
    active: bool,
) -> ChainConfig {
    ChainConfig {
        slug: slug.to_string(),
        chain_id,
        // Bundled endpoints are compile-time constants.
        explorer_url: Url::parse(explorer_url).expect("bundled explorer URL is valid"),
        display_name: display_name.to_string(),
        requires_proxy,
        active,
    }
}

/// (month, year, days) for the campaign span.
const CAMPAIGN: [(Month, i32, u64); 6] = [
    (Month::September, 2024, 30),
    (Month::October, 2024, 31),
    (Month::November, 2024, 30),
    (Month::December, 2024, 31),
    (Month::January, 2025, 31),
    (Month::February, 2025, 28),
];

fn month_table(
    slug: &str,
    anchor_block: u64,
    blocks_per_day: u64,
    contracts: [Option<Address>; 6],
) -> Vec<MonthConfig> {
    let mut start = anchor_block;
    CAMPAIGN
        .iter()
        .zip(contracts)
        .map(|(&(month, year, days), contract_address)| {
            let end = start + days * blocks_per_day - 1;
            let config = MonthConfig {
                month,
                year,
                start_block: start,
                end_block: end,
                contract_address,
                metadata_uri: format!(
                    "ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi/{slug}/{}.json",
                    month.as_str().to_ascii_lowercase()
                ),
            };
            start = end + 1;
            config
        })
        .collect()
}
