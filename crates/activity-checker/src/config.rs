use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};

use anyhow::{Context, Result};
use notify::{EventKind, Watcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    fs,
    task::JoinHandle,
    time::{timeout, Duration},
};
use url::Url;

use crate::errors::{impl_coded_debug, CodedError};

#[derive(Error)]
pub enum ConfigErr {
    #[error("{code} Failed to lock internal config structure", code = self.code())]
    LockFailed,
}

impl_coded_debug!(ConfigErr);

impl CodedError for ConfigErr {
    fn code(&self) -> &str {
        match self {
            ConfigErr::LockFailed => "[AC-CON-001]",
        }
    }
}

pub mod defaults {
    pub const fn cache_ttl_secs() -> u64 {
        3600
    }

    pub const fn tip_ttl_secs() -> u64 {
        300
    }

    pub const fn chunk_size() -> u64 {
        500_000
    }

    pub const fn max_concurrency() -> usize {
        4
    }
}

/// TTLs for the two local caches.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Result-cache TTL in seconds.
    #[serde(default = "defaults::cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Latest-block cache TTL in seconds.
    #[serde(default = "defaults::tip_ttl_secs")]
    pub tip_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: defaults::cache_ttl_secs(), tip_ttl_secs: defaults::tip_ttl_secs() }
    }
}

/// Explorer access: per-chain provider keys for direct endpoints, and
/// the proxy endpoint for chains whose explorers block cross-origin
/// requests (the proxy holds its own keys server-side).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ExplorerConfig {
    pub proxy_url: Option<Url>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

/// Per-chain scan tuning overrides.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScanChainOverride {
    pub chunk_size: Option<u64>,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Chunk size for chains without built-in tuning.
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: u64,
    /// Concurrent probes per batch for chains without built-in tuning.
    #[serde(default = "defaults::max_concurrency")]
    pub max_concurrency: usize,
    /// Per-chain overrides, keyed by slug.
    #[serde(default)]
    pub chains: HashMap<String, ScanChainOverride>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::chunk_size(),
            max_concurrency: defaults::max_concurrency(),
            chains: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        let data = toml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, data).await.context(format!("Failed to write config to {path:?}"))
    }
}

#[derive(Clone, Default, Debug)]
pub struct ConfigLock {
    config: Arc<RwLock<Config>>,
}

impl ConfigLock {
    fn new(config: Arc<RwLock<Config>>) -> Self {
        Self { config }
    }

    pub fn lock_all(&self) -> Result<std::sync::RwLockReadGuard<'_, Config>, ConfigErr> {
        self.config.read().map_err(|_| ConfigErr::LockFailed)
    }
}

/// Max number of pending filesystem events from the config file
const FILE_MONITOR_EVENT_BUFFER: usize = 32;

/// Monitor service for watching the config file for changes
pub struct ConfigWatcher {
    /// Current config data
    pub config: ConfigLock,
    /// monitor task handle
    _monitor: JoinHandle<Result<()>>,
}

impl ConfigWatcher {
    /// Initialize a new config watcher and handle
    pub async fn new(config_path: &Path) -> Result<Self> {
        let initial_config = Config::load(config_path).await?;
        let config = Arc::new(RwLock::new(initial_config));
        let config_copy = config.clone();
        let config_path_copy = config_path.to_path_buf();

        let startup_notification = Arc::new(tokio::sync::Notify::new());
        let startup_notification_copy = startup_notification.clone();

        let monitor = tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(FILE_MONITOR_EVENT_BUFFER);

            let mut watcher = notify::recommended_watcher(move |res| match res {
                Ok(event) => {
                    if let Err(err) = tx.try_send(event) {
                        tracing::debug!("Failed to send filesystem event to channel: {err:?}");
                    }
                }
                Err(err) => tracing::error!("Failed to watch config file: {err:?}"),
            })
            .context("Failed to construct watcher")?;

            watcher
                .watch(&config_path_copy, notify::RecursiveMode::NonRecursive)
                .context("Failed to start watcher")?;
            startup_notification_copy.notify_one();

            while let Some(event) = rx.recv().await {
                match event.kind {
                    EventKind::Modify(_) => {
                        tracing::debug!("Reloading modified config file");
                        let new_config = match Config::load(&config_path_copy).await {
                            Ok(val) => val,
                            Err(err) => {
                                tracing::error!("Failed to load modified config: {err:?}");
                                continue;
                            }
                        };
                        let mut config = match config_copy.write() {
                            Ok(val) => val,
                            Err(err) => {
                                tracing::error!(
                                    "Failed to lock config, previously poisoned? {err:?}"
                                );
                                continue;
                            }
                        };
                        *config = new_config;
                    }
                    _ => {
                        tracing::debug!("unsupported config file event: {event:?}");
                    }
                }
            }

            watcher.unwatch(&config_path_copy).context("Failed to stop watching config")?;

            Ok(())
        });

        // Wait for successful start up, if failed return the Result
        if let Err(err) = timeout(Duration::from_secs(1), startup_notification.notified()).await {
            tracing::error!("Failed to get notification from config monitor startup in: {err}");
            let task_res = monitor.await.context("Config watcher startup failed")?;
            match task_res {
                Ok(_) => unreachable!("Startup failed to notify in timeout but exited cleanly"),
                Err(err) => return Err(err),
            }
        }
        tracing::debug!("Successful startup");

        Ok(Self { config: ConfigLock::new(config), _monitor: monitor })
    }
}
