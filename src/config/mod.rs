// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub image_cache: ImageCacheConfig,
    #[serde(default)]
    pub warming: WarmingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.freshness.expiry_window_ms == 0 {
            return Err("freshness.expiry_window_ms must be greater than 0".to_string());
        }

        if self.storage.snapshot_key.trim().is_empty() {
            return Err("storage.snapshot_key cannot be empty".to_string());
        }

        if !self.network.base_url.starts_with("http://")
            && !self.network.base_url.starts_with("https://")
        {
            return Err(format!(
                "network.base_url '{}' must start with http:// or https://",
                self.network.base_url
            ));
        }

        if self.network.timeout_secs == 0 {
            return Err("network.timeout_secs must be greater than 0".to_string());
        }

        if self.image_cache.max_size_mb == 0 {
            return Err("image_cache.max_size_mb must be greater than 0".to_string());
        }

        if self.image_cache.dir_name.trim().is_empty() || self.image_cache.dir_name.contains("..")
        {
            return Err(format!(
                "image_cache.dir_name '{}' is not a valid directory name",
                self.image_cache.dir_name
            ));
        }

        if self.warming.interval_secs == 0 {
            return Err("warming.interval_secs must be greater than 0".to_string());
        }

        if self.warming.max_batch == 0 || self.warming.concurrency == 0 {
            return Err("warming.max_batch and warming.concurrency must be greater than 0".to_string());
        }

        if self.monitor.interval_secs == 0 {
            return Err("monitor.interval_secs must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Snapshot age after which it is treated as absent
    #[serde(default = "default_expiry_window_ms")]
    pub expiry_window_ms: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            expiry_window_ms: default_expiry_window_ms(),
        }
    }
}

fn default_expiry_window_ms() -> u64 {
    DEFAULT_EXPIRY_WINDOW_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
            snapshot_key: default_snapshot_key(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_ROOT)
}

fn default_snapshot_key() -> String {
    DEFAULT_SNAPSHOT_KEY.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_network_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_network_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_network_timeout() -> u64 {
    DEFAULT_NETWORK_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCacheConfig {
    #[serde(default = "default_image_cache_max_size_mb")]
    pub max_size_mb: u64,
    /// Entries not accessed for this long are removed at startup
    #[serde(default = "default_image_retention_days")]
    pub retention_days: u64,
    /// Sub-directory of `storage.root_dir` holding image blobs
    #[serde(default = "default_image_dir_name")]
    pub dir_name: String,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_image_cache_max_size_mb(),
            retention_days: default_image_retention_days(),
            dir_name: default_image_dir_name(),
        }
    }
}

impl ImageCacheConfig {
    /// Convert max_size_mb to bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn retention_ms(&self) -> u64 {
        self.retention_days.saturating_mul(24 * 60 * 60 * 1000)
    }
}

fn default_image_cache_max_size_mb() -> u64 {
    DEFAULT_IMAGE_CACHE_MAX_SIZE_MB
}

fn default_image_retention_days() -> u64 {
    DEFAULT_IMAGE_RETENTION_DAYS
}

fn default_image_dir_name() -> String {
    DEFAULT_IMAGE_DIR_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmingConfig {
    #[serde(default = "default_warming_interval")]
    pub interval_secs: u64,
    /// Warmed images older than this are prefetched again
    #[serde(default = "default_rewarm_after")]
    pub rewarm_after_secs: u64,
    #[serde(default = "default_warming_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_warming_concurrency")]
    pub concurrency: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_warming_interval(),
            rewarm_after_secs: default_rewarm_after(),
            max_batch: default_warming_max_batch(),
            concurrency: default_warming_concurrency(),
        }
    }
}

impl WarmingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn rewarm_after_ms(&self) -> u64 {
        self.rewarm_after_secs.saturating_mul(1000)
    }
}

fn default_warming_interval() -> u64 {
    DEFAULT_WARMING_INTERVAL_SECS
}

fn default_rewarm_after() -> u64 {
    DEFAULT_REWARM_AFTER_SECS
}

fn default_warming_max_batch() -> usize {
    DEFAULT_WARMING_MAX_BATCH
}

fn default_warming_concurrency() -> usize {
    DEFAULT_WARMING_CONCURRENCY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_monitor_interval() -> u64 {
    DEFAULT_MONITOR_INTERVAL_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
