//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::errors::Locale;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Vehicle or device label used in logs (e.g., "bus-07")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "bus".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_reader_device")]
    pub device: String,
    #[serde(default = "default_reader_baud")]
    pub baud: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Single scan attempt timeout
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            device: default_reader_device(),
            baud: default_reader_baud(),
            enabled: true,
            scan_timeout_ms: default_scan_timeout_ms(),
        }
    }
}

fn default_reader_device() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_reader_baud() -> u32 {
    9600
}

fn default_true() -> bool {
    true
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_base_url")]
    pub base_url: String,
    #[serde(default = "default_store_collection")]
    pub collection: String,
    /// Client-wide request timeout; the only bound on persist calls
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_store_page_size")]
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_base_url(),
            collection: default_store_collection(),
            timeout_ms: default_store_timeout_ms(),
            page_size: default_store_page_size(),
        }
    }
}

fn default_store_base_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_store_collection() -> String {
    "pilgrims".to_string()
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

fn default_store_page_size() -> u32 {
    200
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// File path for session summaries (JSONL format)
    #[serde(default = "default_history_file")]
    pub file: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { file: default_history_file() }
    }
}

fn default_history_file() -> String {
    "sessions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    reader_device: String,
    reader_baud: u32,
    reader_enabled: bool,
    scan_timeout_ms: u64,
    store_base_url: String,
    store_collection: String,
    store_timeout_ms: u64,
    store_page_size: u32,
    locale: Locale,
    history_file: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            reader_device: toml_config.reader.device,
            reader_baud: toml_config.reader.baud,
            reader_enabled: toml_config.reader.enabled,
            scan_timeout_ms: toml_config.reader.scan_timeout_ms,
            store_base_url: toml_config.store.base_url.trim_end_matches('/').to_string(),
            store_collection: toml_config.store.collection,
            store_timeout_ms: toml_config.store.timeout_ms,
            store_page_size: toml_config.store.page_size.max(1),
            locale: toml_config.session.locale,
            history_file: toml_config.history.file,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn reader_device(&self) -> &str {
        &self.reader_device
    }

    pub fn reader_baud(&self) -> u32 {
        self.reader_baud
    }

    pub fn reader_enabled(&self) -> bool {
        self.reader_enabled
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn store_base_url(&self) -> &str {
        &self.store_base_url
    }

    pub fn store_collection(&self) -> &str {
        &self.store_collection
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn store_page_size(&self) -> u32 {
        self.store_page_size
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn history_file(&self) -> &str {
        &self.history_file
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder methods for tests
    #[cfg(test)]
    pub fn with_reader_device(mut self, device: &str) -> Self {
        self.reader_device = device.to_string();
        self
    }

    #[cfg(test)]
    pub fn with_reader_enabled(mut self, enabled: bool) -> Self {
        self.reader_enabled = enabled;
        self
    }

    #[cfg(test)]
    pub fn with_store_base_url(mut self, url: &str) -> Self {
        self.store_base_url = url.trim_end_matches('/').to_string();
        self
    }
}
