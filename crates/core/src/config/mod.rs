//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HAVEN_*)
//! 2. TOML config file (if HAVEN_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The loaded struct is constructed once at startup and passed down to the
//! lifecycle controller and request interceptor; there are no module-level
//! cache-name globals.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HAVEN_*)
/// 2. TOML config file (if HAVEN_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Release tag embedded in partition names.
    ///
    /// Bumping this is the only supported upgrade mechanism: changing the
    /// precache manifest without bumping the version will not re-seed.
    #[serde(default = "default_version")]
    pub version: String,

    /// Base name of the static (pre-seeded) partition.
    #[serde(default = "default_static_cache")]
    pub static_cache: String,

    /// Base name of the dynamic (opportunistic) partition.
    #[serde(default = "default_dynamic_cache")]
    pub dynamic_cache: String,

    /// Fixed ordered list of same-origin paths seeded at install.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Path of the offline fallback document, served for failed navigations.
    ///
    /// Expected to be listed in `precache` so it is present in the static
    /// partition by the time it is needed.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Path prefix under which failed retrievals get a JSON error payload.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Origin the worker fronts; manifest paths are resolved against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to the SQLite cache database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Responses larger than this are returned but never stored.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Gateway listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Connectivity probe interval in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

fn default_version() -> String {
    "1".into()
}

fn default_static_cache() -> String {
    "haven-static".into()
}

fn default_dynamic_cache() -> String {
    "haven-dynamic".into()
}

fn default_precache() -> Vec<String> {
    vec![
        "/".into(),
        "/index.html".into(),
        "/manifest.json".into(),
        "/offline.html".into(),
        "/icons/icon-192.png".into(),
        "/icons/icon-512.png".into(),
    ]
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_origin() -> String {
    "http://127.0.0.1:8080".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./haven-cache.sqlite")
}

fn default_user_agent() -> String {
    "haven/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_listen_addr() -> String {
    "127.0.0.1:3999".into()
}

fn default_probe_interval_ms() -> u64 {
    30_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            static_cache: default_static_cache(),
            dynamic_cache: default_dynamic_cache(),
            precache: default_precache(),
            offline_page: default_offline_page(),
            api_prefix: default_api_prefix(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            listen_addr: default_listen_addr(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Versioned name of the static partition.
    pub fn static_partition(&self) -> String {
        format!("{}-v{}", self.static_cache, self.version)
    }

    /// Versioned name of the dynamic partition.
    pub fn dynamic_partition(&self) -> String {
        format!("{}-v{}", self.dynamic_cache, self.version)
    }

    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe interval as Duration.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HAVEN_`
    /// 2. TOML file from `HAVEN_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("HAVEN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HAVEN_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
