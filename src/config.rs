//! Configuration loader and validator for the offline inventory sync service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub remote: Remote,
    #[serde(default)]
    pub connectivity: Connectivity,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
}

/// Remote data service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Remote {
    pub base_url: String,
    pub api_key: String,
    /// Signed-in user's token; the API key is used as bearer when absent.
    #[serde(default)]
    pub access_token: Option<String>,
    /// No timeout when absent.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Connectivity probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connectivity {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_start_online")]
    pub start_online: bool,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            start_online: default_start_online(),
        }
    }
}

/// Upper bound for `app.cache_ttl_hours` (ten years).
pub const MAX_CACHE_TTL_HOURS: u64 = 24 * 365 * 10;

fn default_database_file() -> String {
    "sign-inventory.db".to_string()
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_probe_interval_ms() -> u64 {
    5000
}

fn default_start_online() -> bool {
    true
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.resolved_data_dir())
    }

    /// `app.data_dir` with a leading `~/` expanded.
    pub fn resolved_data_dir(&self) -> PathBuf {
        let dir = self.app.data_dir.trim();
        match (dir.strip_prefix("~/"), std::env::var("HOME")) {
            (Some(rest), Ok(home)) => Path::new(&home).join(rest),
            _ => PathBuf::from(dir),
        }
    }

    /// `DATABASE_URL` if set, otherwise the file under the data directory.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}",
                self.resolved_data_dir().join(&self.app.database_file).display()
            )
        })
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.app.cache_ttl_hours.min(MAX_CACHE_TTL_HOURS) as i64)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity.probe_interval_ms)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.database_file.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_file must be non-empty"));
    }
    if cfg.app.cache_ttl_hours == 0 {
        return Err(ConfigError::Invalid("app.cache_ttl_hours must be > 0"));
    }
    if cfg.app.cache_ttl_hours > MAX_CACHE_TTL_HOURS {
        return Err(ConfigError::Invalid("app.cache_ttl_hours must be at most 87600"));
    }

    let base = cfg.remote.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("remote.base_url must be non-empty"));
    }
    if !(base.starts_with("https://") || base.starts_with("http://")) {
        return Err(ConfigError::Invalid("remote.base_url must be an http(s) URL"));
    }
    if !base.ends_with('/') {
        return Err(ConfigError::Invalid("remote.base_url must end with '/'"));
    }
    if cfg.remote.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("remote.api_key must be non-empty"));
    }
    if cfg.remote.request_timeout_secs == Some(0) {
        return Err(ConfigError::Invalid("remote.request_timeout_secs must be > 0"));
    }

    if cfg.connectivity.probe_interval_ms == 0 {
        return Err(ConfigError::Invalid("connectivity.probe_interval_ms must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  database_file: "sign-inventory.db"
  # Catalog snapshots older than this are ignored.
  cache_ttl_hours: 24

remote:
  base_url: "https://YOUR_PROJECT.supabase.co/"
  api_key: "YOUR_ANON_KEY"
  # access_token: "SIGNED_IN_USER_JWT"
  # request_timeout_secs: 30

connectivity:
  probe_interval_ms: 5000
  start_online: true
"#
}
