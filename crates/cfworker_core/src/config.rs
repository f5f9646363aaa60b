//! Runtime configuration resolved from flags, environment and defaults.
//!
//! # Invariants
//! - Resolution order is explicit override > environment variable > default.
//! - `data_dir` is always absolute.
//! - Endpoint URLs are valid absolute http(s) URLs.

use crate::client::DEFAULT_TIMEOUT;
use crate::db::DB_FILE_NAME;
use crate::logging::{default_log_level, LOG_DIR_NAME};
use crate::proxy_ip::{DEFAULT_IP_URL, DEFAULT_STATS_URL};
use crate::vault::MASTER_KEY_FILE_NAME;
use reqwest::Url;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_HOME: &str = "CFWORKER_HOME";
pub const ENV_API_TARGET: &str = "CFWORKER_API_TARGET";
pub const ENV_STATS_URL: &str = "CFWORKER_STATS_URL";
pub const ENV_IP_URL: &str = "CFWORKER_IP_URL";
pub const ENV_LOG_LEVEL: &str = "CFWORKER_LOG_LEVEL";

/// Deployment backend that serves `POST /createWorker`.
pub const DEFAULT_API_TARGET: &str = "https://cfworkerback-pages5.pages.dev";
const DEFAULT_DATA_DIR_NAME: &str = ".cfworker";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No `CFWORKER_HOME` and no home directory to derive a default from.
    NoDataDir,
    InvalidUrl { name: &'static str, value: String },
    CurrentDir(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDataDir => write!(
                f,
                "cannot locate a data directory; set {ENV_HOME} or HOME"
            ),
            Self::InvalidUrl { name, value } => {
                write!(f, "{name} must be an absolute http(s) URL, got `{value}`")
            }
            Self::CurrentDir(details) => write!(f, "cannot resolve current directory: {details}"),
        }
    }
}

impl Error for ConfigError {}

/// Values given explicitly (CLI flags); `None` defers to env and defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub api_target: Option<String>,
    pub stats_url: Option<String>,
    pub ip_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub api_target: String,
    pub stats_url: String,
    pub ip_url: String,
    pub http_timeout: Duration,
    pub log_level: String,
}

impl AppConfig {
    /// Resolves configuration against the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolves configuration with a custom variable lookup.
    pub fn resolve_with<L>(overrides: ConfigOverrides, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let data_dir = match overrides.data_dir.or_else(|| env(ENV_HOME).map(PathBuf::from)) {
            Some(dir) => dir,
            None => env("HOME")
                .or_else(|| env("USERPROFILE"))
                .map(|home| Path::new(&home).join(DEFAULT_DATA_DIR_NAME))
                .ok_or(ConfigError::NoDataDir)?,
        };

        let api_target = overrides
            .api_target
            .or_else(|| env(ENV_API_TARGET))
            .unwrap_or_else(|| DEFAULT_API_TARGET.to_string());
        let stats_url = overrides
            .stats_url
            .or_else(|| env(ENV_STATS_URL))
            .unwrap_or_else(|| DEFAULT_STATS_URL.to_string());
        let ip_url = overrides
            .ip_url
            .or_else(|| env(ENV_IP_URL))
            .unwrap_or_else(|| DEFAULT_IP_URL.to_string());
        let log_level = overrides
            .log_level
            .or_else(|| env(ENV_LOG_LEVEL))
            .unwrap_or_else(|| default_log_level().to_string());

        Ok(Self {
            data_dir: absolutize(data_dir)?,
            api_target: validate_url(ENV_API_TARGET, api_target)?,
            stats_url: validate_url(ENV_STATS_URL, stats_url)?,
            ip_url: validate_url(ENV_IP_URL, ip_url)?,
            http_timeout: DEFAULT_TIMEOUT,
            log_level,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn master_key_path(&self) -> PathBuf {
        self.data_dir.join(MASTER_KEY_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|err| ConfigError::CurrentDir(err.to_string()))
}

fn validate_url(name: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim().trim_end_matches('/').to_string();
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        _ => Err(ConfigError::InvalidUrl { name, value }),
    }
}
