//! Configuration file loading and runtime settings.
//!
//! Values resolve with the precedence command line > config file > defaults.
//! The config file is TOML and every key is optional:
//!
//! ```toml
//! email = "name.surname@studenti.unimi.it"
//! output_dir = "/home/me/unimi"
//! ledger_path = "/home/me/.local/share/unimi-dl/downloaded.json"
//! concurrency = 3
//! max_concurrent_pages = 4
//! max_retries = 2
//! connect_timeout_secs = 30
//! read_timeout_secs = 600
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::page::DEFAULT_MAX_CONCURRENT_PAGES;
use crate::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
use crate::session::{DEFAULT_LOGIN_URL, HttpTimeouts, SessionConfig};
use crate::tree::DEFAULT_CATALOG_URL;

/// Directory name used under the platform config and data directories.
pub const APP_DIR_NAME: &str = "unimi-dl";

/// Ledger file name inside the data directory.
pub const LEDGER_FILE_NAME: &str = "downloaded.json";

/// Default number of attachments downloaded at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Login email.
    pub email: Option<String>,
    /// Where downloads are written.
    pub output_dir: Option<PathBuf>,
    /// Where the download ledger is kept.
    pub ledger_path: Option<PathBuf>,
    /// Attachments downloaded at once (1..=16).
    pub concurrency: Option<u8>,
    /// Page fetches in flight at once (1..=32).
    pub max_concurrent_pages: Option<u8>,
    /// Retries after a transient failure (0..=10).
    pub max_retries: Option<u32>,
    /// Connect timeout in seconds (1..=3600). Unset means none.
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds (1..=3600). Unset means none.
    pub read_timeout_secs: Option<u64>,
    /// Login endpoint override.
    pub login_url: Option<String>,
    /// Course catalog page override.
    pub catalog_url: Option<String>,
}

impl FileConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML, unknown keys or out-of-range values.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Invalid config syntax")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range key.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=16).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=16");
        }
        if let Some(pages) = self.max_concurrent_pages
            && !(1..=32).contains(&pages)
        {
            bail!("Invalid config value for `max_concurrent_pages`: {pages}. Expected range: 1..=32");
        }
        if let Some(retries) = self.max_retries
            && retries > 10
        {
            bail!("Invalid config value for `max_retries`: {retries}. Expected range: 0..=10");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        validate_url("login_url", self.login_url.as_deref())?;
        validate_url("catalog_url", self.catalog_url.as_deref())?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

fn validate_url(field: &str, value: Option<&str>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if url::Url::parse(value).is_err() {
        bail!("Invalid config value for `{field}`: '{value}' is not an absolute URL");
    }
    Ok(())
}

/// Loads `explicit` if given (it must exist), otherwise the default config
/// file if one exists.
///
/// # Errors
///
/// Returns an error if the chosen file cannot be read or is invalid.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return FileConfig::load(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => FileConfig::load(&path).map(Some),
        _ => Ok(None),
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/unimi-dl/config.toml`
/// 2. `$HOME/.config/unimi-dl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR_NAME).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join("config.toml"),
    )
}

/// Platform data directory for the application.
///
/// - Linux and others: `$XDG_DATA_HOME/unimi-dl` or `~/.local/share/unimi-dl`
/// - macOS: `~/Library/Application Support/unimi-dl`
/// - Windows: `%APPDATA%\unimi-dl`
#[must_use]
pub fn default_data_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return env_var_non_empty_os("APPDATA").map(|appdata| PathBuf::from(appdata).join(APP_DIR_NAME));
    }
    if cfg!(target_os = "macos") {
        return env_var_non_empty_os("HOME").map(|home| {
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join(APP_DIR_NAME)
        });
    }
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg_data_home).join(APP_DIR_NAME));
    }
    env_var_non_empty_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME)
    })
}

/// Default ledger location; falls back to the working directory when no
/// data directory can be determined.
#[must_use]
pub fn default_ledger_path() -> PathBuf {
    default_data_dir().map_or_else(|| PathBuf::from(LEDGER_FILE_NAME), |dir| dir.join(LEDGER_FILE_NAME))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Values given on the command line that take priority over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--email`
    pub email: Option<String>,
    /// `--output`
    pub output_dir: Option<PathBuf>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Login email, if known.
    pub email: Option<String>,
    /// Download root.
    pub output_dir: PathBuf,
    /// Ledger file.
    pub ledger_path: PathBuf,
    /// Attachments downloaded at once.
    pub concurrency: usize,
    /// Page fetches in flight at once.
    pub max_concurrent_pages: usize,
    /// Retries after a transient failure.
    pub max_retries: u32,
    /// Client timeouts.
    pub timeouts: HttpTimeouts,
    /// Login endpoint.
    pub login_url: String,
    /// Course catalog page.
    pub catalog_url: String,
}

impl Settings {
    /// Merges command line values, the config file and defaults.
    #[must_use]
    pub fn resolve(cli: &CliOverrides, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        Self {
            email: cli.email.clone().or(file.email),
            output_dir: cli
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            ledger_path: file.ledger_path.unwrap_or_else(default_ledger_path),
            concurrency: file.concurrency.map_or(DEFAULT_CONCURRENCY, usize::from),
            max_concurrent_pages: file
                .max_concurrent_pages
                .map_or(DEFAULT_MAX_CONCURRENT_PAGES, usize::from),
            max_retries: file.max_retries.unwrap_or(DEFAULT_MAX_RETRIES - 1),
            timeouts: HttpTimeouts {
                connect: file.connect_timeout_secs.map(Duration::from_secs),
                read: file.read_timeout_secs.map(Duration::from_secs),
            },
            login_url: file.login_url.unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            catalog_url: file
                .catalog_url
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
        }
    }

    /// Retry policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries.saturating_add(1))
    }

    /// Session settings derived from these values.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            login_url: self.login_url.clone(),
            timeouts: self.timeouts,
        }
    }
}
