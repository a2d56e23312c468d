// Configuration loading and parsing (client.toml).

use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api.base_url`.
pub const BASE_URL_ENV: &str = "FINMODEL_BASE_URL";

const CONFIG_FILE: &str = "client.toml";
const DEFAULT_PAGE_SIZE: u64 = 10;
const FALLBACK_STORE_FILE: &str = "finmodel-session.db";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("cannot seed {path} from defaults: {source}")]
    SeedError {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub pagination: PaginationConfig,
}

impl Config {
    /// Request timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.api.timeout_secs.map(Duration::from_secs)
    }

    /// Replace values with environment overrides. `lookup` is usually
    /// `std::env::var(..).ok()`; tests pass a closure instead of mutating the
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.api.base_url = url;
            validate(self)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire client.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ClientFile {
    api: ApiConfig,
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SessionSection {
    #[serde(default)]
    store_path: Option<PathBuf>,
    #[serde(default = "default_auto_refresh")]
    auto_refresh: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            store_path: None,
            auto_refresh: default_auto_refresh(),
        }
    }
}

/// Session persistence settings with the store path already resolved.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub store_path: PathBuf,
    pub auto_refresh: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_auto_refresh() -> bool {
    true
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/client.toml` relative to
/// `base_dir`. Does not copy defaults and does not read the environment.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = config_path(base_dir);
    let text = read_file(&path)?;
    parse_config(&text, &path)
}

/// Parse client.toml contents. `path` is only used for error reporting.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: ClientFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let store_path = file
        .session
        .store_path
        .unwrap_or_else(default_store_path);

    let config = Config {
        api: file.api,
        session: SessionConfig {
            store_path,
            auto_refresh: file.session.auto_refresh,
        },
        pagination: file.pagination,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/client.toml` from `defaults/client.toml` on first run.
///
/// Returns the path written, or `None` when there was nothing to do: the
/// user's copy exists (it is never overwritten) or no default ships.
pub fn ensure_client_config(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let defaults_file = base_dir.join("defaults").join(CONFIG_FILE);
    let target = config_path(base_dir);
    if target.exists() || !defaults_file.exists() {
        return Ok(None);
    }

    let seed_error = |source: std::io::Error| ConfigError::SeedError {
        path: target.clone(),
        source,
    };
    let contents = std::fs::read(&defaults_file).map_err(seed_error)?;
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(seed_error)?;
    }
    // create_new: a copy written by a concurrent first run wins.
    match OpenOptions::new().write(true).create_new(true).open(&target) {
        Ok(mut file) => file.write_all(&contents).map_err(seed_error)?,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(seed_error(e)),
    }
    Ok(Some(target))
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults first and applying environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_client_config(&cwd)?;
    let mut config = load_config_from(&cwd)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config_path(base_dir: &Path) -> PathBuf {
    base_dir.join("config").join(CONFIG_FILE)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Session database location when `session.store_path` is not set: the
/// platform data directory, or the working directory when none exists.
fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "finmodel")
        .map(|dirs| dirs.data_dir().join("session.db"))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_STORE_FILE))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = config.api.base_url.trim();
    if url.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "api.base_url".into(),
            message: "must not be empty".into(),
        });
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "api.base_url".into(),
            message: format!("must start with http:// or https://, got {url}"),
        });
    }

    if config.api.timeout_secs == Some(0) {
        return Err(ConfigError::ValidationError {
            field: "api.timeout_secs".into(),
            message: "must be > 0 when set".into(),
        });
    }

    if config.pagination.page_size == 0 {
        return Err(ConfigError::ValidationError {
            field: "pagination.page_size".into(),
            message: "must be > 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
