//! Sync configuration.
//!
//! Non-secret settings come from an optional TOML file at
//! `~/.config/evsync/config.toml`; secrets come only from the environment.
//! The result is a validated [`SyncConfig`] that is built once at start-up
//! and handed to the stores.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::Secret;
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

/// Ontology id tagging calendar events in the vault.
pub const EVENT_ONTOLOGY: &str = "880e8400-e29b-41d4-a716-446655440099";

pub const ENV_VAULT_TOKEN: &str = "PP_JWT_TOKEN";
pub const ENV_NEXTCLOUD_PASSWORD: &str = "NXT_PASSWORD";
pub const ENV_VAULT_URL: &str = "PP_VAULT_URL";
pub const ENV_ENAME: &str = "PP_ENAME";
pub const ENV_NEXTCLOUD_URL: &str = "NXT_BASE_URL";

fn default_nextcloud_user() -> String {
    "admin".to_string()
}

fn default_calendar_name() -> String {
    "Personal".to_string()
}

fn default_ontology() -> String {
    EVENT_ONTOLOGY.to_string()
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Nextcloud server, e.g. `https://cloud.example.com`
    pub base_url: Option<String>,

    #[serde(default = "default_nextcloud_user")]
    pub nextcloud_user: String,

    /// Display name of the calendar to sync with
    #[serde(default = "default_calendar_name")]
    pub calendar_name: String,

    /// Vault identity (`@...`)
    pub ename: Option<String>,

    #[serde(default = "default_ontology")]
    pub ontology: String,

    /// Vault base URL; takes precedence over `registry_url`
    pub vault_url: Option<String>,

    /// Registry used to resolve `ename` to a vault URL
    pub registry_url: Option<String>,

    /// Extra attempts for read requests. Writes are never retried.
    #[serde(default)]
    pub read_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            base_url: None,
            nextcloud_user: default_nextcloud_user(),
            calendar_name: default_calendar_name(),
            ename: None,
            ontology: default_ontology(),
            vault_url: None,
            registry_url: None,
            read_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl FileConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("evsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (expand(p), true),
            None => (Self::config_path()?, false),
        };

        if !path.exists() {
            if explicit {
                return Err(SyncError::Config(format!(
                    "Config file not found at {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(FileConfig::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            SyncError::Config(format!("Could not read {}: {e}", path.display()))
        })?;

        toml::from_str(&contents)
            .map_err(|e| SyncError::Config(format!("Could not parse {}: {e}", path.display())))
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

/// Where the vault lives.
#[derive(Debug, Clone, PartialEq)]
pub enum VaultEndpoint {
    Url(String),
    /// Resolve the ename through this registry first.
    Registry(String),
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub endpoint: VaultEndpoint,
    pub ename: String,
    pub ontology: String,
    pub token: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct NextcloudConfig {
    pub base_url: String,
    pub user: String,
    pub password: Secret<String>,
    pub calendar_name: String,
}

impl NextcloudConfig {
    /// DAV collection holding the user's calendars.
    pub fn dav_root(&self) -> String {
        format!(
            "{}/remote.php/dav/calendars/{}/",
            self.base_url.trim_end_matches('/'),
            self.user
        )
    }
}

/// Fixed retry for idempotent reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadRetry {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        ReadRetry {
            retries: 0,
            delay: Duration::from_millis(default_retry_delay_ms()),
        }
    }
}

/// Validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub vault: VaultConfig,
    pub nextcloud: NextcloudConfig,
    pub read_retry: ReadRetry,
}

impl SyncConfig {
    /// Combine the config file with the process environment.
    pub fn from_env(file: FileConfig) -> SyncResult<Self> {
        Self::build(file, |key| std::env::var(key).ok())
    }

    /// Combine the config file with values from `env`.
    pub fn build<F>(file: FileConfig, env: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let token = lookup(ENV_VAULT_TOKEN)
            .ok_or_else(|| SyncError::Config(format!("{ENV_VAULT_TOKEN} is not set")))?;
        let password = lookup(ENV_NEXTCLOUD_PASSWORD)
            .ok_or_else(|| SyncError::Config(format!("{ENV_NEXTCLOUD_PASSWORD} is not set")))?;

        let base_url = lookup(ENV_NEXTCLOUD_URL).or(file.base_url).ok_or_else(|| {
            SyncError::Config(format!(
                "No Nextcloud base_url configured (set it in config.toml or {ENV_NEXTCLOUD_URL})"
            ))
        })?;

        let ename = lookup(ENV_ENAME).or(file.ename).ok_or_else(|| {
            SyncError::Config(format!(
                "No vault ename configured (set it in config.toml or {ENV_ENAME})"
            ))
        })?;

        let endpoint = match (lookup(ENV_VAULT_URL).or(file.vault_url), file.registry_url) {
            (Some(url), _) => VaultEndpoint::Url(url),
            (None, Some(registry)) => VaultEndpoint::Registry(registry),
            (None, None) => {
                return Err(SyncError::Config(format!(
                    "No vault location configured (set vault_url or registry_url in config.toml, or {ENV_VAULT_URL})"
                )));
            }
        };

        Ok(SyncConfig {
            vault: VaultConfig {
                endpoint,
                ename,
                ontology: file.ontology,
                token: Secret::new(token),
            },
            nextcloud: NextcloudConfig {
                base_url,
                user: file.nextcloud_user,
                password: Secret::new(password),
                calendar_name: file.calendar_name,
            },
            read_retry: ReadRetry {
                retries: file.read_retries,
                delay: Duration::from_millis(file.retry_delay_ms),
            },
        })
    }
}
