//! Configuration for cla-ledger
//!
//! Loaded once at startup from a TOML file, overridden by CLI flags and
//! environment variables, then shared read-only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::reconciler::{ReconcilerConfig, DEFAULT_STATUS_CONTEXT};
use crate::store::Agreement;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cla-ledger")
}

/// Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub cla: ClaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// URL this service is reachable at
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Public website URL, used for links in commit statuses
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Directory holding the static web app
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Timeout for outbound API calls in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaConfig {
    /// Agreement database (sled directory)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Status API credential
    #[serde(default)]
    pub token: Option<String>,

    /// Webhook shared secret
    #[serde(default)]
    pub hook_secret: Option<String>,

    /// OAuth application id
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth application secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Base URL of the status API
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Context string of the managed status
    #[serde(default = "default_context")]
    pub context: String,

    /// Agreements published at startup in addition to the canonical pair
    #[serde(default)]
    pub agreements: Vec<AgreementConfig>,
}

/// `[[cla.agreements]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementConfig {
    pub slug: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub is_entity: bool,
}

impl AgreementConfig {
    pub fn to_agreement(&self) -> Agreement {
        Agreement {
            title: self.title.clone(),
            url: self.url.clone(),
            is_entity: self.is_entity,
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_site_url() -> String {
    "https://liri.io".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("web/static")
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("cla.sled")
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_context() -> String {
    DEFAULT_STATUS_CONTEXT.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            base_url: default_base_url(),
            site_url: default_site_url(),
            static_dir: default_static_dir(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_slack_api_url(),
        }
    }
}

impl Default for ClaConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            token: None,
            hook_secret: None,
            client_id: None,
            client_secret: None,
            api_url: default_github_api_url(),
            context: default_context(),
            agreements: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(&self.cla.hook_secret) {
            return Err(ConfigError::Invalid(
                "cla.hook_secret is required (or set CLA_HOOK_SECRET)".to_string(),
            ));
        }
        if is_blank(&self.cla.token) {
            return Err(ConfigError::Invalid(
                "cla.token is required (or set CLA_TOKEN)".to_string(),
            ));
        }
        if self.cla.context.trim().is_empty() {
            return Err(ConfigError::Invalid("cla.context must not be empty".to_string()));
        }
        for agreement in &self.cla.agreements {
            if agreement.slug.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "cla.agreements entries need a slug".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// Settings for the status reconciler
    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            site_url: self.server.site_url.clone(),
            context: self.cla.context.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    /// One-line summary for the startup log, without secrets
    pub fn summary(&self) -> ConfigSummary<'_> {
        ConfigSummary(self)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

/// Display adapter that redacts credentials
pub struct ConfigSummary<'a>(&'a Config);

impl fmt::Display for ConfigSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.0;
        let set = |v: &Option<String>| if is_blank(v) { "unset" } else { "set" };
        write!(
            f,
            "listen={} site_url={} database={} api_url={} context={} token={} hook_secret={} oauth_client={} slack_token={}",
            c.server.listen,
            c.server.site_url,
            c.cla.database_path.display(),
            c.cla.api_url,
            c.cla.context,
            set(&c.cla.token),
            set(&c.cla.hook_secret),
            set(&c.cla.client_id),
            set(&c.slack.token),
        )
    }
}
