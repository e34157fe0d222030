//! # Configuration
//!
//! Client configuration loaded from TOML, with an environment overlay for the
//! service base address.
//!
//! # Example TOML
//!
//! ```toml
//! [service]
//! base_url = "http://localhost:8000"
//! timeout_secs = 30
//! field_name = "file"
//!
//! [output]
//! download_name = "cloaked_image"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Environment variable that overrides `service.base_url`.
pub const API_URL_ENV: &str = "INVISIFACE_API_URL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FIELD_NAME: &str = "file";
const DEFAULT_DOWNLOAD_NAME: &str = "cloaked_image";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the cloaking and verification services live and how to reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base address both endpoints hang off (e.g. "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout, surfaced as a transport error when exceeded
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Multipart field carrying the image bytes
    #[serde(default = "default_field_name")]
    pub field_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File stem used for downloaded cloaked images
    #[serde(default = "default_download_name")]
    pub download_name: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_field_name() -> String {
    DEFAULT_FIELD_NAME.to_string()
}

fn default_download_name() -> String {
    DEFAULT_DOWNLOAD_NAME.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            field_name: default_field_name(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_name: default_download_name(),
        }
    }
}

impl ServiceConfig {
    /// Defaults with the base address taken from [`API_URL_ENV`] when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Absolute URL for `path` under the base address.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }
}

impl ClientConfig {
    /// Load from `path` if given, otherwise start from defaults; then apply
    /// the environment overlay.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config: ClientConfig = match path {
            Some(path) => load_config(path)?,
            None => ClientConfig::default(),
        };
        config.service.apply_env();
        Ok(config)
    }
}
