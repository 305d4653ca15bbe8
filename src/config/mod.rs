mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub allowlist: AllowlistConfig,
}

/// Gateway server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Upstream provider identity and per-provider wire details
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider name; requests are mounted at `/api/<name>/`
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// Built-in upstream address used when no override is configured
    #[serde(default = "default_provider_url")]
    pub default_url: String,
    /// Provider-specific streaming-mode header forwarded verbatim
    #[serde(default = "default_stream_header")]
    pub stream_header: String,
    /// Value sent for the streaming-mode header when the caller omits it
    #[serde(default = "default_stream_header_value")]
    pub stream_header_default: String,
    /// Additional inbound headers forwarded verbatim when present
    #[serde(default)]
    pub forward_headers: Vec<String>,
}

fn default_provider_name() -> String {
    "alibaba".to_string()
}

fn default_provider_url() -> String {
    "https://dashscope.aliyuncs.com".to_string()
}

fn default_stream_header() -> String {
    "X-DashScope-SSE".to_string()
}

fn default_stream_header_value() -> String {
    "disable".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            default_url: default_provider_url(),
            stream_header: default_stream_header(),
            stream_header_default: default_stream_header_value(),
            forward_headers: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// The fixed path segment that identifies this provider on the inbound side
    pub fn mount_prefix(&self) -> String {
        format!("/api/{}/", self.name)
    }
}

/// Upstream address override and call bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Override of the provider's built-in address; empty means use the default
    #[serde(default)]
    pub url: String,
    /// Hard bound on one outbound call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    600
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// Resolve and normalize the upstream base address.
    ///
    /// Uses the configured override when set, the provider default otherwise.
    /// The result always carries a scheme and never a trailing slash; running
    /// it through again changes nothing.
    pub fn base_url(&self, default_url: &str) -> String {
        let raw = if self.url.is_empty() {
            default_url
        } else {
            self.url.as_str()
        };

        let mut base = if raw.starts_with("http") {
            raw.to_string()
        } else {
            format!("https://{raw}")
        };

        if base.ends_with('/') {
            base.pop();
        }

        base
    }
}

/// Access control configuration for inbound requests
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Server-side access codes; empty disables access control entirely
    #[serde(default)]
    pub access_codes: Vec<String>,
    /// Accept callers that bring their own provider API key
    #[serde(default = "default_allow_user_api_key")]
    pub allow_user_api_key: bool,
}

fn default_allow_user_api_key() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_codes: Vec::new(),
            allow_user_api_key: default_allow_user_api_key(),
        }
    }
}

/// Model-allowlist configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AllowlistConfig {
    /// Comma-separated rule list (e.g. "-all,+qwen-max"); empty disables the gate
    #[serde(default)]
    pub custom_models: String,
}

impl AllowlistConfig {
    pub fn is_active(&self) -> bool {
        !self.custom_models.is_empty()
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration with fallback to default path
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::from_file(path),
            None => {
                // Try default locations
                let default_paths = ["config.yaml", "config.yml", "./config/config.yaml"];
                for p in default_paths {
                    let path = Path::new(p);
                    if path.exists() {
                        return Self::from_file(path);
                    }
                }
                Err(ConfigError::NotFound(
                    "No config file found. Tried: config.yaml, config.yml, ./config/config.yaml"
                        .to_string(),
                ))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
