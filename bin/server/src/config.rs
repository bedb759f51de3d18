//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables. Provider keys
//! are flat (`OPENAI_API_KEY`, `AI_GATEWAY_BASE_URL`, ...); everything else is
//! grouped in sections addressed with a `__` separator, e.g.
//! `CHAT__MAX_STEPS=10`.

use serde::Deserialize;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// OpenAI API key. Required to serve chat requests in direct mode.
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL.
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Base URL of an OpenAI-compatible AI gateway.
    #[serde(default)]
    pub ai_gateway_base_url: Option<String>,

    /// API key for the AI gateway.
    #[serde(default)]
    pub ai_gateway_api_key: Option<String>,

    /// Talk to OpenAI directly even when a gateway is configured.
    #[serde(default)]
    pub use_direct_openai: bool,

    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding the built browser UI, served at `/`.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub bot_check: BotCheckConfig,

    #[serde(default)]
    pub resources: ResourcesConfig,
}

/// Which upstream serves model requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEndpoint {
    /// OpenAI itself, with the built-in model list.
    Direct { base_url: String, api_key: Option<String> },
    /// An AI gateway, with its live model catalog.
    Gateway { base_url: String, api_key: Option<String> },
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    /// Loads configuration from a prepared environment source.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Resolves the upstream endpoint. Empty values count as unset.
    #[must_use]
    pub fn provider_endpoint(&self) -> ProviderEndpoint {
        let openai_key = non_empty(self.openai_api_key.as_deref());
        match non_empty(self.ai_gateway_base_url.as_deref()) {
            Some(base_url) if !self.use_direct_openai => ProviderEndpoint::Gateway {
                base_url,
                api_key: non_empty(self.ai_gateway_api_key.as_deref()).or(openai_key),
            },
            _ => ProviderEndpoint::Direct {
                base_url: self.openai_base_url.clone(),
                api_key: openai_key,
            },
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

/// Chat run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Maximum tool executions per chat run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Number of UI events buffered ahead of a slow client.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,

    /// Replaces the built-in system prompt.
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,

    /// Seconds to wait for the upstream to start responding.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    20
}

fn default_stream_buffer() -> usize {
    64
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            stream_buffer: default_stream_buffer(),
            system_prompt_path: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Model catalog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Seconds to wait for the gateway catalog before falling back.
    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_catalog_timeout_secs() -> u64 {
    5
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_catalog_timeout_secs(),
        }
    }
}

/// Bot check configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotCheckConfig {
    /// Comma-separated User-Agent substrings to reject.
    #[serde(default)]
    pub denied_user_agents: String,
}

impl BotCheckConfig {
    /// The configured patterns, trimmed, without empties.
    #[must_use]
    pub fn patterns(&self) -> Vec<String> {
        self.denied_user_agents
            .split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Cloud resource inventory configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesConfig {
    /// URL returning the resource inventory as JSON.
    #[serde(default)]
    pub inventory_url: Option<String>,
}
