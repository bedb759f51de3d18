//! Shared application state.
//!
//! Built once from [`ServerConfig`]. Nothing here holds a live provider
//! connection: every chat request asks the [`ProviderFactory`] for a fresh
//! backend and gets its own [`ChatOrchestrator`].

use crate::bot::{BotCheck, UserAgentDenylist};
use crate::config::{ProviderEndpoint, ServerConfig};
use crate::error::StartupError;
use crate::tools::application_tools;
use atelier_ai::{
    ApiFlavor, ChatOrchestrator, GatewayCatalog, LlmBackend, ModelRegistry,
    OpenAiCompatibleBackend, RunSettings,
};
use atelier_conversation::ToolRegistry;
use rootcause::Report;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SYSTEM_PROMPT: &str = include_str!("prompt.md");

/// Source of inference backends.
pub trait ProviderFactory: Send + Sync {
    /// Whether a credential for the upstream is configured.
    fn credential_configured(&self) -> bool;

    /// Creates a backend for one request.
    fn backend(&self) -> Arc<dyn LlmBackend>;
}

/// Provider built from the server configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    flavor: ApiFlavor,
    timeout: Duration,
}

impl ConfiguredProvider {
    /// Creates a provider for the configured endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: &ProviderEndpoint, timeout: Duration) -> Self {
        let (base_url, api_key, flavor) = match endpoint {
            ProviderEndpoint::Direct { base_url, api_key } => {
                (base_url.clone(), api_key.clone(), ApiFlavor::Direct)
            }
            ProviderEndpoint::Gateway { base_url, api_key } => {
                (base_url.clone(), api_key.clone(), ApiFlavor::Gateway)
            }
        };
        Self {
            client,
            base_url,
            api_key,
            flavor,
            timeout,
        }
    }
}

impl ProviderFactory for ConfiguredProvider {
    fn credential_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn backend(&self) -> Arc<dyn LlmBackend> {
        Arc::new(
            OpenAiCompatibleBackend::new(
                self.client.clone(),
                self.base_url.clone(),
                self.api_key.clone().unwrap_or_default(),
                self.flavor,
            )
            .with_timeout(self.timeout),
        )
    }
}

/// Chat settings shared by every run.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub system_prompt: String,
    pub max_steps: u32,
    pub stream_buffer: usize,
}

/// Application state shared by all handlers.
pub struct AppState {
    pub registry: ModelRegistry,
    pub provider: Arc<dyn ProviderFactory>,
    pub tools: Arc<ToolRegistry>,
    pub bot_check: Arc<dyn BotCheck>,
    pub chat: ChatSettings,
}

impl AppState {
    /// Builds the state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the system
    /// prompt override cannot be read.
    pub fn from_config(config: &ServerConfig) -> Result<Self, Report<StartupError>> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("atelier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StartupError::HttpClient {
                reason: e.to_string(),
            })?;

        let endpoint = config.provider_endpoint();
        let registry = match &endpoint {
            ProviderEndpoint::Gateway { base_url, api_key } => {
                tracing::info!(%base_url, "using AI gateway with live model catalog");
                ModelRegistry::with_catalog(Arc::new(
                    GatewayCatalog::new(client.clone(), base_url.clone())
                        .with_api_key(api_key.clone())
                        .with_timeout(Duration::from_secs(config.catalog.timeout_secs)),
                ))
            }
            ProviderEndpoint::Direct { base_url, .. } => {
                tracing::info!(%base_url, "using OpenAI directly with built-in model list");
                ModelRegistry::fixed()
            }
        };
        let provider = ConfiguredProvider::new(
            client.clone(),
            &endpoint,
            Duration::from_secs(config.chat.request_timeout_secs),
        );
        if !provider.credential_configured() {
            tracing::warn!("no model credential configured; chat requests will be rejected");
        }

        let system_prompt = match &config.chat.system_prompt_path {
            Some(path) => {
                std::fs::read_to_string(path).map_err(|e| StartupError::PromptUnreadable {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Ok(Self {
            registry,
            provider: Arc::new(provider),
            tools: Arc::new(application_tools(
                client,
                config.resources.inventory_url.clone(),
            )),
            bot_check: Arc::new(UserAgentDenylist::new(config.bot_check.patterns())),
            chat: ChatSettings {
                system_prompt,
                max_steps: config.chat.max_steps,
                stream_buffer: config.chat.stream_buffer,
            },
        })
    }

    /// Creates the orchestrator for one chat request.
    #[must_use]
    pub fn orchestrator(&self) -> ChatOrchestrator {
        let settings = RunSettings {
            credential_configured: self.provider.credential_configured(),
            system_prompt: self.chat.system_prompt.clone(),
            max_steps: self.chat.max_steps,
            stream_buffer: self.chat.stream_buffer,
        };
        ChatOrchestrator::new(self.provider.backend(), Arc::clone(&self.tools), settings)
    }
}
