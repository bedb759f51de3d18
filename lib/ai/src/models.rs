//! Model registry.
//!
//! Enumerates the models a chat request may select. When a remote gateway
//! catalog is configured it is fetched on every call; any failure falls back
//! to a built-in list so callers always receive a usable, non-empty list.

use crate::error::CatalogError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Stable model identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

impl ModelDescriptor {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Models the application knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownModel {
    /// `gpt-3.5-turbo`, the default when a request names no model.
    OpenAiGpt35Turbo,
    /// `gpt-4`.
    OpenAiGpt4,
    /// `amazon/nova-pro`.
    AmazonNovaPro,
    /// `anthropic/claude-4-sonnet`, served with prompt caching.
    AnthropicClaude4Sonnet,
    /// `google/gemini-2.5-flash`.
    GoogleGeminiFlash,
    /// `moonshotai/kimi-k2`.
    MoonshotKimiK2,
    /// `gpt-5`, always offered when a live catalog is in use.
    OpenAiGpt5,
    /// `xai/grok-3-fast`.
    XaiGrok3Fast,
}

impl KnownModel {
    /// All known models.
    pub const ALL: [KnownModel; 8] = [
        Self::OpenAiGpt35Turbo,
        Self::OpenAiGpt4,
        Self::AmazonNovaPro,
        Self::AnthropicClaude4Sonnet,
        Self::GoogleGeminiFlash,
        Self::MoonshotKimiK2,
        Self::OpenAiGpt5,
        Self::XaiGrok3Fast,
    ];

    /// Returns the model identifier.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::OpenAiGpt35Turbo => "gpt-3.5-turbo",
            Self::OpenAiGpt4 => "gpt-4",
            Self::AmazonNovaPro => "amazon/nova-pro",
            Self::AnthropicClaude4Sonnet => "anthropic/claude-4-sonnet",
            Self::GoogleGeminiFlash => "google/gemini-2.5-flash",
            Self::MoonshotKimiK2 => "moonshotai/kimi-k2",
            Self::OpenAiGpt5 => "gpt-5",
            Self::XaiGrok3Fast => "xai/grok-3-fast",
        }
    }
}

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: KnownModel = KnownModel::OpenAiGpt35Turbo;

/// Model always appended to a live catalog.
pub const PRIVILEGED_MODEL: KnownModel = KnownModel::OpenAiGpt5;

/// The built-in list served when no live catalog is available.
#[must_use]
pub fn fallback_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new(KnownModel::OpenAiGpt35Turbo.id(), "GPT-3.5 Turbo"),
        ModelDescriptor::new(KnownModel::OpenAiGpt4.id(), "GPT-4"),
    ]
}

fn privileged_model() -> ModelDescriptor {
    ModelDescriptor::new(PRIVILEGED_MODEL.id(), "GPT-5")
}

/// Finds a model by id.
#[must_use]
pub fn find_model<'a>(models: &'a [ModelDescriptor], id: &str) -> Option<&'a ModelDescriptor> {
    models.iter().find(|model| model.id == id)
}

/// Source of a live model catalog.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Fetches the currently available models.
    ///
    /// # Errors
    ///
    /// Returns an error on network, authentication or parse failures.
    async fn fetch_models(&self) -> atelier_core::Result<Vec<ModelDescriptor>, CatalogError>;
}

/// Catalog served by an OpenAI-compatible gateway at `{base_url}/models`.
#[derive(Debug, Clone)]
pub struct GatewayCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GatewayCatalog {
    /// Creates a catalog client for the given gateway.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// Sets the bearer token sent to the gateway.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct CatalogResponse {
    data: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

/// Parses a gateway catalog body (`{"data": [{"id", "name"?}]}`).
///
/// # Errors
///
/// Returns an error if the body is not a catalog document.
pub fn parse_catalog(body: &str) -> Result<Vec<ModelDescriptor>, CatalogError> {
    let response: CatalogResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::Malformed {
            reason: e.to_string(),
        })?;
    Ok(response
        .data
        .into_iter()
        .map(|entry| ModelDescriptor {
            name: entry.name.unwrap_or_else(|| entry.id.clone()),
            id: entry.id,
        })
        .collect())
}

#[async_trait]
impl ModelCatalog for GatewayCatalog {
    #[tracing::instrument(skip(self), fields(endpoint = %self.models_url()))]
    async fn fetch_models(&self) -> atelier_core::Result<Vec<ModelDescriptor>, CatalogError> {
        let endpoint = self.models_url();
        let mut request = self.client.get(&endpoint).timeout(self.timeout);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| CatalogError::Unreachable {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Rejected {
                endpoint,
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await.map_err(|e| CatalogError::Unreachable {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;
        let models = parse_catalog(&body)?;
        tracing::debug!(model_count = models.len(), "fetched model catalog");
        Ok(models)
    }
}

/// Lists selectable models, degrading to the built-in list on failure.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    catalog: Option<Arc<dyn ModelCatalog>>,
}

impl ModelRegistry {
    /// A registry that only serves the built-in list.
    #[must_use]
    pub fn fixed() -> Self {
        Self { catalog: None }
    }

    /// A registry backed by a live catalog.
    #[must_use]
    pub fn with_catalog(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// Lists available models. Never fails and never returns an empty list.
    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        let Some(catalog) = &self.catalog else {
            return fallback_models();
        };

        match catalog.fetch_models().await {
            Ok(mut models) => {
                if find_model(&models, PRIVILEGED_MODEL.id()).is_none() {
                    models.push(privileged_model());
                }
                models
            }
            Err(error) => {
                tracing::warn!(%error, "failed to fetch models from gateway, using fallback list");
                fallback_models()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rootcause::Report;

    struct FixedCatalog(Vec<ModelDescriptor>);

    #[async_trait]
    impl ModelCatalog for FixedCatalog {
        async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, Report<CatalogError>> {
            Ok(self.0.clone())
        }
    }

    struct FailingCatalog;

    #[async_trait]
    impl ModelCatalog for FailingCatalog {
        async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, Report<CatalogError>> {
            Err(CatalogError::Unreachable {
                endpoint: "https://gateway.invalid/models".to_string(),
                reason: "connection refused".to_string(),
            }
            .into())
        }
    }

    fn ids(models: &[ModelDescriptor]) -> Vec<&str> {
        models.iter().map(|m| m.id.as_str()).collect()
    }

    /// Serves `/models` locally, answering with the given handler.
    async fn serve_catalog<H, T>(handler: H) -> String
    where
        H: axum::handler::Handler<T, ()>,
        T: 'static,
    {
        let app = axum::Router::new().route("/v1/models", axum::routing::get(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn gateway_catalog_sends_bearer_token() {
        let base = serve_catalog(|headers: axum::http::HeaderMap| async move {
            let authorized = headers
                .get(axum::http::header::AUTHORIZATION)
                .is_some_and(|value| value == "Bearer gw-key");
            if authorized {
                (
                    axum::http::StatusCode::OK,
                    r#"{"data":[{"id":"moonshotai/kimi-k2","name":"Kimi K2"}]}"#,
                )
            } else {
                (axum::http::StatusCode::UNAUTHORIZED, "")
            }
        })
        .await;

        let catalog = GatewayCatalog::new(reqwest::Client::new(), base)
            .with_api_key(Some("gw-key".to_string()));
        let models = catalog.fetch_models().await.expect("catalog");
        assert_eq!(models, vec![ModelDescriptor::new("moonshotai/kimi-k2", "Kimi K2")]);
    }

    #[tokio::test]
    async fn gateway_server_error_is_rejected_and_registry_falls_back() {
        let base = serve_catalog(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "oops") })
            .await;
        let catalog = GatewayCatalog::new(reqwest::Client::new(), base);

        let report = catalog.fetch_models().await.expect_err("rejected");
        assert!(matches!(
            report.current_context(),
            CatalogError::Rejected { status: 500, .. }
        ));

        let registry = ModelRegistry::with_catalog(Arc::new(catalog));
        assert_eq!(registry.list_models().await, fallback_models());
    }

    #[tokio::test]
    async fn slow_gateway_times_out_and_registry_falls_back() {
        let base = serve_catalog(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            r#"{"data":[]}"#
        })
        .await;
        let catalog = GatewayCatalog::new(reqwest::Client::new(), base)
            .with_timeout(Duration::from_millis(50));

        let report = catalog.fetch_models().await.expect_err("timed out");
        assert!(matches!(
            report.current_context(),
            CatalogError::Unreachable { .. }
        ));

        let registry = ModelRegistry::with_catalog(Arc::new(catalog));
        assert_eq!(registry.list_models().await, fallback_models());
    }

    #[tokio::test]
    async fn fixed_registry_serves_fallback_list() {
        let models = ModelRegistry::fixed().list_models().await;
        assert_eq!(ids(&models), ["gpt-3.5-turbo", "gpt-4"]);
    }

    #[tokio::test]
    async fn failing_catalog_falls_back() {
        let registry = ModelRegistry::with_catalog(Arc::new(FailingCatalog));
        let models = registry.list_models().await;
        assert!(!models.is_empty());
        assert_eq!(models, fallback_models());
    }

    #[tokio::test]
    async fn live_catalog_gets_privileged_model_appended() {
        let registry = ModelRegistry::with_catalog(Arc::new(FixedCatalog(vec![
            ModelDescriptor::new("xai/grok-3-fast", "Grok 3 Fast"),
        ])));
        let models = registry.list_models().await;
        assert_eq!(ids(&models), ["xai/grok-3-fast", "gpt-5"]);
        assert_eq!(models[1].name, "GPT-5");
    }

    #[tokio::test]
    async fn privileged_model_is_not_duplicated() {
        let registry = ModelRegistry::with_catalog(Arc::new(FixedCatalog(vec![
            ModelDescriptor::new("gpt-5", "GPT-5 (gateway)"),
        ])));
        let models = registry.list_models().await;
        assert_eq!(ids(&models), ["gpt-5"]);
    }

    #[tokio::test]
    async fn empty_live_catalog_still_offers_privileged_model() {
        let registry = ModelRegistry::with_catalog(Arc::new(FixedCatalog(Vec::new())));
        assert_eq!(ids(&registry.list_models().await), ["gpt-5"]);
    }

    #[test]
    fn parse_catalog_defaults_name_to_id() {
        let models = parse_catalog(
            r#"{"object":"list","data":[{"id":"amazon/nova-pro","name":"Nova Pro"},{"id":"moonshotai/kimi-k2"}]}"#,
        )
        .expect("parse");
        assert_eq!(models[0], ModelDescriptor::new("amazon/nova-pro", "Nova Pro"));
        assert_eq!(
            models[1],
            ModelDescriptor::new("moonshotai/kimi-k2", "moonshotai/kimi-k2")
        );
    }

    #[test]
    fn parse_catalog_rejects_garbage() {
        assert!(matches!(
            parse_catalog("<html>"),
            Err(CatalogError::Malformed { .. })
        ));
    }

    #[test]
    fn known_model_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        assert!(KnownModel::ALL.iter().all(|m| seen.insert(m.id())));
        assert_eq!(DEFAULT_MODEL.id(), "gpt-3.5-turbo");
    }

    #[test]
    fn find_model_matches_exact_id() {
        let models = fallback_models();
        assert_eq!(find_model(&models, "gpt-4").map(|m| m.name.as_str()), Some("GPT-4"));
        assert!(find_model(&models, "gpt-4o").is_none());
    }
}
