//! Provider option resolution.
//!
//! Maps a model id to the provider-specific request shaping it needs. Model
//! ids are looked up in a finite table of model classes; anything not listed
//! falls through to [`ModelClass::Default`], which passes the id through
//! untouched. Resolution is pure and never fails.

use crate::models::KnownModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How much reasoning a reasoning-capable model should spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    #[default]
    Low,
    Medium,
}

impl ReasoningEffort {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
        }
    }
}

/// Caller-supplied resolution hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Overrides the default reasoning effort of reasoning models.
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Request-shaping class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelClass {
    /// No provider-specific shaping.
    Default,
    /// Reasoning model with encrypted reasoning, summaries and priority tier.
    AdvancedReasoning,
    /// Long-context model with ephemeral prompt caching and streamed tool input.
    PromptCaching,
}

/// Model ids with non-default shaping. Add a class by adding an entry.
const MODEL_CLASSES: &[(KnownModel, ModelClass)] = &[
    (KnownModel::OpenAiGpt5, ModelClass::AdvancedReasoning),
    (KnownModel::AnthropicClaude4Sonnet, ModelClass::PromptCaching),
];

const ENCRYPTED_REASONING_INCLUDE: &str = "reasoning.encrypted_content";
const ANTHROPIC_BETA_HEADER: &str = "anthropic-beta";
const FINE_GRAINED_TOOL_STREAMING: &str = "fine-grained-tool-streaming-2025-05-14";

/// Looks up the class of a model id.
#[must_use]
pub fn model_class(model_id: &str) -> ModelClass {
    MODEL_CLASSES
        .iter()
        .find(|(model, _)| model.id() == model_id)
        .map_or(ModelClass::Default, |(_, class)| *class)
}

/// Resolves the provider options for a model.
#[must_use]
pub fn resolve(model_id: &str, options: ResolveOptions) -> ProviderOptions {
    model_class(model_id).shape(model_id, options)
}

impl ModelClass {
    fn shape(self, model_id: &str, options: ResolveOptions) -> ProviderOptions {
        let base = ProviderOptions::passthrough(model_id);
        match self {
            Self::Default => base,
            Self::AdvancedReasoning => ProviderOptions {
                provider: Some(ProviderOptionBag::OpenAi(OpenAiOptions {
                    include: vec![ENCRYPTED_REASONING_INCLUDE.to_string()],
                    reasoning_effort: options.reasoning_effort.unwrap_or_default(),
                    reasoning_summary: ReasoningSummary::Auto,
                    service_tier: ServiceTier::Priority,
                })),
                ..base
            },
            Self::PromptCaching => ProviderOptions {
                headers: BTreeMap::from([(
                    ANTHROPIC_BETA_HEADER.to_string(),
                    FINE_GRAINED_TOOL_STREAMING.to_string(),
                )]),
                provider: Some(ProviderOptionBag::Anthropic(AnthropicOptions {
                    cache_control: CacheControl::Ephemeral,
                })),
                ..base
            },
        }
    }
}

/// Resolved, immutable request shaping for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOptions {
    /// The selected model id.
    pub model: String,
    /// Extra request headers.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Provider-specific option bag.
    #[serde(rename = "providerOptions", skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderOptionBag>,
}

impl ProviderOptions {
    /// Options that pass the model id through unchanged.
    #[must_use]
    pub fn passthrough(model_id: impl Into<String>) -> Self {
        Self {
            model: model_id.into(),
            headers: BTreeMap::new(),
            provider: None,
        }
    }

    /// Reasoning effort requested from the provider, if any.
    #[must_use]
    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        match &self.provider {
            Some(ProviderOptionBag::OpenAi(openai)) => Some(openai.reasoning_effort),
            _ => None,
        }
    }

    /// Service tier requested from the provider, if any.
    #[must_use]
    pub fn service_tier(&self) -> Option<ServiceTier> {
        match &self.provider {
            Some(ProviderOptionBag::OpenAi(openai)) => Some(openai.service_tier),
            _ => None,
        }
    }
}

/// Provider-namespaced options, serialized as `{"<provider>": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProviderOptionBag {
    #[serde(rename = "openai")]
    OpenAi(OpenAiOptions),
    #[serde(rename = "anthropic")]
    Anthropic(AnthropicOptions),
}

/// OpenAI responses options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiOptions {
    pub include: Vec<String>,
    pub reasoning_effort: ReasoningEffort,
    pub reasoning_summary: ReasoningSummary,
    pub service_tier: ServiceTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSummary {
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
    Priority,
}

impl ServiceTier {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
        }
    }
}

/// Anthropic options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnthropicOptions {
    pub cache_control: CacheControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheControl {
    Ephemeral,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_models_pass_through() {
        for id in ["gpt-4", "xai/grok-3-fast", "", "totally-made-up", "GPT-5"] {
            let options = resolve(
                id,
                ResolveOptions {
                    reasoning_effort: Some(ReasoningEffort::Medium),
                },
            );
            assert_eq!(options, ProviderOptions::passthrough(id));
            assert!(options.provider.is_none());
            assert!(options.headers.is_empty());
        }
    }

    #[test]
    fn reasoning_model_defaults_to_low_effort() {
        let options = resolve("gpt-5", ResolveOptions::default());
        assert_eq!(options.model, "gpt-5");
        assert_eq!(options.reasoning_effort(), Some(ReasoningEffort::Low));
        assert_eq!(options.service_tier(), Some(ServiceTier::Priority));
    }

    #[test]
    fn reasoning_effort_override_is_honored() {
        let options = resolve(
            "gpt-5",
            ResolveOptions {
                reasoning_effort: Some(ReasoningEffort::Medium),
            },
        );
        assert_eq!(options.reasoning_effort(), Some(ReasoningEffort::Medium));
    }

    #[test]
    fn reasoning_model_serializes_openai_bag() {
        let json = serde_json::to_value(resolve("gpt-5", ResolveOptions::default()))
            .expect("serialize");
        assert_eq!(
            json,
            json!({
                "model": "gpt-5",
                "providerOptions": {
                    "openai": {
                        "include": ["reasoning.encrypted_content"],
                        "reasoningEffort": "low",
                        "reasoningSummary": "auto",
                        "serviceTier": "priority"
                    }
                }
            })
        );
    }

    #[test]
    fn caching_model_gets_header_and_cache_directive() {
        let options = resolve("anthropic/claude-4-sonnet", ResolveOptions::default());
        assert_eq!(
            options.headers.get("anthropic-beta").map(String::as_str),
            Some("fine-grained-tool-streaming-2025-05-14")
        );
        assert_eq!(options.reasoning_effort(), None);
        let json = serde_json::to_value(&options).expect("serialize");
        assert_eq!(
            json["providerOptions"],
            json!({ "anthropic": { "cacheControl": { "type": "ephemeral" } } })
        );
    }

    #[test]
    fn class_table_lookup() {
        assert_eq!(model_class("gpt-5"), ModelClass::AdvancedReasoning);
        assert_eq!(
            model_class("anthropic/claude-4-sonnet"),
            ModelClass::PromptCaching
        );
        assert_eq!(model_class("gpt-3.5-turbo"), ModelClass::Default);
    }
}
