//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `CatalogError`: Remote model catalog failures (always recovered locally)
//! - `LlmError`: Low-level inference backend operations
//! - `ChatError`: The four client-facing failure kinds of a chat request

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from fetching the remote model catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The catalog endpoint could not be reached.
    Unreachable { endpoint: String, reason: String },
    /// The catalog endpoint answered with a non-success status.
    Rejected { endpoint: String, status: u16 },
    /// The catalog response could not be parsed.
    Malformed { reason: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { endpoint, reason } => {
                write!(f, "model catalog '{endpoint}' unreachable: {reason}")
            }
            Self::Rejected { endpoint, status } => {
                write!(f, "model catalog '{endpoint}' returned HTTP {status}")
            }
            Self::Malformed { reason } => {
                write!(f, "failed to parse model catalog: {reason}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Provider is unavailable.
    ProviderUnavailable { provider: String, reason: String },
    /// Request failed.
    RequestFailed { reason: String },
    /// Upstream requires billing details or credits before serving requests.
    BillingRequired { reason: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// The stream broke after it started.
    StreamInterrupted { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "LLM provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::BillingRequired { reason } => {
                write!(f, "LLM provider requires billing: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::StreamInterrupted { reason } => {
                write!(f, "LLM stream interrupted: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
        }
    }
}

impl std::error::Error for LlmError {}

/// Wire tag of a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatErrorKind {
    /// No usable credential or endpoint.
    ConfigurationError,
    /// The requested model is not in the registry.
    ModelNotFound,
    /// Upstream billing precondition failed.
    GatewayBillingRequired,
    /// Any other upstream failure.
    ApiError,
}

impl ChatErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::ModelNotFound => "model_not_found",
            Self::GatewayBillingRequired => "gateway_billing_required",
            Self::ApiError => "api_error",
        }
    }
}

impl fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const BILLING_GUIDANCE: &str = "Add billing details or credits to your model provider account \
     (for OpenAI: https://platform.openai.com/account/billing) to continue using the AI features.";

/// A chat request that failed before any output was streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No usable model credential or endpoint is configured.
    Configuration { reason: String },
    /// The requested model id is not offered by the registry.
    ModelNotFound {
        requested: String,
        available: Vec<String>,
    },
    /// Upstream refused the request until billing is set up.
    BillingRequired { reason: String },
    /// Catch-all upstream failure.
    Api { message: String },
}

impl ChatError {
    /// Returns the client-facing kind.
    #[must_use]
    pub fn kind(&self) -> ChatErrorKind {
        match self {
            Self::Configuration { .. } => ChatErrorKind::ConfigurationError,
            Self::ModelNotFound { .. } => ChatErrorKind::ModelNotFound,
            Self::BillingRequired { .. } => ChatErrorKind::GatewayBillingRequired,
            Self::Api { .. } => ChatErrorKind::ApiError,
        }
    }

    /// Short human-readable title.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "Configuration Required",
            Self::ModelNotFound { .. } => "Model Not Found",
            Self::BillingRequired { .. } => "Gateway Billing Required",
            Self::Api { .. } => "API Error",
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => f.write_str(reason),
            Self::ModelNotFound {
                requested,
                available,
            } => write!(
                f,
                "Model {requested} not found. Available models: {}",
                available.join(", ")
            ),
            Self::BillingRequired { reason } => {
                write!(f, "{reason}. {BILLING_GUIDANCE}")
            }
            Self::Api { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<&LlmError> for ChatError {
    fn from(error: &LlmError) -> Self {
        match error {
            LlmError::BillingRequired { reason } => Self::BillingRequired {
                reason: reason.clone(),
            },
            other => Self::Api {
                message: other.to_string(),
            },
        }
    }
}
