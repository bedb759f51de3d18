//! Bot and abuse pre-check.
//!
//! Runs before anything else on a chat request. A veto short-circuits the
//! request with a 403 and never reaches the model registry or the
//! orchestrator.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;

/// Result of a bot check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotVerdict {
    pub is_bot: bool,
}

/// A pluggable request classifier.
#[async_trait]
pub trait BotCheck: Send + Sync {
    /// Classifies a request by its headers.
    async fn check(&self, headers: &HeaderMap) -> BotVerdict;
}

/// Rejects requests whose `User-Agent` contains a denied substring.
///
/// Matching is case-insensitive. With no patterns every request passes.
#[derive(Debug, Clone, Default)]
pub struct UserAgentDenylist {
    patterns: Vec<String>,
}

impl UserAgentDenylist {
    /// Creates a denylist from substrings.
    #[must_use]
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|pattern| pattern.to_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl BotCheck for UserAgentDenylist {
    async fn check(&self, headers: &HeaderMap) -> BotVerdict {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let matched = self
            .patterns
            .iter()
            .find(|pattern| user_agent.contains(pattern.as_str()));
        if let Some(pattern) = matched {
            tracing::info!(%user_agent, %pattern, "bot check vetoed request");
        }
        BotVerdict {
            is_bot: matched.is_some(),
        }
    }
}
