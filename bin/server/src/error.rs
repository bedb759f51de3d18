//! Error types for the HTTP layer.
//!
//! [`ApiError`] is what handlers return; it renders as a JSON body
//! `{error, message, type}` with a status picked from the error kind.
//! [`StartupError`] covers everything that can stop the server from booting.

use atelier_ai::{ChatError, ChatErrorKind};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

/// A chat request that could not be served.
#[derive(Debug)]
pub enum ApiError {
    /// The bot check vetoed the request.
    BotDetected,
    /// The request body is not a chat request.
    InvalidBody { reason: String },
    /// The chat pipeline rejected the request.
    Chat(ChatError),
}

impl From<ChatError> for ApiError {
    fn from(error: ChatError) -> Self {
        Self::Chat(error)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BotDetected => write!(f, "Bot detected"),
            Self::InvalidBody { reason } => write!(f, "invalid chat request body: {reason}"),
            Self::Chat(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ApiError {}

fn status_for(kind: ChatErrorKind) -> StatusCode {
    match kind {
        ChatErrorKind::ConfigurationError => StatusCode::BAD_REQUEST,
        ChatErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
        ChatErrorKind::GatewayBillingRequired => StatusCode::PAYMENT_REQUIRED,
        ChatErrorKind::ApiError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BotDetected => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": "Bot detected" }))).into_response()
            }
            Self::InvalidBody { reason } => {
                tracing::debug!(%reason, "rejecting malformed chat request");
                let body = json!({
                    "error": "Invalid Request",
                    "message": reason,
                    "type": ChatErrorKind::ApiError,
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Chat(error) => {
                let kind = error.kind();
                let body = json!({
                    "error": error.title(),
                    "message": error.to_string(),
                    "type": kind,
                });
                (status_for(kind), Json(body)).into_response()
            }
        }
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded.
    Config { reason: String },
    /// The system prompt override could not be read.
    PromptUnreadable { path: PathBuf, reason: String },
    /// The HTTP client could not be built.
    HttpClient { reason: String },
    /// The listener could not be bound.
    Bind { addr: String, reason: String },
    /// The server stopped with an I/O error.
    Serve { reason: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::PromptUnreadable { path, reason } => {
                write!(f, "failed to read system prompt '{}': {reason}", path.display())
            }
            Self::HttpClient { reason } => write!(f, "failed to build HTTP client: {reason}"),
            Self::Bind { addr, reason } => write!(f, "failed to bind to '{addr}': {reason}"),
            Self::Serve { reason } => write!(f, "server error: {reason}"),
        }
    }
}

impl std::error::Error for StartupError {}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value as JsonValue;

    async fn render(error: ApiError) -> (StatusCode, JsonValue) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn chat_errors_map_to_status_and_type() {
        let cases = [
            (
                ChatError::Configuration {
                    reason: "no key".to_string(),
                },
                StatusCode::BAD_REQUEST,
                "configuration_error",
            ),
            (
                ChatError::ModelNotFound {
                    requested: "x".to_string(),
                    available: vec!["gpt-4".to_string()],
                },
                StatusCode::NOT_FOUND,
                "model_not_found",
            ),
            (
                ChatError::BillingRequired {
                    reason: "insufficient_funds".to_string(),
                },
                StatusCode::PAYMENT_REQUIRED,
                "gateway_billing_required",
            ),
            (
                ChatError::Api {
                    message: "upstream exploded".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
            ),
        ];
        for (error, expected_status, expected_type) in cases {
            let (status, body) = render(ApiError::Chat(error)).await;
            assert_eq!(status, expected_status);
            assert_eq!(body["type"], expected_type);
            assert!(body["error"].is_string());
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn bot_veto_is_forbidden() {
        let (status, body) = render(ApiError::BotDetected).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": "Bot detected" }));
    }

    #[test]
    fn startup_error_display() {
        let err = StartupError::Bind {
            addr: "127.0.0.1:3000".to_string(),
            reason: "address in use".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to bind to '127.0.0.1:3000': address in use"
        );
    }
}
