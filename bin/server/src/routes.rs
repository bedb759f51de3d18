//! HTTP handlers.

use crate::error::ApiError;
use crate::state::AppState;
use crate::transport::sse_response;
use atelier_ai::{ChatRequest, ModelDescriptor};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;

/// `GET /api/models`: the selectable models. Never fails.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelDescriptor>> {
    Json(state.registry.list_models().await)
}

/// `POST /api/chat`: streams a chat run as server-sent events.
#[tracing::instrument(skip_all)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if state.bot_check.check(&headers).await.is_bot {
        return Err(ApiError::BotDetected);
    }

    let (models, request) = tokio::join!(state.registry.list_models(), async {
        serde_json::from_slice::<ChatRequest>(&body)
    });
    let request = request.map_err(|e| ApiError::InvalidBody {
        reason: e.to_string(),
    })?;
    tracing::debug!(
        messages = request.messages.len(),
        model_id = ?request.model_id,
        available_models = models.len(),
        "chat request received"
    );

    let run = state.orchestrator().start(request, &models).await?;
    Ok(sse_response(run))
}
