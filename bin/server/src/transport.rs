//! SSE transport for chat runs.
//!
//! Each UI event becomes one `data: {json}` event; the stream is terminated
//! with `data: [DONE]` once the run closes its part stream. Dropping the
//! response body (client disconnect) drops the part stream, which cancels
//! the run.

use atelier_ai::{ChatRun, UiEvent};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream, StreamExt};

/// Header announcing the UI message stream protocol version.
pub const UI_MESSAGE_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";

const DONE: &str = "[DONE]";

/// Streams a started run to the client.
pub fn sse_response(run: ChatRun) -> Response {
    tracing::debug!(run_id = %run.id, model = %run.model.id, "streaming chat run");
    // The run task owns its own logging; the handle is not needed here.
    let ChatRun { stream, .. } = run;
    let sse = Sse::new(sse_events(stream)).keep_alive(KeepAlive::default());
    ([(UI_MESSAGE_STREAM_HEADER, "v1")], sse).into_response()
}

fn sse_events(
    events: impl Stream<Item = UiEvent> + Send + 'static,
) -> impl Stream<Item = Result<Event, axum::Error>> + Send + 'static {
    events
        .map(|event| Event::default().json_data(event))
        .chain(stream::once(async { Ok(Event::default().data(DONE)) }))
}
