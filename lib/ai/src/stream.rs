//! Output channel between the orchestrator and the transport.
//!
//! A run has exactly one producer ([`PartWriter`]) and one consumer
//! ([`PartStream`]). The channel is bounded, so a slow client applies
//! backpressure to the model stream. Dropping the consumer cancels the run.

use atelier_core::MessageId;
use futures::Stream;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

/// Metadata attached to the assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageMetadata {
    /// Display name of the model that served the request.
    pub model: String,
}

/// One event of the UI message stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        message_id: MessageId,
        message_metadata: MessageMetadata,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: JsonValue,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        tool_call_id: String,
        output: JsonValue,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    FinishStep,
    #[serde(rename_all = "camelCase")]
    Finish { message_metadata: MessageMetadata },
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
}

/// The consumer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("part stream consumer disconnected")
    }
}

impl std::error::Error for StreamClosed {}

/// Creates a bounded output channel.
#[must_use]
pub fn channel(buffer: usize) -> (PartWriter, PartStream) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let cancel = CancellationToken::new();
    let writer = PartWriter {
        tx,
        cancel: cancel.clone(),
        open: None,
        next_block: 0,
    };
    let stream = PartStream {
        inner: ReceiverStream::new(rx),
        _cancel_on_drop: cancel.drop_guard(),
    };
    (writer, stream)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Reasoning,
}

/// Producer half. Tracks the open text or reasoning block so deltas are
/// always framed by matching start and end events.
#[derive(Debug)]
pub struct PartWriter {
    tx: mpsc::Sender<UiEvent>,
    cancel: CancellationToken,
    open: Option<(BlockKind, String)>,
    next_block: u32,
}

impl PartWriter {
    /// Resolves once the consumer has gone away.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether the consumer has gone away.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Sends one event, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClosed`] if the consumer is gone.
    pub async fn send(&self, event: UiEvent) -> Result<(), StreamClosed> {
        if self.cancel.is_cancelled() {
            return Err(StreamClosed);
        }
        self.tx.send(event).await.map_err(|_| StreamClosed)
    }

    /// Appends answer text, opening a text block if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClosed`] if the consumer is gone.
    pub async fn text_delta(&mut self, delta: String) -> Result<(), StreamClosed> {
        let id = self.ensure_open(BlockKind::Text).await?;
        self.send(UiEvent::TextDelta { id, delta }).await
    }

    /// Appends reasoning text, opening a reasoning block if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClosed`] if the consumer is gone.
    pub async fn reasoning_delta(&mut self, delta: String) -> Result<(), StreamClosed> {
        let id = self.ensure_open(BlockKind::Reasoning).await?;
        self.send(UiEvent::ReasoningDelta { id, delta }).await
    }

    /// Ends the open block, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClosed`] if the consumer is gone.
    pub async fn close_block(&mut self) -> Result<(), StreamClosed> {
        match self.open.take() {
            Some((BlockKind::Text, id)) => self.send(UiEvent::TextEnd { id }).await,
            Some((BlockKind::Reasoning, id)) => self.send(UiEvent::ReasoningEnd { id }).await,
            None => Ok(()),
        }
    }

    async fn ensure_open(&mut self, kind: BlockKind) -> Result<String, StreamClosed> {
        if let Some((open_kind, id)) = &self.open {
            if *open_kind == kind {
                return Ok(id.clone());
            }
        }
        self.close_block().await?;

        let id = format!("{}-{}", kind.prefix(), self.next_block);
        self.next_block += 1;
        let event = match kind {
            BlockKind::Text => UiEvent::TextStart { id: id.clone() },
            BlockKind::Reasoning => UiEvent::ReasoningStart { id: id.clone() },
        };
        self.send(event).await?;
        self.open = Some((kind, id.clone()));
        Ok(id)
    }
}

impl BlockKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Reasoning => "reasoning",
        }
    }
}

/// Consumer half. Ends after the producer's last event.
#[derive(Debug)]
pub struct PartStream {
    inner: ReceiverStream<UiEvent>,
    _cancel_on_drop: DropGuard,
}

impl Stream for PartStream {
    type Item = UiEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
