//! AI pipeline for atelier chat.
//!
//! - **Models**: the registry of selectable models, backed by a gateway catalog
//! - **Options**: per-model request shaping, resolved from a dispatch table
//! - **Backend**: the streaming inference seam and its OpenAI-compatible client
//! - **Orchestrator**: the model/tool loop behind a single chat request
//!
//! The orchestrator writes UI events into a bounded [`stream::PartStream`];
//! turning those into a wire format is left to the transport.

pub mod backend;
pub mod error;
pub mod models;
pub mod openai;
pub mod options;
pub mod orchestrator;
pub mod stream;

pub use backend::{
    ChunkStream, InferenceRequest, LlmBackend, LlmMessage, LlmRole, StreamChunk, TokenUsage,
    to_model_messages,
};
pub use error::{CatalogError, ChatError, ChatErrorKind, LlmError};
pub use models::{
    DEFAULT_MODEL, GatewayCatalog, KnownModel, ModelCatalog, ModelDescriptor, ModelRegistry,
    PRIVILEGED_MODEL, fallback_models, find_model,
};
pub use openai::{ApiFlavor, ChunkDecoder, OpenAiCompatibleBackend};
pub use options::{ModelClass, ProviderOptions, ReasoningEffort, ResolveOptions, resolve};
pub use orchestrator::{
    ChatOrchestrator, ChatRequest, ChatRun, RunOutcome, RunSettings, RunState, StepBudget,
};
pub use stream::{MessageMetadata, PartStream, PartWriter, UiEvent};
