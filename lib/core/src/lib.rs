//! Core types shared by the atelier crates.
//!
//! This crate provides the foundational identifiers and the `Result` alias
//! used throughout the chat streaming pipeline.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ChatRunId, MessageId};
