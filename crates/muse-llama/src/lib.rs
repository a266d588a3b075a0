//! llama-server supervision and transport for Muse.
//!
//! This crate owns the local inference engine: it locates the
//! llama-server binary and a model, spawns the process bound to
//! loopback, watches its health, restarts it within a bounded budget,
//! and exposes a typed HTTP client for completions and chat.

mod client;
mod config;
mod error;
pub mod paths;
mod supervisor;

pub use client::{
    ChatMessage, CompletionRequest, CompletionResponse, InferenceClient, Timings,
};
pub use config::{ResolvedConfig, ServerConfig, ServerConfigBuilder};
pub use error::LlamaError;
pub use supervisor::{ServerState, ServerStatus, ServerSupervisor};

/// Default port for the supervised llama-server instance.
pub const DEFAULT_PORT: u16 = 6873;
