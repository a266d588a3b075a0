//! Local code-assistance engine.
//!
//! Wires the supervised llama-server from `muse-llama` behind an
//! admission gate and a multi-tier adaptive cache, and exposes the small
//! surface an editor integration needs: ensure the server is up, ask for
//! completions and chat answers, inspect status, dispose.
//!
//! The interactive path is built to say nothing rather than fail: a
//! filtered, superseded, or errored completion request resolves to
//! `None`, and only the conversational calls surface errors.

pub mod backend;
pub mod cache;
mod config;
mod engine;
mod error;
mod fingerprint;
pub mod gate;
pub mod heuristic;
pub mod language;
mod request;

pub use backend::{InferenceBackend, LlamaBackend};
pub use cache::{AdaptiveCache, CacheConfig, CacheStats};
pub use config::{AssistConfig, AssistConfigBuilder};
pub use engine::{AssistEngine, EngineStatus};
pub use error::AssistError;
pub use fingerprint::ContextFingerprint;
pub use gate::{GateConfig, RejectReason, RequestGate};
pub use language::LanguageProfile;
pub use request::{AssistRequest, CodeContext, Feature, Position, RequestKey};
