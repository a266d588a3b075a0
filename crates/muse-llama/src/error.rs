//! Error types for the llama-server layer.

use thiserror::Error;

/// Errors that can occur while supervising or talking to llama-server.
#[derive(Debug, Error)]
pub enum LlamaError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// No usable executable/model configuration could be resolved.
    /// Not retryable until the configuration changes.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The llama-server process could not be spawned.
    #[error("Failed to spawn llama-server: {0}")]
    SpawnFailed(String),

    /// The server process never answered its health probe.
    #[error("Server not ready after {attempts} health probes")]
    ReadinessTimeout { attempts: u32 },

    /// Too many consecutive start failures; supervision has given up.
    #[error("Server crashed after {failures} consecutive start failures")]
    Crashed { failures: u32 },

    /// Server is not running or not reachable.
    #[error("Server not reachable at {0}")]
    ServerUnavailable(String),

    /// A request exceeded its deadline.
    #[error("Request timed out")]
    Timeout,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlamaError {
    /// Whether a fresh `ensure_running` attempt could plausibly succeed
    /// without a configuration change.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LlamaError::ConfigurationMissing(_) | LlamaError::Crashed { .. }
        )
    }
}
