//! Error types for the assistance engine.

use thiserror::Error;

/// Errors surfaced by the engine's non-interactive paths.
///
/// The interactive completion path never returns these; it degrades to
/// silence instead.
#[derive(Debug, Error)]
pub enum AssistError {
    /// The inference backend failed.
    #[error("Backend error: {0}")]
    Backend(#[from] muse_llama::LlamaError),

    /// The engine could not be brought up.
    #[error("Inference engine is not ready: {0}")]
    NotReady(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_convert() {
        let err: AssistError = muse_llama::LlamaError::Timeout.into();
        assert!(matches!(err, AssistError::Backend(_)));
    }

    #[test]
    fn test_display_includes_detail() {
        let err = AssistError::NotReady("no model found".to_string());
        assert!(err.to_string().contains("no model found"));
    }
}
