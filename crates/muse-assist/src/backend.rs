//! Seam between the engine and the inference transport.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use muse_llama::{ChatMessage, CompletionRequest, ServerSupervisor};

use crate::error::AssistError;

/// Consecutive failures before the supervisor is asked to look at the
/// server.
const FAILURE_THRESHOLD: u32 = 3;

/// What the engine needs from an inference provider.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Raw text completion for a prompt.
    async fn completion(
        &self,
        prompt: &str,
        max_tokens: i32,
        stop: Vec<String>,
    ) -> Result<String, AssistError>;

    /// Conversational answer to a message.
    async fn chat(
        &self,
        system: &str,
        message: &str,
        max_tokens: i32,
    ) -> Result<String, AssistError>;

    /// Bring the provider up; false when it cannot serve.
    async fn ensure_ready(&self) -> bool;
}

/// Production backend: the supervised llama-server.
///
/// Request failures are not retried here. They are counted, and after a
/// few in a row the supervisor is prodded so the health machinery can
/// decide whether the server needs a restart.
pub struct LlamaBackend {
    supervisor: Arc<ServerSupervisor>,
    failures: AtomicU32,
}

impl LlamaBackend {
    pub fn new(supervisor: Arc<ServerSupervisor>) -> Self {
        Self {
            supervisor,
            failures: AtomicU32::new(0),
        }
    }

    fn record<T>(&self, result: Result<T, muse_llama::LlamaError>) -> Result<T, AssistError> {
        match result {
            Ok(value) => {
                self.failures.store(0, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= FAILURE_THRESHOLD {
                    warn!(
                        "{} consecutive inference failures, checking the server",
                        failures
                    );
                    self.failures.store(0, Ordering::Relaxed);
                    let supervisor = Arc::clone(&self.supervisor);
                    tokio::spawn(async move {
                        if let Err(err) = supervisor.ensure_running().await {
                            warn!("Server recovery failed: {}", err);
                        }
                    });
                }
                Err(AssistError::Backend(err))
            }
        }
    }
}

#[async_trait]
impl InferenceBackend for LlamaBackend {
    async fn completion(
        &self,
        prompt: &str,
        max_tokens: i32,
        stop: Vec<String>,
    ) -> Result<String, AssistError> {
        let request = CompletionRequest::new(prompt, max_tokens).with_stop(stop);
        let result = self
            .supervisor
            .client()
            .completion(&request)
            .await
            .map(|r| r.content);
        self.record(result)
    }

    async fn chat(
        &self,
        system: &str,
        message: &str,
        max_tokens: i32,
    ) -> Result<String, AssistError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(message)];
        let result = self.supervisor.client().chat(messages, max_tokens).await;
        self.record(result)
    }

    async fn ensure_ready(&self) -> bool {
        match self.supervisor.ensure_running().await {
            Ok(()) => true,
            Err(err) => {
                warn!("Inference server unavailable: {}", err);
                false
            }
        }
    }
}
