//! The assistance engine: the upward-facing API an editor integration
//! talks to.

use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tracing::{debug, info, warn};

use muse_llama::{ServerStatus, ServerSupervisor};

use crate::backend::{InferenceBackend, LlamaBackend};
use crate::cache::{AdaptiveCache, CacheStats};
use crate::config::AssistConfig;
use crate::error::AssistError;
use crate::gate::RequestGate;
use crate::heuristic;
use crate::language;
use crate::request::{AssistRequest, CodeContext, Feature};

const CHAT_SYSTEM_PROMPT: &str = "You are a concise programming assistant running locally. \
     Answer precisely and prefer code over prose.";

const EXPLAIN_SYSTEM_PROMPT: &str = "You explain code. Describe what the given snippet does \
     and point out anything subtle. Be brief.";

/// Longest prefix tail forwarded to the model.
const PROMPT_TAIL_CHARS: usize = 2000;

/// Aggregate status surfaced to the editor.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub ready: bool,
    pub server: ServerStatus,
    pub cache: CacheStats,
    pub quiet: bool,
    pub in_flight: usize,
    pub last_error: Option<String>,
}

/// Facade wiring the gate, the cache, and the inference backend
/// together.
pub struct AssistEngine {
    config: AssistConfig,
    supervisor: Arc<ServerSupervisor>,
    backend: Arc<dyn InferenceBackend>,
    cache: Arc<AdaptiveCache>,
    gate: Arc<RequestGate>,
    last_error: Mutex<Option<String>>,
}

impl AssistEngine {
    /// Build an engine over a supervised llama-server and start its
    /// health monitor. Must be called within a tokio runtime.
    pub fn new(config: AssistConfig) -> Self {
        let supervisor = ServerSupervisor::new(config.server.clone());
        supervisor.spawn_monitor();
        let backend = Arc::new(LlamaBackend::new(Arc::clone(&supervisor)));
        Self::with_backend(config, supervisor, backend)
    }

    /// Build with a custom backend. No health monitor is started; the
    /// caller owns the supervisor's lifecycle.
    pub fn with_backend(
        config: AssistConfig,
        supervisor: Arc<ServerSupervisor>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let cache = Arc::new(AdaptiveCache::new(config.cache.clone()));
        let gate = Arc::new(RequestGate::new(config.gate.clone()));
        Self {
            config,
            supervisor,
            backend,
            cache,
            gate,
            last_error: Mutex::new(None),
        }
    }

    /// Bring the inference server up. False when configuration is
    /// missing or the server keeps crashing; the detail is in
    /// [`status`].
    ///
    /// [`status`]: AssistEngine::status
    pub async fn ensure_running(&self) -> bool {
        match self.supervisor.ensure_running().await {
            Ok(()) => {
                self.set_last_error(None);
                true
            }
            Err(err) => {
                warn!("Could not bring the server up: {}", err);
                self.set_last_error(Some(err.to_string()));
                false
            }
        }
    }

    /// Interactive completion.
    ///
    /// This path never errors; anything that goes wrong degrades to
    /// `None`, and an exhausted rate budget degrades to a local
    /// heuristic. A cold server is not started from here; failures are
    /// counted by the backend and handed to the supervisor instead.
    pub async fn complete(&self, request: AssistRequest) -> Option<String> {
        if let Err(reason) = self.gate.precheck(&request) {
            debug!("Request filtered: {:?}", reason);
            return None;
        }

        if self.gate.is_quiet() {
            debug!("Gate is quiet after repeated rejections");
            return None;
        }

        let key = request.key();
        if let Some(flight) = self.gate.existing_flight(&key) {
            debug!("Joining identical in-flight request");
            return flight.await;
        }

        let cache_key = cache_key_of(&request);
        if self.config.use_cache {
            if let Some(hit) = self.cache.get(&cache_key, &request.context, Feature::Completion) {
                return self.offer(&request, hit);
            }
        }

        // Debounce. A newer request for this document supersedes us.
        if !self.gate.settle(&request).await {
            debug!("Superseded while debouncing");
            return None;
        }

        if !self.gate.try_consume_budget() {
            debug!("Rate limited, answering heuristically");
            let profile = language::by_id(&request.context.language)
                .or_else(|| language::detect(&request.document));
            return heuristic::complete(&request, profile)
                .and_then(|text| self.offer(&request, text));
        }

        let backend = Arc::clone(&self.backend);
        let prompt = build_prompt(&request);
        let max_tokens = self.config.completion_tokens;
        let fut = async move {
            match backend
                .completion(&prompt, max_tokens, vec!["\n\n".to_string()])
                .await
            {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!("Inference failed: {}", err);
                    None
                }
            }
        }
        .boxed();
        let (flight, joined) = self.gate.begin_flight(&key, fut);
        let result = flight.await;
        if joined {
            return result;
        }
        self.gate.finish_flight(&key);

        match result {
            Some(text) if !text.trim().is_empty() => {
                if self.config.use_cache {
                    self.cache.set(
                        &cache_key,
                        &text,
                        &request.context,
                        Feature::Completion,
                        &self.config.model_label,
                    );
                }
                self.offer(&request, text)
            }
            _ => None,
        }
    }

    /// Conversational request. Long-TTL cached; errors surface to the
    /// caller instead of degrading.
    pub async fn chat(&self, message: &str, context: &CodeContext) -> Result<String, AssistError> {
        self.ask(
            Feature::Chat,
            CHAT_SYSTEM_PROMPT,
            message.trim().to_string(),
            context,
        )
        .await
    }

    /// Explain a snippet of code.
    pub async fn explain(&self, code: &str, context: &CodeContext) -> Result<String, AssistError> {
        self.ask(
            Feature::Explanation,
            EXPLAIN_SYSTEM_PROMPT,
            format!("Explain this code:\n\n{code}"),
            context,
        )
        .await
    }

    async fn ask(
        &self,
        feature: Feature,
        system: &str,
        message: String,
        context: &CodeContext,
    ) -> Result<String, AssistError> {
        if self.config.use_cache {
            if let Some(hit) = self.cache.get(&message, context, feature) {
                return Ok(hit);
            }
        }

        if !self.backend.ensure_ready().await {
            return Err(AssistError::NotReady(
                self.last_error_text()
                    .unwrap_or_else(|| "inference server unavailable".to_string()),
            ));
        }

        let answer = self
            .backend
            .chat(system, &with_context(&message, context), self.config.chat_tokens)
            .await?;
        if self.config.use_cache {
            self.cache
                .set(&message, &answer, context, feature, &self.config.model_label);
        }
        Ok(answer)
    }

    /// Watch what the editor does with a delivered suggestion. `probe`
    /// should return the text around the suggestion site once the
    /// monitor delay has passed.
    pub fn monitor<F>(&self, document: &str, suggestion: &str, probe: F)
    where
        F: FnOnce() -> Option<String> + Send + 'static,
    {
        self.gate
            .monitor(document.to_string(), suggestion.to_string(), probe);
    }

    /// Feed an explicit acceptance from the editor.
    pub fn record_accepted(&self, document: &str) {
        self.gate.record_accepted(document);
    }

    /// Feed an explicit rejection from the editor.
    pub fn record_rejected(&self, document: &str, suggestion: &str) {
        self.gate.record_rejected(document, suggestion);
    }

    pub async fn status(&self) -> EngineStatus {
        let server = self.supervisor.status().await;
        EngineStatus {
            ready: server.ready,
            quiet: self.gate.is_quiet(),
            in_flight: self.gate.in_flight_count(),
            cache: self.cache.stats(),
            last_error: self.last_error_text(),
            server,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Tear everything down: pending debounce waits, in-flight
    /// bookkeeping, the monitor, and the server process. Idempotent.
    pub async fn dispose(&self) {
        info!("Disposing assistance engine");
        self.gate.cancel_all();
        self.supervisor.shutdown().await;
    }

    fn offer(&self, request: &AssistRequest, text: String) -> Option<String> {
        if self.gate.was_rejected(&request.document, &text) {
            debug!("Suppressing a previously rejected suggestion");
            return None;
        }
        Some(text)
    }

    fn set_last_error(&self, error: Option<String>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = error;
    }

    fn last_error_text(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Cache identity of a completion request: the current line, left-trimmed
/// so indentation does not split entries.
fn cache_key_of(request: &AssistRequest) -> String {
    request.current_line().trim_start().to_string()
}

fn build_prompt(request: &AssistRequest) -> String {
    let prefix = &request.prefix;
    let start = prefix
        .char_indices()
        .rev()
        .nth(PROMPT_TAIL_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    prefix[start..].to_string()
}

fn with_context(message: &str, context: &CodeContext) -> String {
    let mut parts = Vec::new();
    if !context.language.is_empty() {
        parts.push(format!("Language: {}", context.language));
    }
    if let Some(symbol) = &context.enclosing_symbol {
        parts.push(format!("Enclosing symbol: {symbol}"));
    }
    if parts.is_empty() {
        message.to_string()
    } else {
        format!("{}\n\n{}", parts.join("\n"), message)
    }
}
