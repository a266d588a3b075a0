//! HTTP client for llama-server's completion and chat APIs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlamaError;
use crate::DEFAULT_PORT;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for communicating with llama-server.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    chat_timeout: Duration,
}

/// Request body for llama-server's native `/completion` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub n_predict: i32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub stop: Vec<String>,
    pub cache_prompt: bool,
    pub stream: bool,
}

impl CompletionRequest {
    /// Completion request with sampling defaults tuned for code.
    pub fn new(prompt: impl Into<String>, n_predict: i32) -> Self {
        Self {
            prompt: prompt.into(),
            n_predict,
            temperature: 0.2,
            top_k: 40,
            top_p: 0.95,
            repeat_penalty: 1.1,
            stop: Vec::new(),
            cache_prompt: true,
            stream: false,
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response body of `/completion`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    #[serde(default)]
    pub tokens_predicted: u32,
    #[serde(default)]
    pub timings: Option<Timings>,
}

/// Timing block attached to completion responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timings {
    #[serde(default)]
    pub prompt_n: u32,
    #[serde(default)]
    pub prompt_ms: f64,
    #[serde(default)]
    pub predicted_n: u32,
    #[serde(default)]
    pub predicted_ms: f64,
    #[serde(default)]
    pub predicted_per_second: f64,
}

/// Chat message in OpenAI format.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: i32,
    stream: bool,
}

/// OpenAI-compatible chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl InferenceClient {
    /// Create a new client for the default loopback port.
    pub fn new() -> Self {
        Self::with_port(DEFAULT_PORT)
    }

    /// Create a new client with a custom port on localhost.
    pub fn with_port(port: u16) -> Self {
        Self::with_url(format!("http://127.0.0.1:{}", port))
    }

    /// Create a new client with a custom URL.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
            chat_timeout: Duration::from_secs(120),
        }
    }

    /// Override the per-request timeouts.
    pub fn with_timeouts(mut self, request: Duration, chat: Duration) -> Self {
        self.request_timeout = request;
        self.chat_timeout = chat;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is running and healthy.
    ///
    /// llama-server answers 503 while the model is still loading, which
    /// counts as not ready.
    pub async fn health(&self) -> Result<(), LlamaError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlamaError::ServerUnavailable(self.base_url.clone()))
        }
    }

    /// Send a completion request to the native `/completion` endpoint.
    pub async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlamaError> {
        let url = format!("{}/completion", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlamaError::Api(format!("{}: {}", status, text)));
        }

        Ok(response.json().await?)
    }

    /// Send a chat request via the OpenAI-compatible endpoint.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: i32,
    ) -> Result<String, LlamaError> {
        let request = ChatCompletionRequest {
            messages,
            temperature: 0.4, // Slightly creative for conversational answers
            max_tokens,
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.chat_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlamaError::Api(format!("{}: {}", status, text)));
        }

        let completion: ChatCompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlamaError::Api("No completion returned".to_string()))
    }

    fn map_transport(&self, e: reqwest::Error) -> LlamaError {
        if e.is_timeout() {
            LlamaError::Timeout
        } else if e.is_connect() {
            LlamaError::ServerUnavailable(self.base_url.clone())
        } else {
            LlamaError::Http(e)
        }
    }
}

impl Default for InferenceClient {
    fn default() -> Self {
        Self::new()
    }
}
