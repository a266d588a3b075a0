//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use muse_llama::ServerConfig;

use crate::cache::CacheConfig;
use crate::gate::GateConfig;

/// Configuration for the assistance engine.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Subprocess and transport settings.
    pub server: ServerConfig,
    /// Cache tier tuning.
    pub cache: CacheConfig,
    /// Admission gate tuning.
    pub gate: GateConfig,
    /// Token budget for interactive completions.
    pub completion_tokens: i32,
    /// Token budget for chat answers.
    pub chat_tokens: i32,
    /// Model label recorded in cache entries.
    pub model_label: String,
    /// Whether responses are cached at all.
    pub use_cache: bool,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            gate: GateConfig::default(),
            completion_tokens: 128,
            chat_tokens: 1024,
            model_label: "local-llm".to_string(),
            use_cache: true,
        }
    }
}

impl AssistConfig {
    /// Create config from environment variables. Server settings come
    /// from [`ServerConfig::from_env`]; `MUSE_CACHE_DIR`, `MUSE_CACHE`,
    /// `MUSE_RATE_LIMIT` and `MUSE_DEBOUNCE_MS` tune the engine itself.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.server = ServerConfig::from_env();

        if let Ok(dir) = std::env::var("MUSE_CACHE_DIR") {
            config.cache.disk_dir = Some(PathBuf::from(dir));
        }
        if let Ok(flag) = std::env::var("MUSE_CACHE") {
            config.use_cache = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(limit) = std::env::var("MUSE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.gate.rate_limit = limit;
        }
        if let Some(ms) = std::env::var("MUSE_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.gate.debounce = Duration::from_millis(ms);
        }

        config
    }

    /// Create a builder for configuration.
    pub fn builder() -> AssistConfigBuilder {
        AssistConfigBuilder::default()
    }
}

/// Builder for engine configuration.
#[derive(Debug, Default)]
pub struct AssistConfigBuilder {
    config: AssistConfig,
}

impl AssistConfigBuilder {
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache.disk_dir = Some(dir.into());
        self
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.config.use_cache = enabled;
        self
    }

    pub fn completion_tokens(mut self, tokens: i32) -> Self {
        self.config.completion_tokens = tokens;
        self
    }

    pub fn chat_tokens(mut self, tokens: i32) -> Self {
        self.config.chat_tokens = tokens;
        self
    }

    pub fn model_label(mut self, label: impl Into<String>) -> Self {
        self.config.model_label = label.into();
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.config.gate.debounce = delay;
        self
    }

    pub fn rate_limit(mut self, limit: usize, window: Duration) -> Self {
        self.config.gate.rate_limit = limit;
        self.config.gate.rate_window = window;
        self
    }

    pub fn build(self) -> AssistConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssistConfig::default();
        assert!(config.use_cache);
        assert_eq!(config.completion_tokens, 128);
        assert_eq!(config.gate.debounce, Duration::from_millis(250));
        assert_eq!(config.gate.rate_limit, 20);
        assert_eq!(config.cache.hot_capacity, 1000);
    }

    #[test]
    fn test_builder_overrides() {
        let config = AssistConfig::builder()
            .use_cache(false)
            .completion_tokens(64)
            .debounce(Duration::from_millis(100))
            .rate_limit(5, Duration::from_secs(10))
            .cache_dir("/tmp/muse-test-cache")
            .build();
        assert!(!config.use_cache);
        assert_eq!(config.completion_tokens, 64);
        assert_eq!(config.gate.debounce, Duration::from_millis(100));
        assert_eq!(config.gate.rate_limit, 5);
        assert_eq!(config.gate.rate_window, Duration::from_secs(10));
        assert!(config.cache.disk_dir.is_some());
    }
}
