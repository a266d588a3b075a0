//! Server configuration and resolution.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::LlamaError;
use crate::paths;

fn default_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}

/// Configuration for the supervised llama-server process.
///
/// `executable` and `model` may be left unset, in which case [`resolve`]
/// falls back to filesystem detection and `PATH` lookup.
///
/// [`resolve`]: ServerConfig::resolve
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Explicit path to the llama-server binary.
    pub executable: Option<PathBuf>,
    /// Explicit path to a .gguf model file.
    pub model: Option<PathBuf>,
    /// Port the server listens on (loopback only).
    pub port: u16,
    /// Context window size in tokens.
    pub context_size: u32,
    /// Layers to offload to the GPU.
    pub gpu_layers: u32,
    /// Worker threads for the server.
    pub threads: u32,
    /// Consecutive start failures tolerated before giving up.
    pub max_restarts: u32,
    /// Delay between restart attempts.
    pub restart_backoff: Duration,
    /// Health probes during startup before declaring a readiness timeout.
    pub readiness_attempts: u32,
    /// Delay between readiness probes.
    pub readiness_interval: Duration,
    /// Interval of the background health monitor.
    pub health_interval: Duration,
    /// Per-request timeout for completion calls.
    pub request_timeout: Duration,
    /// Per-request timeout for chat calls.
    pub chat_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            executable: None,
            model: None,
            port: crate::DEFAULT_PORT,
            context_size: 4096,
            gpu_layers: 99,
            threads: default_threads(),
            max_restarts: 3,
            restart_backoff: Duration::from_secs(5),
            readiness_attempts: 30,
            readiness_interval: Duration::from_secs(1),
            health_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            chat_timeout: Duration::from_secs(120),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("MUSE_LLAMA_SERVER") {
            config.executable = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("MUSE_MODEL") {
            config.model = Some(PathBuf::from(path));
        }
        if let Some(port) = std::env::var("MUSE_PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        if let Some(ctx) = std::env::var("MUSE_CTX_SIZE").ok().and_then(|v| v.parse().ok()) {
            config.context_size = ctx;
        }
        if let Some(layers) = std::env::var("MUSE_GPU_LAYERS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.gpu_layers = layers;
        }
        if let Some(threads) = std::env::var("MUSE_THREADS").ok().and_then(|v| v.parse().ok()) {
            config.threads = threads;
        }

        config
    }

    /// Create a builder for configuration.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Resolve the optional fields into a concrete spawn configuration.
    ///
    /// Fallback order for the executable: explicit path, known install
    /// locations, `PATH`. For the model: explicit path, newest `.gguf`
    /// under the models directory. Anything unresolvable is a
    /// [`LlamaError::ConfigurationMissing`].
    pub fn resolve(&self) -> Result<ResolvedConfig, LlamaError> {
        let executable = match &self.executable {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                return Err(LlamaError::ConfigurationMissing(format!(
                    "configured llama-server does not exist at {}",
                    path.display()
                )))
            }
            None => paths::detect_server_binary()
                .or_else(paths::find_server_on_path)
                .ok_or_else(|| {
                    LlamaError::ConfigurationMissing(
                        "llama-server not found in known locations or on PATH".to_string(),
                    )
                })?,
        };

        let model = match &self.model {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                return Err(LlamaError::ConfigurationMissing(format!(
                    "configured model does not exist at {}",
                    path.display()
                )))
            }
            None => paths::detect_model(&paths::models_dir()).ok_or_else(|| {
                LlamaError::ConfigurationMissing(format!(
                    "no .gguf model under {}",
                    paths::models_dir().display()
                ))
            })?,
        };

        Ok(ResolvedConfig {
            executable,
            model,
            port: self.port,
            context_size: self.context_size,
            gpu_layers: self.gpu_layers,
            threads: self.threads,
        })
    }
}

/// Fully concrete spawn parameters produced by [`ServerConfig::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub executable: PathBuf,
    pub model: PathBuf,
    pub port: u16,
    pub context_size: u32,
    pub gpu_layers: u32,
    pub threads: u32,
}

impl ResolvedConfig {
    /// File name of the resolved model, for status reporting.
    pub fn model_name(&self) -> String {
        self.model
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.model.display().to_string())
    }
}

/// Builder for server configuration.
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.executable = Some(path.into());
        self
    }

    pub fn model(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model = Some(path.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn context_size(mut self, tokens: u32) -> Self {
        self.config.context_size = tokens;
        self
    }

    pub fn gpu_layers(mut self, layers: u32) -> Self {
        self.config.gpu_layers = layers;
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn max_restarts(mut self, attempts: u32) -> Self {
        self.config.max_restarts = attempts;
        self
    }

    pub fn restart_backoff(mut self, backoff: Duration) -> Self {
        self.config.restart_backoff = backoff;
        self
    }

    pub fn readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.config.readiness_attempts = attempts;
        self.config.readiness_interval = interval;
        self
    }

    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.config.health_interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn chat_timeout(mut self, timeout: Duration) -> Self {
        self.config.chat_timeout = timeout;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_explicit_paths() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("llama-server");
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&exe, b"").unwrap();
        std::fs::write(&model, b"").unwrap();

        let config = ServerConfig::builder()
            .executable(&exe)
            .model(&model)
            .port(9000)
            .build();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.executable, exe);
        assert_eq!(resolved.model, model);
        assert_eq!(resolved.port, 9000);
        assert_eq!(resolved.model_name(), "tiny.gguf");
    }

    #[test]
    fn test_resolve_rejects_missing_explicit_executable() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, b"").unwrap();

        let config = ServerConfig::builder()
            .executable(dir.path().join("no-such-binary"))
            .model(&model)
            .build();
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, LlamaError::ConfigurationMissing(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_resolve_rejects_missing_explicit_model() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("llama-server");
        std::fs::write(&exe, b"").unwrap();

        let config = ServerConfig::builder()
            .executable(&exe)
            .model(dir.path().join("no-such-model.gguf"))
            .build();
        assert!(matches!(
            config.resolve(),
            Err(LlamaError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = ServerConfig::builder()
            .port(1234)
            .context_size(2048)
            .gpu_layers(0)
            .max_restarts(5)
            .build();
        assert_eq!(config.port, 1234);
        assert_eq!(config.context_size, 2048);
        assert_eq!(config.gpu_layers, 0);
        assert_eq!(config.max_restarts, 5);
        assert!(config.executable.is_none());
    }
}
