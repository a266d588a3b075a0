//! Lifecycle supervision for the llama-server subprocess.
//!
//! The server is an owned resource with an explicit state machine:
//!
//! ```text
//! Stopped -> Starting -> Ready <-> Degraded
//!               |                     |
//!               +------> Crashed <----+
//! ```
//!
//! Every control decision flows from the HTTP health probe; process output
//! is captured for diagnostics only.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use tokio::io::AsyncBufReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::InferenceClient;
use crate::config::{ResolvedConfig, ServerConfig};
use crate::error::LlamaError;

const STDERR_TAIL_LINES: usize = 40;
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle states of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Ready,
    Degraded,
    Crashed,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Ready => "ready",
            ServerState::Degraded => "degraded",
            ServerState::Crashed => "crashed",
        };
        f.write_str(name)
    }
}

/// Point-in-time snapshot of the supervisor.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub state: ServerState,
    pub ready: bool,
    pub pid: Option<u32>,
    pub port: u16,
    pub model: Option<String>,
    /// Restarts performed after the initial spawn.
    pub restart_count: u32,
    pub last_health_check: Option<Duration>,
    /// Most recent stderr lines from the child, oldest first.
    pub stderr_tail: Vec<String>,
}

/// Mutable supervision state. Guarded by one mutex so that overlapping
/// `ensure_running` calls and the health monitor serialize; two callers
/// must never spawn two processes.
struct Supervised {
    state: ServerState,
    resolved: Option<ResolvedConfig>,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    exit_watch: Option<JoinHandle<()>>,
    /// Bumped on every spawn; exit events carrying an older generation
    /// refer to a child that has already been replaced.
    generation: u64,
    spawn_count: u32,
    consecutive_failures: u32,
    last_health_check: Option<Instant>,
}

impl Default for Supervised {
    fn default() -> Self {
        Self {
            state: ServerState::Stopped,
            resolved: None,
            pid: None,
            kill: None,
            exit_watch: None,
            generation: 0,
            spawn_count: 0,
            consecutive_failures: 0,
            last_health_check: None,
        }
    }
}

/// Supervisor for a single llama-server process.
pub struct ServerSupervisor {
    config: ServerConfig,
    client: InferenceClient,
    inner: Mutex<Supervised>,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
    monitor: StdMutex<Option<JoinHandle<()>>>,
    weak: Weak<ServerSupervisor>,
}

impl ServerSupervisor {
    /// Create a new supervisor. The process is not started until
    /// [`ensure_running`](Self::ensure_running) is called.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let client = InferenceClient::with_port(config.port)
            .with_timeouts(config.request_timeout, config.chat_timeout);
        Arc::new_cyclic(|weak| Self {
            config,
            client,
            inner: Mutex::new(Supervised::default()),
            stderr_tail: Arc::new(StdMutex::new(VecDeque::new())),
            monitor: StdMutex::new(None),
            weak: weak.clone(),
        })
    }

    /// Get a client talking to the supervised server.
    pub fn client(&self) -> &InferenceClient {
        &self.client
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bring the server to `Ready`, reusing a healthy one when possible.
    ///
    /// The health probe runs first: an already responding server (ours or
    /// an externally managed one on the same port) is adopted as-is.
    /// Otherwise configuration is resolved and the process is started,
    /// retrying spawn and readiness failures with a fixed backoff until
    /// the consecutive-failure budget is spent, after which the state is
    /// `Crashed` and only [`reset`](Self::reset) clears it.
    pub async fn ensure_running(&self) -> Result<(), LlamaError> {
        let mut inner = self.inner.lock().await;

        if inner.state == ServerState::Crashed {
            return Err(LlamaError::Crashed {
                failures: inner.consecutive_failures,
            });
        }

        if self.client.health().await.is_ok() {
            inner.state = ServerState::Ready;
            inner.consecutive_failures = 0;
            inner.last_health_check = Some(Instant::now());
            return Ok(());
        }

        let resolved = match inner.resolved.clone() {
            Some(resolved) => resolved,
            None => {
                let resolved = self.config.resolve()?;
                inner.resolved = Some(resolved.clone());
                resolved
            }
        };

        loop {
            self.kill_current_locked(&mut inner).await;
            match self.start_and_wait(&mut inner, &resolved).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    inner.consecutive_failures += 1;
                    warn!(
                        "llama-server start attempt failed ({} consecutive): {}",
                        inner.consecutive_failures, err
                    );
                    if inner.consecutive_failures >= self.config.max_restarts {
                        inner.state = ServerState::Crashed;
                        self.kill_current_locked(&mut inner).await;
                        warn!("Restart budget exhausted; supervision has given up");
                        return Err(LlamaError::Crashed {
                            failures: inner.consecutive_failures,
                        });
                    }
                    tokio::time::sleep(self.config.restart_backoff).await;
                }
            }
        }
    }

    /// Spawn the process and poll `/health` until it answers.
    async fn start_and_wait(
        &self,
        inner: &mut Supervised,
        resolved: &ResolvedConfig,
    ) -> Result<(), LlamaError> {
        inner.state = ServerState::Starting;
        inner.generation += 1;
        let generation = inner.generation;

        info!(
            "Starting llama-server on port {} with model {}",
            resolved.port,
            resolved.model_name()
        );

        let mut child = build_command(resolved).spawn().map_err(|e| {
            LlamaError::SpawnFailed(format!("{}: {}", resolved.executable.display(), e))
        })?;

        inner.pid = child.id();
        inner.spawn_count += 1;
        debug!("llama-server process started with PID {:?}", inner.pid);

        if let Some(stderr) = child.stderr.take() {
            self.spawn_stderr_drain(stderr);
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        inner.kill = Some(kill_tx);
        inner.exit_watch = Some(self.spawn_exit_watch(child, kill_rx, generation));

        for attempt in 1..=self.config.readiness_attempts {
            tokio::time::sleep(self.config.readiness_interval).await;
            if self.client.health().await.is_ok() {
                info!("llama-server ready after {} health probes", attempt);
                inner.state = ServerState::Ready;
                inner.consecutive_failures = 0;
                inner.last_health_check = Some(Instant::now());
                return Ok(());
            }
            debug!("Health probe {} not ready yet", attempt);
        }

        Err(LlamaError::ReadinessTimeout {
            attempts: self.config.readiness_attempts,
        })
    }

    fn spawn_stderr_drain(&self, stderr: ChildStderr) {
        let tail = Arc::clone(&self.stderr_tail);
        tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("llama-server: {}", line);
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() >= STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        });
    }

    fn spawn_exit_watch(
        &self,
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        generation: u64,
    ) -> JoinHandle<()> {
        let weak = self.weak.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    if let Some(sup) = weak.upgrade() {
                        sup.handle_unexpected_exit(generation, code).await;
                    }
                }
                _ = kill_rx => {
                    graceful_kill(&mut child).await;
                }
            }
        })
    }

    /// React to a child exiting on its own.
    async fn handle_unexpected_exit(&self, generation: u64, code: Option<i32>) {
        let schedule_restart = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return;
            }
            // The start path owns failure accounting while Starting.
            if !matches!(inner.state, ServerState::Ready | ServerState::Degraded) {
                return;
            }

            warn!("llama-server exited unexpectedly (code {:?})", code);
            if let Ok(tail) = self.stderr_tail.lock() {
                for line in tail.iter().rev().take(5).rev() {
                    warn!("llama-server stderr: {}", line);
                }
            }

            inner.pid = None;
            inner.kill = None;
            inner.exit_watch = None;
            inner.consecutive_failures += 1;
            if inner.consecutive_failures >= self.config.max_restarts {
                inner.state = ServerState::Crashed;
                warn!(
                    "Server crashed {} times in a row; not restarting",
                    inner.consecutive_failures
                );
                false
            } else {
                inner.state = ServerState::Degraded;
                true
            }
        };

        if schedule_restart {
            let backoff = self.config.restart_backoff;
            info!("Scheduling llama-server restart in {:?}", backoff);
            let weak = self.weak.clone();
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                if let Some(sup) = weak.upgrade() {
                    if let Err(err) = sup.ensure_running().await {
                        warn!("Scheduled restart failed: {}", err);
                    }
                }
            });
        }
    }

    /// One probe of the background monitor. Returns the resulting state so
    /// the monitor loop can decide whether recovery is needed.
    async fn health_tick(&self) -> ServerState {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, ServerState::Ready | ServerState::Degraded) {
            return inner.state;
        }

        let healthy = self.client.health().await.is_ok();
        inner.last_health_check = Some(Instant::now());
        match (inner.state, healthy) {
            (ServerState::Ready, true) => {
                inner.consecutive_failures = 0;
            }
            (ServerState::Ready, false) => {
                warn!("Health probe failed; marking server degraded");
                inner.state = ServerState::Degraded;
            }
            (ServerState::Degraded, true) => {
                info!("Health restored");
                inner.state = ServerState::Ready;
                inner.consecutive_failures = 0;
            }
            (ServerState::Degraded, false) => {}
            _ => {}
        }
        inner.state
    }

    /// Start the periodic health monitor. It runs for the supervisor's
    /// whole lifetime, idling while the server is stopped or crashed, and
    /// drives recovery whenever a probe finds the server degraded.
    pub fn spawn_monitor(&self) {
        let weak = self.weak.clone();
        let interval = self.config.health_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(sup) = weak.upgrade() else {
                    break;
                };
                if sup.health_tick().await == ServerState::Degraded {
                    if let Err(err) = sup.ensure_running().await {
                        warn!("Recovery attempt failed: {}", err);
                    }
                }
            }
        });
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    /// Terminate the current child, leaving the monitor running.
    pub async fn stop(&self) {
        let watch = {
            let mut inner = self.inner.lock().await;
            inner.state = ServerState::Stopped;
            inner.pid = None;
            if let Some(kill) = inner.kill.take() {
                let _ = kill.send(());
            }
            inner.exit_watch.take()
        };
        // Awaited outside the lock: the watch task may be waiting on it.
        if let Some(watch) = watch {
            let _ = watch.await;
        }
    }

    /// Terminate the child and all supervision tasks. Idempotent.
    pub async fn shutdown(&self) {
        self.stop().await;
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(monitor) = slot.take() {
                monitor.abort();
            }
        }
    }

    /// Clear a `Crashed` verdict so changed configuration can take effect.
    pub async fn reset(&self) {
        self.stop().await;
        let mut inner = self.inner.lock().await;
        inner.resolved = None;
        inner.consecutive_failures = 0;
        inner.state = ServerState::Stopped;
    }

    pub async fn status(&self) -> ServerStatus {
        let inner = self.inner.lock().await;
        ServerStatus {
            state: inner.state,
            ready: inner.state == ServerState::Ready,
            pid: inner.pid,
            port: self.config.port,
            model: inner.resolved.as_ref().map(|r| r.model_name()),
            restart_count: inner.spawn_count.saturating_sub(1),
            last_health_check: inner.last_health_check.map(|t| t.elapsed()),
            stderr_tail: self
                .stderr_tail
                .lock()
                .map(|tail| tail.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    /// Kill the current child, if any, before spawning a replacement.
    async fn kill_current_locked(&self, inner: &mut Supervised) {
        if let Some(kill) = inner.kill.take() {
            let _ = kill.send(());
        }
        if let Some(watch) = inner.exit_watch.take() {
            // The watch task may itself be blocked on our lock after an
            // exit event; bound the wait and let the generation check
            // discard the stale event.
            let _ = tokio::time::timeout(Duration::from_secs(2), watch).await;
        }
        inner.pid = None;
    }
}

impl Drop for ServerSupervisor {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(monitor) = slot.take() {
                monitor.abort();
            }
        }
        // Best effort: the exit-watch task kills the child on drop via
        // kill_on_drop, but a still-registered pid gets a direct signal.
        #[cfg(unix)]
        if let Ok(inner) = self.inner.try_lock() {
            if let Some(pid) = inner.pid {
                unsafe {
                    libc::kill(pid as i32, libc::SIGKILL);
                }
            }
        }
    }
}

fn build_command(resolved: &ResolvedConfig) -> Command {
    let mut cmd = Command::new(&resolved.executable);
    cmd.arg("--model")
        .arg(&resolved.model)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(resolved.port.to_string())
        .arg("--ctx-size")
        .arg(resolved.context_size.to_string())
        .arg("--n-gpu-layers")
        .arg(resolved.gpu_layers.to_string())
        .arg("--threads")
        .arg(resolved.threads.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// SIGTERM first, then a hard kill once the grace period runs out.
async fn graceful_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        for _ in 0..10 {
            tokio::time::sleep(KILL_GRACE).await;
            if let Ok(Some(status)) = child.try_wait() {
                debug!("llama-server exited with status {:?}", status);
                return;
            }
        }
        warn!("Server didn't exit gracefully, killing...");
    }
    let _ = child.kill().await;
}
