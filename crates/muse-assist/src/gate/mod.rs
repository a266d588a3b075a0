//! Admission control for interactive completion requests.
//!
//! Most requests should never reach the model. The gate runs cheap
//! structural filters first, stays quiet after repeated rejections,
//! joins duplicate requests onto one in-flight inference call, debounces
//! bursts per document, and enforces a sliding-window budget. Structural
//! rejections and quiet periods consume no budget.

mod debounce;
mod feedback;
mod limiter;

pub use debounce::Debouncer;
pub use feedback::RejectionTracker;
pub use limiter::SlidingWindow;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tracing::debug;

use crate::language;
use crate::request::{AssistRequest, RequestKey};

/// Shared handle on an in-flight inference call. Late twins await the
/// same future instead of spawning their own.
pub type SharedCompletion = Shared<BoxFuture<'static, Option<String>>>;

/// Why a request never reached inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    PrefixTooShort,
    MidWord,
    InComment,
    InString,
}

/// Tuning for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum trimmed length of the current line.
    pub min_prefix_chars: usize,
    /// Quiet period before a burst settles into one request.
    pub debounce: Duration,
    /// Inference calls allowed per window.
    pub rate_limit: usize,
    pub rate_window: Duration,
    /// Consecutive rejections that mute the gate.
    pub quiet_after: u32,
    /// Delay before a suggestion is classified accepted or rejected.
    pub monitor_delay: Duration,
    /// Bound on remembered rejections.
    pub rejection_capacity: usize,
    pub rejection_ttl: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_prefix_chars: 3,
            debounce: Duration::from_millis(250),
            rate_limit: 20,
            rate_window: Duration::from_secs(60),
            quiet_after: 5,
            monitor_delay: Duration::from_millis(1500),
            rejection_capacity: 128,
            rejection_ttl: Duration::from_secs(600),
        }
    }
}

pub struct RequestGate {
    config: GateConfig,
    debouncer: Debouncer,
    limiter: SlidingWindow,
    feedback: Arc<RejectionTracker>,
    in_flight: Mutex<HashMap<RequestKey, SharedCompletion>>,
}

impl RequestGate {
    pub fn new(config: GateConfig) -> Self {
        let feedback = Arc::new(RejectionTracker::new(
            config.quiet_after,
            config.rejection_capacity,
            config.rejection_ttl,
        ));
        Self {
            debouncer: Debouncer::new(),
            limiter: SlidingWindow::new(config.rate_limit, config.rate_window),
            feedback,
            in_flight: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Structural filters: cheap syntactic reasons not to bother the
    /// model.
    pub fn precheck(&self, request: &AssistRequest) -> Result<(), RejectReason> {
        let line = request.current_line();
        if line.trim().chars().count() < self.config.min_prefix_chars {
            return Err(RejectReason::PrefixTooShort);
        }
        if request
            .suffix
            .chars()
            .next()
            .map(is_word_char)
            .unwrap_or(false)
        {
            return Err(RejectReason::MidWord);
        }
        let profile = language::by_id(&request.context.language)
            .or_else(|| language::detect(&request.document));
        if let Some(profile) = profile {
            if profile.in_comment(line) {
                return Err(RejectReason::InComment);
            }
            if profile.in_string(line) {
                return Err(RejectReason::InString);
            }
        }
        Ok(())
    }

    /// Whether the gate has muted itself after repeated rejections.
    pub fn is_quiet(&self) -> bool {
        self.feedback.is_quiet()
    }

    /// Join an identical request already being answered.
    pub fn existing_flight(&self, key: &RequestKey) -> Option<SharedCompletion> {
        self.flights().get(key).cloned()
    }

    /// Register the single flight for this key, or join one that beat us
    /// to registration. Returns the shared future and whether we joined.
    /// The registering caller must call `finish_flight` once the result
    /// is in; joiners must not.
    pub fn begin_flight(
        &self,
        key: &RequestKey,
        fut: BoxFuture<'static, Option<String>>,
    ) -> (SharedCompletion, bool) {
        let mut flights = self.flights();
        if let Some(existing) = flights.get(key) {
            return (existing.clone(), true);
        }
        let shared = fut.shared();
        flights.insert(key.clone(), shared.clone());
        (shared, false)
    }

    pub fn finish_flight(&self, key: &RequestKey) {
        self.flights().remove(key);
    }

    pub fn in_flight_count(&self) -> usize {
        self.flights().len()
    }

    /// Debounce this request's document slot. False means a newer
    /// request superseded it while waiting.
    pub async fn settle(&self, request: &AssistRequest) -> bool {
        self.debouncer
            .settle(request.slot(), self.config.debounce)
            .await
    }

    /// Consume one unit of the rate budget.
    pub fn try_consume_budget(&self) -> bool {
        self.limiter.try_admit()
    }

    pub fn record_accepted(&self, document: &str) {
        self.feedback.record_accepted(document);
    }

    pub fn record_rejected(&self, document: &str, suggestion: &str) {
        self.feedback.record_rejected(document, suggestion);
    }

    pub fn was_rejected(&self, document: &str, suggestion: &str) -> bool {
        self.feedback.was_rejected(document, suggestion)
    }

    /// Classify a delivered suggestion after the fact. `probe` returns a
    /// snapshot of the edited region once the delay has passed; the
    /// suggestion counts as accepted when its text was incorporated.
    pub fn monitor<F>(&self, document: String, suggestion: String, probe: F)
    where
        F: FnOnce() -> Option<String> + Send + 'static,
    {
        let feedback = Arc::clone(&self.feedback);
        let delay = self.config.monitor_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let accepted = probe()
                .map(|buffer| buffer.contains(&suggestion))
                .unwrap_or(false);
            if accepted {
                debug!("Suggestion was accepted");
                feedback.record_accepted(&document);
            } else {
                debug!("Suggestion was rejected");
                feedback.record_rejected(&document, &suggestion);
            }
        });
    }

    /// Drop pending debounce waits and in-flight bookkeeping.
    pub fn cancel_all(&self) {
        self.debouncer.cancel_all();
        self.flights().clear();
    }

    fn flights(&self) -> MutexGuard<'_, HashMap<RequestKey, SharedCompletion>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CodeContext, Position};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(prefix: &str, suffix: &str) -> AssistRequest {
        AssistRequest {
            document: "src/main.rs".to_string(),
            position: Position {
                line: 0,
                column: prefix.len() as u32,
            },
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            context: CodeContext {
                language: "rust".to_string(),
                enclosing_symbol: Some("main".to_string()),
                imports: vec![],
            },
        }
    }

    #[test]
    fn test_precheck_filters() {
        let gate = RequestGate::new(GateConfig::default());
        assert_eq!(
            gate.precheck(&request("ab", "")),
            Err(RejectReason::PrefixTooShort)
        );
        assert_eq!(
            gate.precheck(&request("let x", "y = 1;")),
            Err(RejectReason::MidWord)
        );
        assert_eq!(
            gate.precheck(&request("// close the", "")),
            Err(RejectReason::InComment)
        );
        assert_eq!(
            gate.precheck(&request("let s = \"hel", "")),
            Err(RejectReason::InString)
        );
        assert_eq!(gate.precheck(&request("let x = ", "")), Ok(()));
        assert_eq!(gate.precheck(&request("let x = ", " // tail")), Ok(()));
    }

    #[tokio::test]
    async fn test_single_flight_runs_once() {
        let gate = RequestGate::new(GateConfig::default());
        let key = request("let x = ", "").key();
        let calls = Arc::new(AtomicUsize::new(0));
        let fut = {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Some("1;".to_string())
            }
            .boxed()
        };

        let (flight, joined) = gate.begin_flight(&key, fut);
        assert!(!joined);
        let twin = gate.existing_flight(&key).unwrap();
        let (a, b) = tokio::join!(flight, twin);
        assert_eq!(a.as_deref(), Some("1;"));
        assert_eq!(b.as_deref(), Some("1;"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gate.finish_flight(&key);
        assert!(gate.existing_flight(&key).is_none());

        // A second registration for a live key joins instead.
        let (_, joined) = gate.begin_flight(&key, async { None::<String> }.boxed());
        let (_, joined_again) = gate.begin_flight(&key, async { None::<String> }.boxed());
        assert!(!joined);
        assert!(joined_again);
        gate.finish_flight(&key);
    }

    #[tokio::test]
    async fn test_monitor_classifies_acceptance() {
        let mut config = GateConfig::default();
        config.monitor_delay = Duration::from_millis(10);
        let gate = RequestGate::new(config);

        gate.monitor("doc".to_string(), "let x = 1;".to_string(), || {
            Some("fn main() { let x = 1; }".to_string())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!gate.was_rejected("doc", "let x = 1;"));

        gate.monitor("doc".to_string(), "let y = 2;".to_string(), || {
            Some("fn main() { let x = 1; }".to_string())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.was_rejected("doc", "let y = 2;"));
    }

    #[tokio::test]
    async fn test_monitor_rejections_accumulate_to_quiet() {
        let mut config = GateConfig::default();
        config.monitor_delay = Duration::from_millis(5);
        config.quiet_after = 2;
        let gate = RequestGate::new(config);

        gate.monitor("doc".to_string(), "a".to_string(), || None);
        gate.monitor("doc".to_string(), "b".to_string(), || None);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(gate.is_quiet());

        gate.record_accepted("doc");
        assert!(!gate.is_quiet());
    }

    #[test]
    fn test_budget_delegation() {
        let mut config = GateConfig::default();
        config.rate_limit = 2;
        let gate = RequestGate::new(config);
        assert!(gate.try_consume_budget());
        assert!(gate.try_consume_budget());
        assert!(!gate.try_consume_budget());
    }
}
