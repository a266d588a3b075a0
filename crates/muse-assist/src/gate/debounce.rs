//! Latest-wins debouncing per document slot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Token-stamping debouncer.
///
/// Every trigger stamps its slot with a fresh token from one shared
/// counter. The sleeper whose token still owns the slot when the delay
/// elapses wins and releases the slot; everyone else stands down.
/// Tokens are never reused, so a sleeper outlived by [`cancel_all`]
/// stays cancelled even when its slot is triggered again. No timers are
/// stored, so superseded waits cost nothing but their sleep.
///
/// [`cancel_all`]: Self::cancel_all
#[derive(Debug, Default)]
pub struct Debouncer {
    inner: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    next_token: u64,
    pending: HashMap<String, u64>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait out the debounce delay. Returns false when a newer trigger
    /// for the same slot arrived while waiting, or the wait was
    /// cancelled.
    pub async fn settle(&self, slot: &str, delay: Duration) -> bool {
        let mine = {
            let mut slots = self.lock();
            slots.next_token += 1;
            let token = slots.next_token;
            slots.pending.insert(slot.to_string(), token);
            token
        };
        tokio::time::sleep(delay).await;
        let mut slots = self.lock();
        if slots.pending.get(slot).copied() == Some(mine) {
            slots.pending.remove(slot);
            true
        } else {
            false
        }
    }

    /// Forget all pending slots. Outstanding sleepers lose.
    pub fn cancel_all(&self) {
        self.lock().pending.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_latest_trigger_wins() {
        let debouncer = Arc::new(Debouncer::new());
        let early = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.settle("doc", Duration::from_millis(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(debouncer.settle("doc", Duration::from_millis(60)).await);
        assert!(!early.await.unwrap());
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let debouncer = Arc::new(Debouncer::new());
        let a = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.settle("a", Duration::from_millis(30)).await })
        };
        let b = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.settle("b", Duration::from_millis(30)).await })
        };
        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_all_defeats_pending_waits() {
        let debouncer = Arc::new(Debouncer::new());
        let pending = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.settle("doc", Duration::from_millis(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(15)).await;
        debouncer.cancel_all();
        assert!(!pending.await.unwrap());
    }

    #[tokio::test]
    async fn test_retrigger_after_cancel_does_not_revive_old_waiter() {
        let debouncer = Arc::new(Debouncer::new());
        let stale = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.settle("doc", Duration::from_millis(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(15)).await;
        debouncer.cancel_all();
        // A fresh trigger restakes the slot; the cancelled sleeper must
        // not mistake the new claim for its own.
        let fresh = {
            let debouncer = Arc::clone(&debouncer);
            tokio::spawn(async move { debouncer.settle("doc", Duration::from_millis(60)).await })
        };
        assert!(!stale.await.unwrap());
        assert!(fresh.await.unwrap());
    }

    #[tokio::test]
    async fn test_winning_wait_releases_the_slot() {
        let debouncer = Debouncer::new();
        assert!(debouncer.settle("doc", Duration::from_millis(5)).await);
        assert!(debouncer.lock().pending.is_empty());
    }
}
