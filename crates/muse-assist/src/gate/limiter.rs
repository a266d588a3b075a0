//! Sliding-window admission budget.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counts admissions over a rolling window.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            admissions: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to consume one admission. False means over budget until an
    /// earlier admission ages out of the window.
    pub fn try_admit(&self) -> bool {
        let now = Instant::now();
        let mut admissions = self.lock();
        while admissions
            .front()
            .map(|t| now.duration_since(*t) >= self.window)
            .unwrap_or(false)
        {
            admissions.pop_front();
        }
        if admissions.len() >= self.limit {
            return false;
        }
        admissions.push_back(now);
        true
    }

    /// Admissions currently inside the window.
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        let mut admissions = self.lock();
        while admissions
            .front()
            .map(|t| now.duration_since(*t) >= self.window)
            .unwrap_or(false)
        {
            admissions.pop_front();
        }
        admissions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.admissions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_enforced() {
        let window = SlidingWindow::new(3, Duration::from_secs(60));
        assert!(window.try_admit());
        assert!(window.try_admit());
        assert!(window.try_admit());
        assert!(!window.try_admit());
        assert_eq!(window.in_window(), 3);
    }

    #[test]
    fn test_budget_recovers_as_the_window_slides() {
        let window = SlidingWindow::new(1, Duration::from_millis(30));
        assert!(window.try_admit());
        assert!(!window.try_admit());
        std::thread::sleep(Duration::from_millis(40));
        assert!(window.try_admit());
    }
}
