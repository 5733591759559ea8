//! Sliding-window rate limiter
//!
//! Keeps the timestamps of recent requests. When the window is full the
//! caller sleeps until the oldest request leaves it, plus one second of
//! slack. Waiters are served one at a time.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::info;

const SLACK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            window,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until another request fits in the window, then record it
    pub async fn acquire(&self) {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        self.prune(&mut recent, now);

        if recent.len() >= self.max_requests
            && let Some(&oldest) = recent.front()
        {
            let wait = (self.window + SLACK).saturating_sub(now.duration_since(oldest));
            if !wait.is_zero() {
                info!(
                    wait_secs = format!("{:.1}", wait.as_secs_f64()),
                    "Rate limit reached, waiting"
                );
                sleep(wait).await;
            }
            let now = Instant::now();
            self.prune(&mut recent, now);
        }

        recent.push_back(Instant::now());
    }

    /// Requests currently counted against the window
    pub async fn in_window(&self) -> usize {
        let mut recent = self.recent.lock().await;
        self.prune(&mut recent, Instant::now());
        recent.len()
    }

    fn prune(&self, recent: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = recent.front() {
            if now.duration_since(oldest) >= self.window {
                recent.pop_front();
            } else {
                break;
            }
        }
    }
}
