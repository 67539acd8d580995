//! The sliding-window gate in front of heavy (`get_replay`/`get_replay_by_id`)
//! API calls (spec.md §4.3).
//!
//! The osu! API v1 only tolerates a handful of replay downloads per minute;
//! this limiter anchors a 60-second window at the first heavy call after
//! any idle period longer than the window, and makes every call past the
//! configured burst budget sleep out the rest of the window. State lives on
//! the `RateLimiter` instance (not a process-wide global, per spec.md §9's
//! redesign note), behind a single mutex; the sleep itself happens with the
//! lock released so unrelated callers aren't blocked on it.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// The sliding window's length.
pub const RATELIMIT_RESET: Duration = Duration::from_secs(60);

struct Window {
    start: Option<Instant>,
    count: usize,
}

/// A sliding-window limiter for heavy API calls.
pub struct RateLimiter {
    burst: usize,
    window: Mutex<Window>,
}

impl RateLimiter {
    /// Creates a limiter that allows `burst` heavy calls per
    /// [`RATELIMIT_RESET`]-length window.
    pub fn new(burst: usize) -> Self {
        RateLimiter {
            burst,
            window: Mutex::new(Window {
                start: None,
                count: 0,
            }),
        }
    }

    /// Blocks (sleeping, never busy-waiting) until another heavy call is
    /// allowed, then reserves a slot in the current window.
    ///
    /// Dropping the returned future before it resolves cancels the wait
    /// cleanly: no slot is reserved and no other caller is affected.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                let elapsed_since_start = window.start.map(|start| now.duration_since(start));

                match elapsed_since_start {
                    None => {
                        window.start = Some(now);
                        window.count = 1;
                        None
                    }
                    Some(elapsed) if elapsed >= RATELIMIT_RESET => {
                        // Idle past the reset: anchor a fresh window here.
                        window.start = Some(now);
                        window.count = 1;
                        None
                    }
                    Some(_) if window.count < self.burst => {
                        window.count += 1;
                        None
                    }
                    Some(elapsed) => Some(RATELIMIT_RESET - elapsed),
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}
