// ABOUTME: Fixed-window bandwidth throttle for relayed streams
// ABOUTME: Once a 0.5s window's budget is spent, pauses until its bytes are paid for

use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const WINDOW: Duration = Duration::from_millis(500);

/// Coarse rate limit: at most `window_byte_budget` bytes pass before the
/// relay pauses. The pause covers every byte sent in the window, so chunks
/// larger than the budget still respect the rate.
#[derive(Debug)]
pub struct Throttle {
    bytes_per_sec: u64,
    window_byte_budget: u64,
    bytes_since_pause: u64,
    window_started: Instant,
}

impl Throttle {
    /// `None` when throttling is disabled (rate 0)
    pub fn new(bytes_per_sec: u64) -> Option<Self> {
        if bytes_per_sec == 0 {
            return None;
        }
        let budget = (bytes_per_sec as f64 * WINDOW.as_secs_f64()).floor() as u64;
        Some(Self {
            bytes_per_sec,
            window_byte_budget: budget.max(1),
            bytes_since_pause: 0,
            window_started: Instant::now(),
        })
    }

    pub fn window_byte_budget(&self) -> u64 {
        self.window_byte_budget
    }

    /// Account for `n` forwarded bytes, sleeping if the window budget is reached
    pub async fn consume(&mut self, n: usize) {
        if self.window_started.elapsed() >= WINDOW {
            self.reset();
        }

        self.bytes_since_pause += n as u64;
        if self.bytes_since_pause < self.window_byte_budget {
            return;
        }

        let owed = Duration::from_secs_f64(self.bytes_since_pause as f64 / self.bytes_per_sec as f64);
        let remaining = owed.saturating_sub(self.window_started.elapsed());
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.bytes_since_pause = 0;
        self.window_started = Instant::now();
    }
}
