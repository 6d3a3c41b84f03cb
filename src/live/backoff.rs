//! Bounded exponential backoff with jitter for watch-queue re-registration

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// The minimum step is at least one millisecond so the delays always grow
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(Duration::from_millis(1));
        let max = max.max(min);
        Self { min, max, current: min }
    }

    /// Delay before the next attempt: the current step plus up to half of it as jitter
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let half = (base.as_millis() / 2) as u64;
        let jitter = if half == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=half)
        };
        self.current = next_backoff(self.current, self.max);
        base + Duration::from_millis(jitter)
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}
