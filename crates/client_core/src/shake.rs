use std::time::Duration;

use tracing::debug;

/// Minimum spacing between two shakes that are both allowed to fire.
pub const SHAKE_THROTTLE: Duration = Duration::from_millis(500);

/// Monotonic "shake" side channel. Rejected interactions bump the counter;
/// views replay a shake animation whenever it changes.
#[derive(Debug, Clone)]
pub struct ShakeSignal {
    count: u64,
    last_fired_ms: Option<u64>,
    throttle_ms: u64,
}

impl Default for ShakeSignal {
    fn default() -> Self {
        Self::new(SHAKE_THROTTLE)
    }
}

impl ShakeSignal {
    pub fn new(throttle: Duration) -> Self {
        Self {
            count: 0,
            last_fired_ms: None,
            throttle_ms: throttle.as_millis() as u64,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns whether the shake fired; requests inside the throttle window
    /// of the previous shake are dropped.
    pub fn trigger(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_fired_ms {
            if now_ms.saturating_sub(last) < self.throttle_ms {
                debug!(now_ms, last, "shake throttled");
                return false;
            }
        }
        self.last_fired_ms = Some(now_ms);
        self.count += 1;
        true
    }
}
