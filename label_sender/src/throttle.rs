//! Rate limit for outgoing predictions.
//!
use std::time::{Duration, Instant};

/// Lets one call through per interval and drops the rest.
///
/// Detections arrive once per frame; only the first one in every interval is
/// forwarded. A call exactly one interval after the last accepted one is still
/// dropped.
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a call at `now` may go through. Accepted calls start a new interval.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) <= self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
