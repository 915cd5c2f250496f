//! Duplicate-scan filter.
//!
//! A decoder keeps reporting the same card for as long as it is in front of
//! the camera. The [`Debouncer`] remembers the last accepted code and
//! suppresses repeats of it inside the window. It keeps a single slot: a
//! different code is always accepted and replaces the stored one.

use kiosk_core::DetectionEvent;
use kiosk_core::constants::DEBOUNCE_WINDOW_MS;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<DetectionEvent>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Last accepted detection, if any.
    pub fn last_accepted(&self) -> Option<&DetectionEvent> {
        self.last.as_ref()
    }

    /// Decide whether `code` observed at `now` starts a new dispense.
    ///
    /// Returns `false` when `code` equals the last accepted code and less
    /// than the window has passed since it was accepted. Otherwise the
    /// detection becomes the stored one and `true` is returned.
    pub fn accept(&mut self, code: &str, now: Instant) -> bool {
        if let Some(last) = &self.last
            && last.code == code
            && last.age_at(now) < self.window
        {
            return false;
        }

        self.last = Some(DetectionEvent::new(code, now));
        true
    }

    /// Forget the stored detection.
    pub fn clear(&mut self) {
        self.last = None;
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEBOUNCE_WINDOW_MS))
    }
}
