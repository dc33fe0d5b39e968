//! Outbound typing signal throttle

use std::time::Duration;

use tokio::time::Instant;

/// Decides which local typing changes go on the wire
///
/// `true` is sent at most once per window, measured from the last `true` that
/// went out. `false` always goes out so the other side clears promptly.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    window: Duration,
    last_typing: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_typing: None,
        }
    }

    /// Returns true if a `typing` frame with this value should be sent now
    pub fn should_emit(&mut self, is_typing: bool, now: Instant) -> bool {
        if !is_typing {
            return true;
        }
        if let Some(last) = self.last_typing {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_typing = Some(now);
        true
    }
}
