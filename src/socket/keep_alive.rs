use std::time::Duration;
use tokio::time::Instant;

/// Idle timer: any inbound traffic pushes the deadline out by one window,
/// and an expired deadline fires exactly once.
#[derive(Debug)]
pub struct KeepAlive {
    window: Duration,
    deadline: Option<Instant>,
}

impl KeepAlive {
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` once when the deadline has passed, then disarms
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}
