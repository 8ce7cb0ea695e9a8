/*!
 * Deadlines
 *
 * Thin monotonic-clock collaborator shared by every timed wait. A
 * deadline already in the past makes a timed wait report timeout
 * before any OS call is issued.
 */

use std::time::{Duration, Instant};

/// A point on the monotonic clock a timed wait must not sleep past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `d` from now.
    pub fn after(d: Duration) -> Self {
        Self {
            at: Instant::now() + d,
        }
    }

    /// Deadline at an absolute instant.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// The underlying instant, for APIs that take absolute timeouts.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Remaining time, or `None` once the deadline has passed.
    pub fn poll(&self) -> Option<Duration> {
        let remaining = self.at.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }

    pub fn has_passed(&self) -> bool {
        self.poll().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_future_deadline_has_remaining_time() {
        let d = Deadline::after(Duration::from_secs(60));
        let remaining = d.poll().unwrap();
        assert!(remaining > Duration::from_secs(59));
        assert!(!d.has_passed());
    }

    #[test]
    fn test_past_deadline_is_expired() {
        let d = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(d.poll().is_none());
        assert!(d.has_passed());
    }

    #[test]
    fn test_zero_duration_expires_immediately() {
        let d = Deadline::after(Duration::ZERO);
        assert!(d.has_passed());
    }
}
