// ABOUTME: Bounded exponential backoff shared by the client dial loop, the
// ABOUTME: server accept loop, and the registry's packet retry loop

use std::time::Duration;

/// A bounded doubling backoff sequence with an explicit "first attempt, no
/// sleep" flag.
///
/// The original implementation this crate's client session engine is based
/// on seeded its attempt counter with a large negative float
/// (`attempts := -100000.0`) so that `base * 2^attempts` rounded down to
/// zero on the first try. That is reproduced here honestly: an integer
/// counter starting at zero, and a flag that skips the sleep entirely before
/// the first attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
    first: bool,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
            first: true,
        }
    }

    /// Duration to sleep before the next attempt. `None` on the very first
    /// call -- the caller should proceed immediately.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.first {
            self.first = false;
            return None;
        }

        let shift = self.attempt.min(31);
        let scaled = self.base.saturating_mul(1u32 << shift);
        self.attempt = self.attempt.saturating_add(1);
        Some(scaled.min(self.cap))
    }

    /// Resets the schedule after a success; the next `next_delay()` call
    /// returns `None` again.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.first = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        let mut b = Backoff::new(Duration::from_millis(50), Duration::from_secs(1));
        assert_eq!(b.next_delay(), None);
    }

    #[test]
    fn doubles_each_attempt_up_to_the_cap() {
        let mut b = Backoff::new(Duration::from_millis(50), Duration::from_secs(1));
        assert_eq!(b.next_delay(), None);
        assert_eq!(b.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(800)));
        assert_eq!(b.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(b.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn reset_returns_to_the_first_attempt_behavior() {
        let mut b = Backoff::new(Duration::from_millis(50), Duration::from_secs(1));
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), None);
        assert_eq!(b.next_delay(), Some(Duration::from_millis(50)));
    }
}
