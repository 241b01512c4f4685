use std::time::Duration;

use super::get_random_f64;

/// Exponential backoff with jitter: attempt `n` waits between half and all of
/// `min(max, base * 2^n)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms.max(base_ms)),
        }
    }

    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        ceiling.mul_f64(0.5 + 0.5 * get_random_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_doubles_until_max() {
        let backoff = Backoff::new(100, 500);
        assert_eq!(backoff.ceiling(0), Duration::from_millis(100));
        assert_eq!(backoff.ceiling(1), Duration::from_millis(200));
        assert_eq!(backoff.ceiling(2), Duration::from_millis(400));
        assert_eq!(backoff.ceiling(3), Duration::from_millis(500));
        assert_eq!(backoff.ceiling(40), Duration::from_millis(500));
    }

    #[test]
    fn delay_stays_within_jitter_window() {
        let backoff = Backoff::new(100, 1000);
        for attempt in 0..5 {
            let delay = backoff.delay(attempt);
            assert!(delay <= backoff.ceiling(attempt));
            assert!(delay >= backoff.ceiling(attempt) / 2);
        }
    }

    #[test]
    fn zero_base_never_waits() {
        assert_eq!(Backoff::new(0, 0).delay(3), Duration::ZERO);
    }
}
