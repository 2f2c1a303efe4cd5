use core::time::Duration;

/// Default delay unit; retry `k` waits `2^k` of these.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Default number of re-submissions of unprocessed records per batch.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Exponential backoff for re-submitting unprocessed records.
///
/// Retry `k` (counting from 1) waits `2^k * base`, so the default schedule is
/// 20ms, 40ms, 80ms, ... up to 10.24s on the tenth retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max_retries: u32,
}

impl Backoff {
    pub const fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }

    pub const fn base(&self) -> Duration {
        self.base
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry `attempt`. Saturates instead of overflowing.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2_u32.saturating_pow(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_twenty_millis() {
        let backoff = Backoff::default();
        let delays: Vec<u128> = (1..=4).map(|k| backoff.delay(k).as_millis()).collect();
        assert_eq!(delays, [20, 40, 80, 160]);
        assert_eq!(backoff.delay(10), Duration::from_millis(10_240));
    }

    #[test]
    fn saturates_on_huge_attempts() {
        let backoff = Backoff::new(Duration::from_secs(1), 100);
        assert_eq!(backoff.delay(64), Duration::from_secs(u64::from(u32::MAX)));
    }
}
