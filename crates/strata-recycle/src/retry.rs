use std::time::Duration;
use strata_common::config::RecycleConfig;

/// Capped exponential backoff between reclaim attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    #[must_use]
    pub const fn from_config(config: &RecycleConfig) -> Self {
        Self::new(config.base_backoff(), config.max_backoff())
    }

    /// Delay to wait after the `failures`-th consecutive failure (1-based)
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        if self.base_delay.is_zero() || failures == 0 {
            return Duration::ZERO;
        }
        let shift = failures.saturating_sub(1).min(31);
        let scaled = self.base_delay.saturating_mul(1u32 << shift);
        scaled.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_growth_is_capped() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn zero_base_never_waits() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(policy.delay_after(5), Duration::ZERO);
    }

    #[test]
    fn built_from_config() {
        let policy = BackoffPolicy::from_config(&RecycleConfig::default());
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(30), Duration::from_secs(60));
    }
}
