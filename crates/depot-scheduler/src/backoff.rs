use chrono::Duration as ChronoDuration;
use std::time::Duration;

/// Failure scheduling knobs from the `retry` configuration section.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub exponential: bool,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            exponential: true,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// The backoff applied after the `retry_count`-th failure (1-indexed):
/// `min(initial_delay * 2^(retry_count-1), max_delay)`, or
/// `min(initial_delay * retry_count, max_delay)` when exponential backoff
/// is disabled.
pub fn backoff_for(retry_count: u32, cfg: &RetryConfig) -> ChronoDuration {
    let delay = if cfg.exponential {
        let exponent = retry_count.saturating_sub(1).min(32);
        cfg.initial_delay.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
    } else {
        cfg.initial_delay.saturating_mul(retry_count.max(1))
    };
    let capped = delay.min(cfg.max_delay);
    ChronoDuration::from_std(capped).unwrap_or(ChronoDuration::max_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_doubles_each_retry() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            exponential: true,
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(backoff_for(1, &cfg), ChronoDuration::milliseconds(100));
        assert_eq!(backoff_for(2, &cfg), ChronoDuration::milliseconds(200));
        assert_eq!(backoff_for(3, &cfg), ChronoDuration::milliseconds(400));
    }

    #[test]
    fn exponential_caps_at_max_delay() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            exponential: true,
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(backoff_for(10, &cfg), ChronoDuration::seconds(1));
    }

    #[test]
    fn linear_when_exponential_disabled() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            exponential: false,
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(backoff_for(3, &cfg), ChronoDuration::milliseconds(300));
    }
}
