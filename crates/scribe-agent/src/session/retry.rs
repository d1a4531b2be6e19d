use std::hash::{DefaultHasher, Hash, Hasher};

/// Backoff curve for automatic re-dispatch of retryable turn failures.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryBackoffConfig {
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryBackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }
}

/// Bounded retry policy for transient/network turn failures.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total dispatch attempts for one turn, the first included.
    pub max_attempts: u32,
    pub backoff: RetryBackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: RetryBackoffConfig::default(),
        }
    }
}

/// Delay to sleep after `attempt` (1-based) failed, before the next one.
pub fn delay_for_attempt_ms(attempt: u32, config: &RetryBackoffConfig, jitter_seed: u64) -> u64 {
    let exp = (attempt.saturating_sub(1)) as i32;
    let base = (config.initial_delay_ms as f64) * config.backoff_factor.powi(exp);
    let mut delay = base.min(config.max_delay_ms as f64);
    if config.jitter {
        delay *= jitter_factor(attempt, jitter_seed);
    }
    delay.round().max(0.0) as u64
}

// Deterministic xorshift jitter in [0.5, 1.5); reproducible per turn so a
// scripted test can pin exact delays by fixing the seed.
fn jitter_factor(attempt: u32, jitter_seed: u64) -> f64 {
    let mut x = jitter_seed ^ ((attempt as u64) << 32) ^ 0x9E3779B97F4A7C15;
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    let r = x.wrapping_mul(0x2545F4914F6CDD1D);
    let unit = (r as f64) / (u64::MAX as f64);
    0.5 + unit
}

pub(super) fn jitter_seed_for(turn_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    turn_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_for_attempt_ms_no_jitter_expected_exponential_sequence() {
        let config = RetryBackoffConfig {
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            jitter: false,
        };
        assert_eq!(delay_for_attempt_ms(1, &config, 0), 500);
        assert_eq!(delay_for_attempt_ms(2, &config, 0), 1_000);
        assert_eq!(delay_for_attempt_ms(3, &config, 0), 2_000);
    }

    #[test]
    fn delay_for_attempt_ms_caps_at_max_delay() {
        let config = RetryBackoffConfig {
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 1_500,
            jitter: false,
        };
        assert_eq!(delay_for_attempt_ms(4, &config, 0), 1_500);
    }

    #[test]
    fn delay_for_attempt_ms_with_jitter_expected_within_bounds() {
        let config = RetryBackoffConfig {
            initial_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 10_000,
            jitter: true,
        };
        let delay = delay_for_attempt_ms(2, &config, 42);
        assert!((500..=1_500).contains(&delay), "{delay}");
    }

    #[test]
    fn jitter_is_deterministic_per_seed_and_attempt() {
        let config = RetryBackoffConfig::default();
        assert_eq!(
            delay_for_attempt_ms(2, &config, 7),
            delay_for_attempt_ms(2, &config, 7)
        );
    }

    #[test]
    fn default_policy_bounds_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.backoff.jitter);
    }
}
