use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff for gateway calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Additive jitter of up to a tenth of the delay, applied after the
    /// max-delay clamp.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Computes the delay following `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let mut next = current.mul_f64(self.multiplier);
        if next > self.max_delay {
            next = self.max_delay;
        }

        if self.jitter {
            let bound = (next / 10).as_millis() as u64;
            if bound > 0 {
                let extra = rand::rng().random_range(0..bound);
                next += Duration::from_millis(extra);
            }
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn doubles_until_the_cap() {
        let policy = no_jitter();
        let d1 = policy.next_delay(Duration::from_secs(5));
        assert_eq!(d1, Duration::from_secs(10));
        let d2 = policy.next_delay(Duration::from_secs(40));
        assert_eq!(d2, Duration::from_secs(60));
        let d3 = policy.next_delay(Duration::from_secs(60));
        assert_eq!(d3, Duration::from_secs(60));
    }

    #[test]
    fn jitter_adds_at_most_a_tenth() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let next = policy.next_delay(Duration::from_secs(10));
            assert!(next >= Duration::from_secs(20));
            assert!(next < Duration::from_secs(22) + Duration::from_millis(1));
        }
    }

    #[test]
    fn default_matches_the_production_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert!(policy.jitter);
    }
}
