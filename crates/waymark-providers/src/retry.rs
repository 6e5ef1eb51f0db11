use std::time::Duration;

/// Exponential backoff schedule for transient provider errors: 100ms, 400ms,
/// 1.6s, +-20% jitter, max 3 retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    base_delays_ms: [u64; 3],
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let idx = (attempt as usize).min(self.base_delays_ms.len() - 1);
        let base = self.base_delays_ms[idx] as f64;
        // jitter_unit in [-1.0, 1.0] maps to +-20%
        let jittered = base * (1.0 + 0.2 * jitter_unit.clamp(-1.0, 1.0));
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delays_ms: [100, 400, 1600],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_per_attempt() {
        let policy = retry_policy();
        let d0 = policy.delay_for_attempt(0, 0.0);
        let d1 = policy.delay_for_attempt(1, 0.0);
        let d2 = policy.delay_for_attempt(2, 0.0);
        assert_eq!(d0, Duration::from_millis(100));
        assert_eq!(d1, Duration::from_millis(400));
        assert_eq!(d2, Duration::from_millis(1600));
    }

    #[test]
    fn jitter_stays_within_twenty_percent() {
        let policy = retry_policy();
        let d = policy.delay_for_attempt(0, 1.0);
        assert_eq!(d, Duration::from_millis(120));
        let d = policy.delay_for_attempt(0, -1.0);
        assert_eq!(d, Duration::from_millis(80));
    }
}
