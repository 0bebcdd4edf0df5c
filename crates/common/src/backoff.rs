use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter, clamped to a `[floor, ceiling]` band.
///
/// Formula: clamp(min(ceiling, floor * 2^attempt) + random_jitter, floor, ceiling)
///
/// The user stream loop uses the default band of 5s..30s so that a flapping
/// exchange socket is never hammered and never left idle for long.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    floor: Duration,
    ceiling: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(5),
            ceiling: Duration::from_secs(30),
            jitter_factor: 0.1,
            attempt: 0,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff.
    ///
    /// # Arguments
    /// * `floor` - First delay and lower bound of every delay
    /// * `ceiling` - Upper bound of every delay
    /// * `jitter_factor` - Jitter as a fraction of delay (0.0 to 1.0). Negative values are clamped to 0.
    pub fn new(floor: Duration, ceiling: Duration, jitter_factor: f64) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            // gen_range panics on an inverted range
            jitter_factor: jitter_factor.max(0.0),
            attempt: 0,
        }
    }

    /// Delay for the current attempt without advancing the counter and without jitter.
    pub fn base_delay(&self) -> Duration {
        self.floor
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.ceiling)
    }

    /// Calculate the next delay and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let capped = self.base_delay();

        let jitter_range = capped.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let secs = (capped.as_secs_f64() + jitter)
            .clamp(self.floor.as_secs_f64(), self.ceiling.as_secs_f64());

        self.attempt = self.attempt.saturating_add(1);

        Duration::from_secs_f64(secs)
    }

    /// Reset the attempt counter (call after a successful subscription).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_floor() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(60), 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(10));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_default_band() {
        let mut backoff = ExponentialBackoff::default();

        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(5), "delay was {:?}", delay);
            assert!(delay <= Duration::from_secs(30), "delay was {:?}", delay);
        }
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), 0.0);

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_inverted_bounds() {
        let backoff =
            ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(1), 0.0);
        assert_eq!(backoff.base_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_negative_jitter_clamped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), -0.5);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
