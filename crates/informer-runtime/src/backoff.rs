//! Stateful exponential backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffPolicy;

/// Produces successive delays for a [`BackoffPolicy`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use informer_runtime::{Backoff, BackoffPolicy};
///
/// let mut backoff = Backoff::new(BackoffPolicy {
///     initial_delay: Duration::from_millis(100),
///     multiplier: 2.0,
///     max_delay: Duration::from_millis(300),
///     jitter: 0.0,
/// });
/// assert_eq!(backoff.next_delay(), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(200));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(300));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(300));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    steps: u32,
}

impl Backoff {
    /// Start a backoff sequence.
    pub fn new(policy: BackoffPolicy) -> Self {
        let current = policy.initial_delay.min(policy.max_delay);
        Self {
            policy,
            current,
            steps: 0,
        }
    }

    /// Next delay in the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.steps = self.steps.saturating_add(1);

        if base < self.policy.max_delay {
            let grown = Duration::try_from_secs_f64(base.as_secs_f64() * self.policy.multiplier)
                .unwrap_or(self.policy.max_delay);
            self.current = grown.min(self.policy.max_delay);
        }

        // the cap bounds the base; jitter goes on top so capped delays still spread
        with_jitter(base, self.policy.jitter)
    }

    /// Number of delays handed out since creation or the last reset.
    #[inline]
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Restart from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay.min(self.policy.max_delay);
        self.steps = 0;
    }
}

fn with_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor: f64 = rand::thread_rng().gen_range(0.0..=jitter);
    delay + Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or_default()
}
