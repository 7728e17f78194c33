//! Retry pacing for a failing watch subscription.

use rand::Rng;
use tokio::time::Duration;

pub(crate) trait ExponentialBackoff: Sized {
    fn add_spread(&self, spread: Duration) -> Self;
    fn exponential_backoff(&self, multiplier: f64, max: Duration) -> Self;
}

impl ExponentialBackoff for Duration {
    fn add_spread(&self, spread: Duration) -> Self {
        if spread.is_zero() {
            return *self;
        }
        let mut rng = rand::rng();
        let spread = rng.random_range(0..spread.as_nanos());
        self.saturating_add(Duration::from_nanos(spread.try_into().unwrap_or(u64::MAX)))
    }

    fn exponential_backoff(&self, multiplier: f64, max: Duration) -> Self {
        self.mul_f64(multiplier).min(max)
    }
}

/// Knobs for the delay schedule between watch restart attempts.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay before the first restart attempt.
    pub initial_delay: Duration,

    /// Ceiling the delay schedule saturates at.
    pub max_delay: Duration,

    /// Growth factor applied between consecutive failures.
    pub multiplier: f64,

    /// Upper bound of the random jitter added to each delay.
    pub spread: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            spread: Duration::from_millis(500),
        }
    }
}

/// Tracks how many consecutive failures have gone unresolved and what
/// the next restart delay should be.
///
/// [Backoff::reset] is called whenever a watch event is successfully
/// processed; resync activity never touches it.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            config,
            attempt: 0,
            delay,
        }
    }

    /// Computes the delay for the next restart attempt.
    ///
    /// The pre-jitter schedule is non-decreasing and capped at
    /// `max_delay`.
    pub fn next(&mut self) -> Duration {
        if self.attempt > 0 {
            self.delay = self
                .delay
                .exponential_backoff(self.config.multiplier, self.config.max_delay);
        }
        self.attempt += 1;
        self.delay.add_spread(self.config.spread)
    }

    /// Returns the attempt count to zero; the next failure starts the
    /// schedule over from `initial_delay`.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.delay = self.config.initial_delay;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
