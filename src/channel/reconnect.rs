use std::time::Duration;

use rand::Rng;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Floor applied to every computed delay, so a zero policy cannot spin.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// How long to wait before the next connection attempt after a drop.
///
/// Every policy retries until the channel is explicitly closed; they only
/// differ in the spacing of attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// Doubling delay starting at `base`, capped at `max`. With `jitter`, each
    /// delay is scaled by a random factor in `[0.5, 1.0]`.
    CappedExponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based, reset after every
    /// successful connection). Never shorter than [`MIN_RECONNECT_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self {
            Self::Fixed(delay) => *delay,
            Self::CappedExponential { base, max, jitter } => {
                let factor = 2_u32.saturating_pow(attempt.min(16));
                let delay = base.saturating_mul(factor).min(*max);
                if *jitter {
                    delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
                } else {
                    delay
                }
            }
        };
        delay.max(MIN_RECONNECT_DELAY)
    }
}
