//! Client configuration.

use std::time::Duration;

use simtime_core::ConfigError;

/// Configuration for a [`Listener`](crate::Listener).
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Capacity of the subscription request channel. Default: 64.
    pub request_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
        }
    }
}

impl ListenerConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "request_capacity",
            });
        }
        Ok(())
    }
}

/// Reconnect policy for [`Timers`](crate::Timers).
///
/// After the `n`th consecutive failure the worker sleeps
/// `retry_step * min(n, max_retry_factor)`.
#[derive(Clone, Debug)]
pub struct TimersConfig {
    /// Backoff increment per consecutive failure. Default: 100ms.
    pub retry_step: Duration,
    /// Cap on the multiplier. Default: 5.
    pub max_retry_factor: u32,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            retry_step: Duration::from_millis(100),
            max_retry_factor: 5,
        }
    }
}

impl TimersConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_step.is_zero() {
            return Err(ConfigError::ZeroRetryStep);
        }
        Ok(())
    }

    /// Sleep before the next attempt after `retries` consecutive failures.
    pub fn backoff(&self, retries: u32) -> Duration {
        self.retry_step * retries.min(self.max_retry_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ListenerConfig::default().validate().is_ok());
        assert!(TimersConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_values_rejected() {
        let listener = ListenerConfig {
            request_capacity: 0,
        };
        assert_eq!(
            listener.validate(),
            Err(ConfigError::ZeroCapacity {
                field: "request_capacity"
            })
        );
        let timers = TimersConfig {
            retry_step: Duration::ZERO,
            ..TimersConfig::default()
        };
        assert_eq!(timers.validate(), Err(ConfigError::ZeroRetryStep));
    }

    #[test]
    fn backoff_is_linear_then_capped() {
        let cfg = TimersConfig::default();
        let ms = |n| Duration::from_millis(n);
        assert_eq!(cfg.backoff(0), ms(0));
        assert_eq!(cfg.backoff(1), ms(100));
        assert_eq!(cfg.backoff(3), ms(300));
        assert_eq!(cfg.backoff(5), ms(500));
        assert_eq!(cfg.backoff(40), ms(500));
    }
}
