//! Stepper configuration and validation.

use std::time::Duration;

use simtime_core::{ConfigError, Policy};

/// Startup configuration for a [`Stepper`](crate::Stepper).
#[derive(Clone, Debug)]
pub struct StepperConfig {
    /// Policy selected when the actor leaves `awaiting_start`. Default: `Invalid`.
    pub initial_policy: Policy,
    /// Wall-clock interval per tick when `initial_policy` is Measured. Default: 1s.
    pub measured_delay: Duration,
    /// Mailbox capacity. Senders block once it is full. Default: 64.
    pub mailbox_capacity: usize,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            initial_policy: Policy::Invalid,
            measured_delay: Duration::from_secs(1),
            mailbox_capacity: 64,
        }
    }
}

impl StepperConfig {
    /// A configuration starting under `policy` with default delay and capacity.
    pub fn with_policy(policy: Policy) -> Self {
        Self {
            initial_policy: policy,
            ..Self::default()
        }
    }

    /// Check structural invariants.
    ///
    /// The measured delay only matters for a Measured start, where it
    /// must be positive; for the other policies it is ignored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "mailbox_capacity",
            });
        }
        if self.initial_policy == Policy::Measured && self.measured_delay.is_zero() {
            return Err(ConfigError::InvalidMeasuredDelay {
                reason: "measured start requires a positive delay".into(),
            });
        }
        Ok(())
    }

    /// Delay that accompanies the initial policy.
    pub(crate) fn initial_delay(&self) -> Duration {
        match self.initial_policy {
            Policy::Measured => self.measured_delay,
            _ => Duration::ZERO,
        }
    }
}
