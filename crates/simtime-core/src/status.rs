//! Clock policy and the status snapshot exchanged between Stepper and clients.

use std::fmt;
use std::time::Duration;

use crate::id::{Epoch, Tick};

/// How and when the Stepper advances its tick counter.
///
/// Exactly one policy is active at a time. The numeric values are the
/// ones carried on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Policy {
    /// No policy selected; the clock does not move.
    #[default]
    Invalid = 0,
    /// Every delay resolves immediately by jumping the clock forward.
    NoWait = 1,
    /// The clock advances one tick per wall-clock interval.
    Measured = 2,
    /// The clock advances only on explicit steps.
    Manual = 3,
}

impl Policy {
    /// Wire representation.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decode a wire value, returning `None` for unknown numbers.
    pub fn from_i32(v: i32) -> Option<Policy> {
        match v {
            0 => Some(Policy::Invalid),
            1 => Some(Policy::NoWait),
            2 => Some(Policy::Measured),
            3 => Some(Policy::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::NoWait => write!(f, "no-wait"),
            Self::Measured => write!(f, "measured"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Immutable snapshot of the Stepper's externally visible state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusResponse {
    /// Active policy.
    pub policy: Policy,
    /// Wall-clock interval per tick under [`Policy::Measured`]; zero otherwise.
    pub measured_delay: Duration,
    /// Current tick.
    pub now: Tick,
    /// Current policy generation.
    pub epoch: Epoch,
    /// Number of outstanding delay requests.
    pub waiter_count: u64,
}

impl StatusResponse {
    /// Combine two snapshots, keeping the one furthest along.
    ///
    /// Higher epoch wins; on equal epochs the higher tick wins; on a full
    /// tie `self` is kept. An observer that folds every update it sees
    /// through this never sees time move backwards.
    pub fn merge(self, other: StatusResponse) -> StatusResponse {
        if other.epoch > self.epoch || (other.epoch == self.epoch && other.now > self.now) {
            other
        } else {
            self
        }
    }
}
