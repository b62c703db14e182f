//! Mailbox messages understood by the Stepper actor.

use std::time::Duration;

use crossbeam_channel::Sender;
use simtime_core::{ClockError, Epoch, Policy, StatusResponse, Tick};
use simtime_fsm::Tagged;

/// Reply channel for operations that answer with a status snapshot.
pub type StatusReply = Sender<Result<StatusResponse, ClockError>>;

/// Reply channel for operations that answer with nothing.
pub type EmptyReply = Sender<Result<(), ClockError>>;

/// A validated policy change target.
///
/// Only combinations that the Stepper can act on are representable:
/// NoWait and Manual carry no delay, Measured always carries a positive one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyRequest {
    /// Resolve every delay immediately.
    NoWait,
    /// Advance only on explicit steps.
    Manual,
    /// Advance one tick per `delay` of wall-clock time.
    Measured {
        /// Wall-clock interval per tick.
        delay: Duration,
    },
}

impl PolicyRequest {
    /// Check a raw `(policy, delay)` pair.
    pub fn validate(policy: Policy, delay: Duration) -> Result<PolicyRequest, ClockError> {
        match policy {
            Policy::NoWait | Policy::Manual if !delay.is_zero() => Err(
                ClockError::invalid_argument(
                    "measured_delay",
                    format!("must be zero for the {policy} policy, got {delay:?}"),
                ),
            ),
            Policy::NoWait => Ok(PolicyRequest::NoWait),
            Policy::Manual => Ok(PolicyRequest::Manual),
            Policy::Measured if delay.is_zero() => Err(ClockError::invalid_argument(
                "measured_delay",
                "must be positive for the measured policy",
            )),
            Policy::Measured => Ok(PolicyRequest::Measured { delay }),
            Policy::Invalid => Err(ClockError::invalid_argument(
                "policy",
                "the invalid policy cannot be selected",
            )),
        }
    }

    /// The policy this request selects.
    pub fn policy(self) -> Policy {
        match self {
            Self::NoWait => Policy::NoWait,
            Self::Manual => Policy::Manual,
            Self::Measured { .. } => Policy::Measured,
        }
    }

    /// Measured delay carried by this request, zero for the other policies.
    pub fn measured_delay(self) -> Duration {
        match self {
            Self::Measured { delay } => delay,
            _ => Duration::ZERO,
        }
    }
}

/// Request envelope posted to the Stepper's mailbox.
#[derive(Debug)]
pub enum StepperMessage {
    /// Change the active policy.
    SetPolicy {
        /// Target policy.
        request: PolicyRequest,
        /// Epoch the caller believes is current; `None` is unconditional.
        match_epoch: Option<Epoch>,
        /// Answered after the transition completes.
        reply: StatusReply,
    },
    /// Advance one tick.
    Step {
        /// Answered with the post-step status.
        reply: StatusReply,
    },
    /// Long-poll until the tick reaches `at_least`.
    Delay {
        /// Due tick.
        at_least: Tick,
        /// Accepted for compatibility; does not move the due tick.
        jitter: u64,
        /// Answered on expiry or cancellation.
        reply: StatusReply,
    },
    /// Return to tick 0 and the invalid policy, canceling all delays.
    Reset {
        /// Answered after the transition completes.
        reply: EmptyReply,
    },
    /// Read the current status.
    GetStatus {
        /// Answered immediately.
        reply: StatusReply,
    },
    /// Wall-clock tick from the Measured ticker that captured `guard`.
    AutoStep {
        /// Epoch current when the ticker was started.
        guard: Epoch,
    },
    /// Stop the actor.
    Shutdown,
}

/// Dispatch tag for [`StepperMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepperTag {
    /// `SetPolicy` selecting NoWait.
    NoWaitPolicy,
    /// `SetPolicy` selecting Manual.
    ManualPolicy,
    /// `SetPolicy` selecting Measured.
    MeasuredPolicy,
    /// `Step`.
    Step,
    /// `Delay`.
    Delay,
    /// `Reset`.
    Reset,
    /// `GetStatus`.
    GetStatus,
    /// `AutoStep`.
    AutoStep,
    /// `Shutdown`.
    Shutdown,
}

impl Tagged for StepperMessage {
    type Tag = StepperTag;

    fn tag(&self) -> StepperTag {
        match self {
            Self::SetPolicy { request, .. } => match request {
                PolicyRequest::NoWait => StepperTag::NoWaitPolicy,
                PolicyRequest::Manual => StepperTag::ManualPolicy,
                PolicyRequest::Measured { .. } => StepperTag::MeasuredPolicy,
            },
            Self::Step { .. } => StepperTag::Step,
            Self::Delay { .. } => StepperTag::Delay,
            Self::Reset { .. } => StepperTag::Reset,
            Self::GetStatus { .. } => StepperTag::GetStatus,
            Self::AutoStep { .. } => StepperTag::AutoStep,
            Self::Shutdown => StepperTag::Shutdown,
        }
    }
}

impl StepperMessage {
    /// Answer this request with `err`. Messages without a reply channel
    /// are simply dropped.
    pub fn fail(self, err: ClockError) {
        // Receivers may already be gone; nobody is left to tell.
        match self {
            Self::SetPolicy { reply, .. }
            | Self::Step { reply }
            | Self::Delay { reply, .. }
            | Self::GetStatus { reply } => {
                let _ = reply.send(Err(err));
            }
            Self::Reset { reply } => {
                let _ = reply.send(Err(err));
            }
            Self::AutoStep { .. } | Self::Shutdown => {}
        }
    }
}
