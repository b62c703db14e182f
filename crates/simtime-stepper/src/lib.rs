//! The authoritative simulated clock.
//!
//! A [`Stepper`] owns the tick counter and the active [`Policy`]. It runs
//! as a single actor thread: every request is a message in a bounded
//! mailbox, dispatched through a state machine with one state per policy
//! plus `awaiting_start` and the terminal `faulted`. Callers long-poll with
//! [`Stepper::delay`] and are answered once the tick reaches their due
//! value, or with [`ClockError::DelayCanceled`] if a reset intervenes.
//!
//! [`StepperService`] is the RPC surface over a Stepper, and
//! [`LocalConnector`] hands in-process clients connections that go
//! through it.
//!
//! [`Policy`]: simtime_core::Policy
//! [`ClockError::DelayCanceled`]: simtime_core::ClockError::DelayCanceled

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod local;
pub mod messages;
pub mod rpc;

mod actor;
mod measured;
mod states;
mod stepper;

pub use config::StepperConfig;
pub use local::LocalConnector;
pub use messages::PolicyRequest;
pub use rpc::{StepperRequest, StepperService, WireError, WireRequest, WireResponse, WireStatus};
pub use stepper::{DelayReceiver, Stepper};
