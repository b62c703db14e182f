//! Client-side consumers of the simulated clock.
//!
//! - [`Ticker`]: long-polls a Stepper and streams every tick it observes.
//! - [`Listener`]: owns a Ticker and resolves waiters (channels) once the
//!   merged clock reaches their due tick.
//! - [`Timers`]: runs callbacks after a delay in ticks, on a worker that
//!   only exists while timers are pending.
//!
//! All three reach the Stepper through a
//! [`Connector`](simtime_core::Connector), reconnecting on failure.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod listener;
pub mod supervisor;
pub mod ticker;
pub mod timers;

pub use config::{ListenerConfig, TimersConfig};
pub use listener::{CancelReceiver, Completion, CompletionReceiver, Listener};
pub use supervisor::Supervisor;
pub use ticker::Ticker;
pub use timers::{TimerCallback, Timers};
