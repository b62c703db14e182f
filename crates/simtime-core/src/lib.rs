//! Core types for the simtime simulated-clock subsystem.
//!
//! This is the leaf crate. It defines the tick and epoch identifiers, the
//! clock [`Policy`] and [`StatusResponse`] snapshot with its merge order,
//! the [`Guard`] staleness token, the dual-keyed [`Bimap`], the call
//! [`Context`], the error taxonomy, and the transport traits clients use
//! to reach a Stepper.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bimap;
pub mod context;
pub mod error;
pub mod guard;
pub mod id;
pub mod status;
pub mod transport;

pub use bimap::{Bimap, BimapItem};
pub use context::{context_with_tick, tick_from_context, Context, LOG_TARGET};
pub use error::{ClockError, ConfigError, ErrorCode};
pub use guard::Guard;
pub use id::{Epoch, Tick};
pub use status::{Policy, StatusResponse};
pub use transport::{Connector, StepperConnection};
