//! simtime: a simulated clock shared by many actors.
//!
//! One [`Stepper`](prelude::Stepper) owns the tick counter and decides how
//! it advances (not at all, on demand, on a wall-clock interval, or as
//! fast as anyone waits). Clients subscribe to ticks with a
//! [`Listener`](prelude::Listener) or schedule callbacks with
//! [`Timers`](prelude::Timers). Every policy change opens a new epoch,
//! and all clients merge statuses epoch-first so nobody's view of "now"
//! ever goes backwards.
//!
//! This is the facade crate re-exporting the public API of the sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use simtime::prelude::*;
//!
//! let stepper = Stepper::start(StepperConfig::default()).unwrap();
//! let ctx = Context::new();
//! stepper.set_policy(&ctx, Policy::Manual, Duration::ZERO, None).unwrap();
//!
//! let pending = stepper.delay_async(&ctx, Tick(2), 0).unwrap();
//! stepper.step(&ctx).unwrap();
//! stepper.step(&ctx).unwrap();
//! assert_eq!(pending.recv().unwrap().unwrap().now, Tick(2));
//!
//! let listener = Listener::start(
//!     Arc::new(LocalConnector::new(stepper.clone())),
//!     ListenerConfig::default(),
//! )
//! .unwrap();
//! let (_, done) = listener.after("already due", Tick(1)).unwrap();
//! assert!(done.recv().unwrap().is_ok());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `simtime-core` | ids, status, Guard, Bimap, Context, errors, transport traits |
//! | [`fsm`] | `simtime-fsm` | generic state-machine engine |
//! | [`stepper`] | `simtime-stepper` | the Stepper actor and its RPC adapter |
//! | [`client`] | `simtime-client` | Ticker, Listener, Timers |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`simtime-core`).
pub use simtime_core as types;

/// Generic state-machine engine (`simtime-fsm`).
pub use simtime_fsm as fsm;

/// The authoritative clock (`simtime-stepper`).
pub use simtime_stepper as stepper;

/// Clock consumers (`simtime-client`).
pub use simtime_client as client;

/// Common imports.
///
/// ```rust
/// use simtime::prelude::*;
/// ```
pub mod prelude {
    pub use simtime_core::{
        ClockError, ConfigError, Connector, Context, Epoch, ErrorCode, Guard, Policy,
        StatusResponse, StepperConnection, Tick,
    };

    pub use simtime_stepper::{LocalConnector, Stepper, StepperConfig, StepperService};

    pub use simtime_client::{Listener, ListenerConfig, Ticker, Timers, TimersConfig};
}
