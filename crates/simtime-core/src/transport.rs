//! Client-side view of the Stepper's RPC surface.
//!
//! Ticker and Timers only need the long-poll `delay` and a status read.
//! They obtain connections from a [`Connector`] and tear a connection
//! down (by dropping it) whenever a call fails, then ask for a new one.

use crate::context::Context;
use crate::error::ClockError;
use crate::id::Tick;
use crate::status::StatusResponse;

/// One live connection to a Stepper.
pub trait StepperConnection: Send {
    /// Block until the Stepper's tick reaches `at_least`, then return its status.
    fn delay(
        &mut self,
        ctx: &Context,
        at_least: Tick,
        jitter: u64,
    ) -> Result<StatusResponse, ClockError>;

    /// Read the Stepper's status without blocking on the clock.
    fn get_status(&mut self, ctx: &Context) -> Result<StatusResponse, ClockError>;
}

/// Factory for [`StepperConnection`]s; stands in for endpoint and dial options.
pub trait Connector: Send + Sync {
    /// Open a new connection.
    fn connect(&self) -> Result<Box<dyn StepperConnection>, ClockError>;
}
