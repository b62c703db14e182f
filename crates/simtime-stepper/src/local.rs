//! In-process [`Connector`] over a [`StepperService`].
//!
//! Requests are encoded to the wire shape and decoded again on the way
//! back, so a client wired to a local Stepper sees exactly the errors a
//! remote one would.

use simtime_core::{ClockError, Connector, Context, StatusResponse, StepperConnection, Tick};

use crate::rpc::{StepperRequest, StepperService};
use crate::stepper::Stepper;

/// Connects clients to a Stepper living in the same process.
#[derive(Clone, Debug)]
pub struct LocalConnector {
    service: StepperService,
}

impl LocalConnector {
    /// Connector for `stepper`.
    pub fn new(stepper: Stepper) -> Self {
        Self {
            service: StepperService::new(stepper),
        }
    }

    /// Connector for an existing service.
    pub fn from_service(service: StepperService) -> Self {
        Self { service }
    }
}

impl Connector for LocalConnector {
    fn connect(&self) -> Result<Box<dyn StepperConnection>, ClockError> {
        if !self.service.stepper().is_running() {
            return Err(ClockError::unavailable("local stepper is not running"));
        }
        Ok(Box::new(LocalConnection {
            service: self.service.clone(),
        }))
    }
}

struct LocalConnection {
    service: StepperService,
}

impl LocalConnection {
    fn roundtrip(
        &self,
        ctx: &Context,
        request: StepperRequest,
    ) -> Result<StatusResponse, ClockError> {
        self.service
            .call(ctx, &request.encode())
            .into_status()
    }
}

impl StepperConnection for LocalConnection {
    fn delay(
        &mut self,
        ctx: &Context,
        at_least: Tick,
        jitter: u64,
    ) -> Result<StatusResponse, ClockError> {
        self.roundtrip(ctx, StepperRequest::Delay { at_least, jitter })
    }

    fn get_status(&mut self, ctx: &Context) -> Result<StatusResponse, ClockError> {
        self.roundtrip(ctx, StepperRequest::GetStatus)
    }
}
