//! RPC adapter: transcoding between the wire shape and Stepper calls.
//!
//! The wire shape is deliberately loose (a method name plus integer
//! fields) so that every out-of-range or missing value is caught here,
//! before a request reaches the actor. Errors travel back as a
//! [`WireError`] carrying a stable code and enough detail to rebuild the
//! original [`ClockError`] on the client side.

use std::time::Duration;

use indexmap::IndexMap;
use simtime_core::{ClockError, Context, Epoch, ErrorCode, Policy, StatusResponse, Tick};

use crate::stepper::Stepper;

/// Method names accepted by [`StepperService::call`].
pub mod method {
    /// Change the clock policy.
    pub const SET_POLICY: &str = "SetPolicy";
    /// Advance one tick.
    pub const STEP: &str = "Step";
    /// Long-poll until a tick is reached.
    pub const DELAY: &str = "Delay";
    /// Return to tick 0 under the invalid policy.
    pub const RESET: &str = "Reset";
    /// Read the clock.
    pub const GET_STATUS: &str = "GetStatus";
}

/// Field names used in [`WireRequest::fields`].
pub mod field {
    /// Policy number, see [`Policy::as_i32`](simtime_core::Policy::as_i32).
    pub const POLICY: &str = "policy";
    /// Measured delay in nanoseconds.
    pub const MEASURED_DELAY_NS: &str = "measured_delay_ns";
    /// Epoch guard; negative means unconditional.
    pub const MATCH_EPOCH: &str = "match_epoch";
    /// Due tick of a delay.
    pub const AT_LEAST: &str = "at_least";
    /// Jitter of a delay.
    pub const JITTER: &str = "jitter";
}

// ── Wire types ───────────────────────────────────────────────────

/// An undecoded request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireRequest {
    /// One of the [`method`] constants.
    pub method: String,
    /// Named integer arguments.
    pub fields: IndexMap<String, i64>,
}

impl WireRequest {
    /// A request for `method` with no fields.
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: &str, value: i64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    fn required(&self, name: &str) -> Result<i64, ClockError> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| ClockError::InvalidMessage {
                reason: format!("{}: missing field '{name}'", self.method),
            })
    }

    fn non_negative(&self, name: &str, default: i64) -> Result<u64, ClockError> {
        let value = self.fields.get(name).copied().unwrap_or(default);
        u64::try_from(value)
            .map_err(|_| ClockError::invalid_argument(name, format!("must be >= 0, got {value}")))
    }
}

/// Status snapshot as it travels on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireStatus {
    /// Policy number.
    pub policy: i32,
    /// Measured delay in nanoseconds.
    pub measured_delay_ns: i64,
    /// Current tick.
    pub now: i64,
    /// Current epoch.
    pub epoch: i64,
    /// Outstanding delays.
    pub waiter_count: i64,
}

impl From<StatusResponse> for WireStatus {
    fn from(s: StatusResponse) -> Self {
        Self {
            policy: s.policy.as_i32(),
            measured_delay_ns: saturate(s.measured_delay.as_nanos()),
            now: saturate(u128::from(s.now.0)),
            epoch: saturate(u128::from(s.epoch.0)),
            waiter_count: saturate(u128::from(s.waiter_count)),
        }
    }
}

impl WireStatus {
    /// Rebuild a typed snapshot, rejecting values no Stepper can produce.
    pub fn decode(&self) -> Result<StatusResponse, ClockError> {
        let policy = Policy::from_i32(self.policy).ok_or_else(|| ClockError::InvalidMessage {
            reason: format!("status: unknown policy {}", self.policy),
        })?;
        let unsigned = |name: &str, v: i64| {
            u64::try_from(v).map_err(|_| ClockError::InvalidMessage {
                reason: format!("status: negative {name} {v}"),
            })
        };
        Ok(StatusResponse {
            policy,
            measured_delay: Duration::from_nanos(unsigned("measured_delay", self.measured_delay_ns)?),
            now: Tick(unsigned("now", self.now)?),
            epoch: Epoch(unsigned("epoch", self.epoch)?),
            waiter_count: unsigned("waiter_count", self.waiter_count)?,
        })
    }
}

fn saturate(v: u128) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Error as it travels on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireError {
    /// [`ErrorCode`] number.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Structured fields needed to rebuild the typed error.
    pub details: IndexMap<String, String>,
}

impl From<&ClockError> for WireError {
    fn from(err: &ClockError) -> Self {
        let mut details = IndexMap::new();
        match err {
            ClockError::PolicyTooLate { requested, current } => {
                details.insert("requested".into(), requested.0.to_string());
                details.insert("current".into(), current.0.to_string());
            }
            ClockError::TimerIdAlreadyExists { id } | ClockError::TimerNotFound { id } => {
                details.insert("id".into(), id.to_string());
            }
            ClockError::InvalidMessage { reason } | ClockError::Unavailable { reason } => {
                details.insert("reason".into(), reason.clone());
            }
            ClockError::InvalidArgument { field, reason } => {
                details.insert("field".into(), field.clone());
                details.insert("reason".into(), reason.clone());
            }
            _ => {}
        }
        Self {
            code: err.code().as_i32(),
            message: err.to_string(),
            details,
        }
    }
}

impl WireError {
    /// Rebuild the typed error. Unknown codes surface as `Unavailable`.
    pub fn decode(&self) -> ClockError {
        let text = |key: &str| self.details.get(key).cloned().unwrap_or_default();
        let number = |key: &str| {
            self.details
                .get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };
        match ErrorCode::from_i32(self.code) {
            Some(ErrorCode::NotReady) => ClockError::NotReady,
            Some(ErrorCode::AlreadyInitialized) => ClockError::AlreadyInitialized,
            Some(ErrorCode::AlreadyStarted) => ClockError::AlreadyStarted,
            Some(ErrorCode::PolicyTooLate) => ClockError::PolicyTooLate {
                requested: Epoch(number("requested")),
                current: Epoch(number("current")),
            },
            Some(ErrorCode::DelayCanceled) => ClockError::DelayCanceled,
            Some(ErrorCode::TimerCanceled) => ClockError::TimerCanceled,
            Some(ErrorCode::TimerIdAlreadyExists) => ClockError::TimerIdAlreadyExists {
                id: number("id"),
            },
            Some(ErrorCode::TimerNotFound) => ClockError::TimerNotFound { id: number("id") },
            Some(ErrorCode::InvalidMessage) => ClockError::InvalidMessage {
                reason: text("reason"),
            },
            Some(ErrorCode::InvalidArgument) => ClockError::InvalidArgument {
                field: text("field"),
                reason: text("reason"),
            },
            Some(ErrorCode::Faulted) => ClockError::Faulted,
            Some(ErrorCode::Unavailable) => ClockError::unavailable(text("reason")),
            Some(ErrorCode::Ok) | None => {
                ClockError::unavailable(format!("unrecognised error {}: {}", self.code, self.message))
            }
        }
    }
}

/// Response envelope. Exactly one of the fields is set, except for
/// successful empty replies where both are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireResponse {
    /// Snapshot for status-returning methods.
    pub status: Option<WireStatus>,
    /// Failure.
    pub error: Option<WireError>,
}

impl WireResponse {
    fn from_status(result: Result<StatusResponse, ClockError>) -> Self {
        match result {
            Ok(status) => Self {
                status: Some(status.into()),
                error: None,
            },
            Err(err) => Self::from_error(&err),
        }
    }

    fn from_empty(result: Result<(), ClockError>) -> Self {
        match result {
            Ok(()) => Self::default(),
            Err(err) => Self::from_error(&err),
        }
    }

    fn from_error(err: &ClockError) -> Self {
        Self {
            status: None,
            error: Some(err.into()),
        }
    }

    /// Decode a reply to a status-returning method.
    pub fn into_status(self) -> Result<StatusResponse, ClockError> {
        if let Some(err) = self.error {
            return Err(err.decode());
        }
        match self.status {
            Some(status) => status.decode(),
            None => Err(ClockError::InvalidMessage {
                reason: "response carries neither status nor error".into(),
            }),
        }
    }

    /// Decode a reply to a method without a result.
    pub fn into_empty(self) -> Result<(), ClockError> {
        match self.error {
            Some(err) => Err(err.decode()),
            None => Ok(()),
        }
    }
}

// ── Typed requests ───────────────────────────────────────────────

/// A decoded and validated request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepperRequest {
    /// See [`Stepper::set_policy`].
    SetPolicy {
        /// Target policy.
        policy: Policy,
        /// Wall-clock interval per tick for Measured.
        measured_delay: Duration,
        /// Epoch guard; `None` is unconditional.
        match_epoch: Option<Epoch>,
    },
    /// See [`Stepper::step`].
    Step,
    /// See [`Stepper::delay`].
    Delay {
        /// Due tick.
        at_least: Tick,
        /// Accepted, not applied.
        jitter: u64,
    },
    /// See [`Stepper::reset`].
    Reset,
    /// See [`Stepper::get_status`].
    GetStatus,
}

impl StepperRequest {
    /// Decode and range-check a wire request.
    pub fn decode(req: &WireRequest) -> Result<StepperRequest, ClockError> {
        match req.method.as_str() {
            method::SET_POLICY => {
                let raw = req.required(field::POLICY)?;
                let policy = i32::try_from(raw)
                    .ok()
                    .and_then(Policy::from_i32)
                    .ok_or_else(|| {
                        ClockError::invalid_argument(field::POLICY, format!("unknown policy {raw}"))
                    })?;
                let delay_ns = req.non_negative(field::MEASURED_DELAY_NS, 0)?;
                let match_epoch = req
                    .fields
                    .get(field::MATCH_EPOCH)
                    .copied()
                    .and_then(|e| u64::try_from(e).ok())
                    .map(Epoch);
                Ok(StepperRequest::SetPolicy {
                    policy,
                    measured_delay: Duration::from_nanos(delay_ns),
                    match_epoch,
                })
            }
            method::STEP => Ok(StepperRequest::Step),
            method::DELAY => {
                let at_least = req.required(field::AT_LEAST)?;
                let at_least = u64::try_from(at_least).map_err(|_| {
                    ClockError::invalid_argument(
                        field::AT_LEAST,
                        format!("must be >= 0, got {at_least}"),
                    )
                })?;
                Ok(StepperRequest::Delay {
                    at_least: Tick(at_least),
                    jitter: req.non_negative(field::JITTER, 0)?,
                })
            }
            method::RESET => Ok(StepperRequest::Reset),
            method::GET_STATUS => Ok(StepperRequest::GetStatus),
            other => Err(ClockError::InvalidMessage {
                reason: format!("unknown method '{other}'"),
            }),
        }
    }

    /// Encode for the wire. An unconditional policy change is sent as
    /// `match_epoch = -1`.
    pub fn encode(&self) -> WireRequest {
        match *self {
            StepperRequest::SetPolicy {
                policy,
                measured_delay,
                match_epoch,
            } => WireRequest::new(method::SET_POLICY)
                .with(field::POLICY, i64::from(policy.as_i32()))
                .with(field::MEASURED_DELAY_NS, saturate(measured_delay.as_nanos()))
                .with(
                    field::MATCH_EPOCH,
                    match_epoch.map_or(-1, |e| saturate(u128::from(e.0))),
                ),
            StepperRequest::Step => WireRequest::new(method::STEP),
            StepperRequest::Delay { at_least, jitter } => WireRequest::new(method::DELAY)
                .with(field::AT_LEAST, saturate(u128::from(at_least.0)))
                .with(field::JITTER, saturate(u128::from(jitter))),
            StepperRequest::Reset => WireRequest::new(method::RESET),
            StepperRequest::GetStatus => WireRequest::new(method::GET_STATUS),
        }
    }
}

// ── Service ──────────────────────────────────────────────────────

/// Server-side RPC surface over a [`Stepper`].
#[derive(Clone, Debug)]
pub struct StepperService {
    stepper: Stepper,
}

impl StepperService {
    /// Serve `stepper`.
    pub fn new(stepper: Stepper) -> Self {
        Self { stepper }
    }

    /// The served Stepper.
    pub fn stepper(&self) -> &Stepper {
        &self.stepper
    }

    /// Decode, dispatch and encode one request. `Delay` blocks until it
    /// resolves.
    pub fn call(&self, ctx: &Context, req: &WireRequest) -> WireResponse {
        let request = match StepperRequest::decode(req) {
            Ok(request) => request,
            Err(err) => {
                log::warn!(
                    target: simtime_core::LOG_TARGET,
                    "[{}] rpc: rejected '{}': {err}",
                    ctx.span(),
                    req.method
                );
                return WireResponse::from_error(&err);
            }
        };
        self.dispatch(ctx, request)
    }

    /// Dispatch an already-decoded request.
    pub fn dispatch(&self, ctx: &Context, request: StepperRequest) -> WireResponse {
        let s = &self.stepper;
        match request {
            StepperRequest::SetPolicy {
                policy,
                measured_delay,
                match_epoch,
            } => WireResponse::from_status(s.set_policy(ctx, policy, measured_delay, match_epoch)),
            StepperRequest::Step => WireResponse::from_status(s.step(ctx)),
            StepperRequest::Delay { at_least, jitter } => {
                WireResponse::from_status(s.delay(ctx, at_least, jitter))
            }
            StepperRequest::Reset => WireResponse::from_empty(s.reset(ctx)),
            StepperRequest::GetStatus => WireResponse::from_status(s.get_status(ctx)),
        }
    }
}
