//! Error types for the simulated-time subsystem.
//!
//! [`ClockError`] is returned by every clock operation. Each variant has a
//! stable [`ErrorCode`] so an outer HTTP or CLI layer can map it 1:1 to a
//! status. [`ConfigError`] covers construction-time failures.

use std::error::Error;
use std::fmt;

use crate::id::Epoch;

/// Errors from Stepper, Listener, Ticker and Timers operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockError {
    /// The operation was attempted before initialization or after stop.
    NotReady,
    /// A one-time initialization was attempted twice.
    AlreadyInitialized,
    /// An actor thread was started twice.
    AlreadyStarted,
    /// A policy change was issued against a superseded epoch.
    PolicyTooLate {
        /// Epoch the caller expected to be current.
        requested: Epoch,
        /// Epoch actually current at the Stepper.
        current: Epoch,
    },
    /// A delay was invalidated by a reset or a move to the invalid policy.
    DelayCanceled,
    /// A waiter or timer was canceled explicitly or by shutdown.
    TimerCanceled,
    /// A registration reused an id that is still active.
    TimerIdAlreadyExists {
        /// The duplicate id.
        id: u64,
    },
    /// A cancellation named an id that is not registered.
    TimerNotFound {
        /// The unknown id.
        id: u64,
    },
    /// A request could not be recognised at the transcoding boundary.
    InvalidMessage {
        /// What was wrong with it.
        reason: String,
    },
    /// A request field was out of range.
    InvalidArgument {
        /// Name of the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// The Stepper reached its terminal faulted state.
    Faulted,
    /// The transport to the Stepper failed.
    Unavailable {
        /// Description of the failure.
        reason: String,
    },
}

impl ClockError {
    /// Convenience constructor for [`ClockError::InvalidArgument`].
    pub fn invalid_argument(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`ClockError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotReady => ErrorCode::NotReady,
            Self::AlreadyInitialized => ErrorCode::AlreadyInitialized,
            Self::AlreadyStarted => ErrorCode::AlreadyStarted,
            Self::PolicyTooLate { .. } => ErrorCode::PolicyTooLate,
            Self::DelayCanceled => ErrorCode::DelayCanceled,
            Self::TimerCanceled => ErrorCode::TimerCanceled,
            Self::TimerIdAlreadyExists { .. } => ErrorCode::TimerIdAlreadyExists,
            Self::TimerNotFound { .. } => ErrorCode::TimerNotFound,
            Self::InvalidMessage { .. } => ErrorCode::InvalidMessage,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Faulted => ErrorCode::Faulted,
            Self::Unavailable { .. } => ErrorCode::Unavailable,
        }
    }
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "client not ready"),
            Self::AlreadyInitialized => write!(f, "already initialized"),
            Self::AlreadyStarted => write!(f, "already started"),
            Self::PolicyTooLate { requested, current } => write!(
                f,
                "policy too late: requested epoch {requested}, current epoch {current}"
            ),
            Self::DelayCanceled => write!(f, "delay canceled"),
            Self::TimerCanceled => write!(f, "timer canceled"),
            Self::TimerIdAlreadyExists { id } => write!(f, "timer id {id} already exists"),
            Self::TimerNotFound { id } => write!(f, "timer id {id} not found"),
            Self::InvalidMessage { reason } => write!(f, "invalid message: {reason}"),
            Self::InvalidArgument { field, reason } => {
                write!(f, "invalid argument '{field}': {reason}")
            }
            Self::Faulted => write!(f, "stepper is faulted"),
            Self::Unavailable { reason } => write!(f, "stepper unavailable: {reason}"),
        }
    }
}

impl Error for ClockError {}

/// Stable numeric code for each [`ClockError`] variant.
///
/// `Ok` = 0, all errors are negative. Values are carried on the wire.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// See [`ClockError::NotReady`].
    NotReady = -1,
    /// See [`ClockError::AlreadyInitialized`].
    AlreadyInitialized = -2,
    /// See [`ClockError::AlreadyStarted`].
    AlreadyStarted = -3,
    /// See [`ClockError::PolicyTooLate`].
    PolicyTooLate = -4,
    /// See [`ClockError::DelayCanceled`].
    DelayCanceled = -5,
    /// See [`ClockError::TimerCanceled`].
    TimerCanceled = -6,
    /// See [`ClockError::TimerIdAlreadyExists`].
    TimerIdAlreadyExists = -7,
    /// See [`ClockError::TimerNotFound`].
    TimerNotFound = -8,
    /// See [`ClockError::InvalidMessage`].
    InvalidMessage = -9,
    /// See [`ClockError::InvalidArgument`].
    InvalidArgument = -10,
    /// See [`ClockError::Faulted`].
    Faulted = -11,
    /// See [`ClockError::Unavailable`].
    Unavailable = -12,
}

impl ErrorCode {
    /// Wire representation.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Decode a wire value.
    pub fn from_i32(v: i32) -> Option<ErrorCode> {
        Some(match v {
            0 => Self::Ok,
            -1 => Self::NotReady,
            -2 => Self::AlreadyInitialized,
            -3 => Self::AlreadyStarted,
            -4 => Self::PolicyTooLate,
            -5 => Self::DelayCanceled,
            -6 => Self::TimerCanceled,
            -7 => Self::TimerIdAlreadyExists,
            -8 => Self::TimerNotFound,
            -9 => Self::InvalidMessage,
            -10 => Self::InvalidArgument,
            -11 => Self::Faulted,
            -12 => Self::Unavailable,
            _ => return None,
        })
    }

    /// HTTP status an outer layer should report for this code.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotReady | Self::Unavailable => 503,
            Self::AlreadyInitialized
            | Self::AlreadyStarted
            | Self::PolicyTooLate
            | Self::DelayCanceled
            | Self::TimerCanceled
            | Self::TimerIdAlreadyExists => 409,
            Self::TimerNotFound => 404,
            Self::InvalidMessage | Self::InvalidArgument => 400,
            Self::Faulted => 500,
        }
    }
}

/// Errors detected while validating configuration or spawning actors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A channel capacity was zero.
    ZeroCapacity {
        /// Which capacity.
        field: &'static str,
    },
    /// The measured delay does not fit the chosen policy.
    InvalidMeasuredDelay {
        /// Description of the mismatch.
        reason: String,
    },
    /// Retry backoff step is zero.
    ZeroRetryStep,
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity { field } => write!(f, "{field} must be at least 1"),
            Self::InvalidMeasuredDelay { reason } => write!(f, "invalid measured delay: {reason}"),
            Self::ZeroRetryStep => write!(f, "retry_step must be non-zero"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}
