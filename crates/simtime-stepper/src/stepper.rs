//! User-facing Stepper handle.
//!
//! ```text
//! Caller thread(s)                 Stepper thread              Measured ticker
//!     |                                 |                             |
//!     |--set_policy/step/delay/...----->| mailbox.recv()              |
//!     |   [mailbox: bounded(64)]        | machine.receive()           |
//!     |<--reply via bounded(1)----------| flush deferred replies      |
//!     |                                 |<--AutoStep{guard}-----------|
//!     |                                 |   (try_send, same mailbox)  |
//! ```
//!
//! Every handle method is a request/reply round trip through the mailbox,
//! so the actor thread stays the only writer of clock state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use simtime_core::{ClockError, ConfigError, Context, Epoch, Policy, StatusResponse, Tick};

use crate::actor::StepperActor;
use crate::config::StepperConfig;
use crate::messages::{PolicyRequest, StepperMessage};

/// Pending answer to a [`Stepper::delay_async`] call.
pub type DelayReceiver = Receiver<Result<StatusResponse, ClockError>>;

struct StepperInner {
    mailbox: Sender<StepperMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl StepperInner {
    fn shutdown(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        // Err means the actor has already exited.
        let _ = self.mailbox.send(StepperMessage::Shutdown);
        let _ = handle.join();
    }
}

impl Drop for StepperInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to a running Stepper actor.
///
/// Cloning is cheap; all clones talk to the same actor. The actor stops
/// on [`shutdown`](Stepper::shutdown) or when the last clone is dropped.
#[derive(Clone)]
pub struct Stepper {
    inner: Arc<StepperInner>,
}

impl Stepper {
    /// Validate `config`, spawn the actor thread and move it out of
    /// `awaiting_start` into the configured policy.
    pub fn start(config: StepperConfig) -> Result<Stepper, ConfigError> {
        config.validate()?;

        let (mailbox_tx, mailbox_rx) = crossbeam_channel::bounded(config.mailbox_capacity);
        let (ack_tx, ack_rx) = crossbeam_channel::bounded::<Result<(), ClockError>>(1);
        let running = Arc::new(AtomicBool::new(false));

        let actor_running = Arc::clone(&running);
        let actor_mailbox = mailbox_tx.clone();
        let handle = thread::Builder::new()
            .name("simtime-stepper".into())
            .spawn(move || {
                let mut actor =
                    StepperActor::new(actor_mailbox, mailbox_rx, Arc::clone(&actor_running));
                match actor.start(&config) {
                    Ok(()) => {
                        actor_running.store(true, Ordering::Release);
                        let _ = ack_tx.send(Ok(()));
                        actor.run();
                    }
                    Err(err) => {
                        let _ = ack_tx.send(Err(err));
                    }
                }
            })
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("stepper: {e}"),
            })?;

        let started = ack_rx.recv().unwrap_or_else(|_| {
            Err(ClockError::unavailable("stepper thread exited during start"))
        });
        if let Err(err) = started {
            let _ = handle.join();
            return Err(ConfigError::ThreadSpawnFailed {
                reason: format!("stepper start failed: {err}"),
            });
        }

        log::debug!(target: simtime_core::LOG_TARGET, "stepper started");
        Ok(Stepper {
            inner: Arc::new(StepperInner {
                mailbox: mailbox_tx,
                thread: Mutex::new(Some(handle)),
                running,
            }),
        })
    }

    /// Switch the clock policy.
    ///
    /// `measured_delay` must be zero for NoWait and Manual and positive for
    /// Measured. With `match_epoch = Some(e)` the change is rejected with
    /// [`ClockError::PolicyTooLate`] if `e` is older than the current
    /// epoch; `None` applies unconditionally. On success the epoch is
    /// bumped and the returned snapshot reflects the new policy.
    pub fn set_policy(
        &self,
        ctx: &Context,
        policy: Policy,
        measured_delay: Duration,
        match_epoch: Option<Epoch>,
    ) -> Result<StatusResponse, ClockError> {
        let request = PolicyRequest::validate(policy, measured_delay)?;
        ctx.trace(format_args!("set_policy {policy} {measured_delay:?} {match_epoch:?}"));
        self.call(|reply| StepperMessage::SetPolicy {
            request,
            match_epoch,
            reply,
        })
    }

    /// Advance the clock by one tick.
    pub fn step(&self, ctx: &Context) -> Result<StatusResponse, ClockError> {
        ctx.trace(format_args!("step"));
        self.call(|reply| StepperMessage::Step { reply })
    }

    /// Register a delay and return the receiver its answer will arrive on.
    pub fn delay_async(
        &self,
        ctx: &Context,
        at_least: Tick,
        jitter: u64,
    ) -> Result<DelayReceiver, ClockError> {
        ctx.trace(format_args!("delay until {at_least} (jitter {jitter})"));
        self.post(|reply| StepperMessage::Delay {
            at_least,
            jitter,
            reply,
        })
    }

    /// Block until the clock reaches `at_least` or the delay is canceled.
    pub fn delay(
        &self,
        ctx: &Context,
        at_least: Tick,
        jitter: u64,
    ) -> Result<StatusResponse, ClockError> {
        let rx = self.delay_async(ctx, at_least, jitter)?;
        Self::wait(rx)
    }

    /// Return to tick 0 under the Invalid policy, canceling all delays.
    pub fn reset(&self, ctx: &Context) -> Result<(), ClockError> {
        ctx.trace(format_args!("reset"));
        self.call(|reply| StepperMessage::Reset { reply })
    }

    /// Snapshot of the clock.
    pub fn get_status(&self, ctx: &Context) -> Result<StatusResponse, ClockError> {
        ctx.trace(format_args!("get_status"));
        self.call(|reply| StepperMessage::GetStatus { reply })
    }

    /// Stop the actor and wait for it. Outstanding delays fail with
    /// [`ClockError::DelayCanceled`]; later calls fail with
    /// [`ClockError::Unavailable`]. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Whether the actor thread is still serving requests.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn post<T>(
        &self,
        build: impl FnOnce(Sender<Result<T, ClockError>>) -> StepperMessage,
    ) -> Result<Receiver<Result<T, ClockError>>, ClockError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.inner
            .mailbox
            .send(build(tx))
            .map_err(|_| ClockError::unavailable("stepper has shut down"))?;
        Ok(rx)
    }

    fn call<T>(
        &self,
        build: impl FnOnce(Sender<Result<T, ClockError>>) -> StepperMessage,
    ) -> Result<T, ClockError> {
        Self::wait(self.post(build)?)
    }

    fn wait<T>(rx: Receiver<Result<T, ClockError>>) -> Result<T, ClockError> {
        rx.recv()
            .map_err(|_| ClockError::unavailable("stepper dropped the request"))?
    }
}

impl std::fmt::Debug for Stepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stepper")
            .field("running", &self.is_running())
            .finish()
    }
}
