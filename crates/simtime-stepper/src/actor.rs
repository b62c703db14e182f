//! The Stepper actor thread and the data its state machine owns.
//!
//! The actor thread is the only code that touches [`StepperData`]. Every
//! request arrives through the bounded mailbox and is dispatched through
//! the state machine one at a time, so no field here needs a lock. The
//! Measured ticker talks to the actor only by posting into the mailbox.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use smallvec::SmallVec;

use simtime_core::{ClockError, Context, Epoch, Guard, Policy, StatusResponse, Tick, LOG_TARGET};
use simtime_fsm::Tagged;

use crate::config::StepperConfig;
use crate::measured::MeasuredTicker;
use crate::messages::{EmptyReply, StatusReply, StepperMessage};
use crate::states::{self, StepperMachine, StepperState};

/// A reply held back until the current dispatch (including any
/// transition) has finished.
pub(crate) enum Deferred {
    Status(StatusReply),
    Empty(EmptyReply),
}

/// Mutable state of the clock, owned by the actor thread.
pub(crate) struct StepperData {
    pub latest: Tick,
    pub epoch: Guard<Epoch>,
    pub policy: Policy,
    pub measured_delay: Duration,
    /// Outstanding delays keyed by due tick; the minimum is drained first.
    pub waiters: BTreeMap<Tick, SmallVec<[StatusReply; 1]>>,
    pub waiter_count: u64,
    pub ticker: Option<MeasuredTicker>,
    /// The actor's own mailbox, handed to the Measured ticker.
    pub mailbox: Sender<StepperMessage>,
    pub deferred: Vec<Deferred>,
}

impl StepperData {
    pub fn new(mailbox: Sender<StepperMessage>) -> Self {
        Self {
            latest: Tick::ZERO,
            epoch: Guard::new(Epoch::ZERO),
            policy: Policy::Invalid,
            measured_delay: Duration::ZERO,
            waiters: BTreeMap::new(),
            waiter_count: 0,
            ticker: None,
            mailbox,
            deferred: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            policy: self.policy,
            measured_delay: self.measured_delay,
            now: self.latest,
            epoch: self.epoch.value(),
            waiter_count: self.waiter_count,
        }
    }

    /// Start a new policy generation.
    pub fn bump_epoch(&mut self) -> Epoch {
        let next = self.epoch.value().next();
        self.epoch.advance(next);
        next
    }

    pub fn add_waiter(&mut self, at_least: Tick, reply: StatusReply) {
        self.waiters.entry(at_least).or_default().push(reply);
        self.waiter_count += 1;
    }

    /// Resolve every waiter whose due tick has been reached.
    pub fn check_for_expiry(&mut self) {
        let mut due: SmallVec<[StatusReply; 4]> = SmallVec::new();
        while let Some(entry) = self.waiters.first_entry() {
            if *entry.key() > self.latest {
                break;
            }
            due.extend(entry.remove());
        }
        if due.is_empty() {
            return;
        }
        self.waiter_count -= due.len() as u64;
        let status = self.status();
        for reply in due {
            let _ = reply.send(Ok(status));
        }
    }

    /// Move the clock to each outstanding due tick in turn until no
    /// waiter is left.
    pub fn jump_to_waiters(&mut self) {
        while let Some((&first, _)) = self.waiters.first_key_value() {
            if first > self.latest {
                self.latest = first;
            }
            self.check_for_expiry();
        }
    }

    /// Fail every outstanding waiter with `err`.
    pub fn cancel_waiters(&mut self, err: &ClockError) {
        let waiters = std::mem::take(&mut self.waiters);
        self.waiter_count = 0;
        for reply in waiters.into_values().flatten() {
            let _ = reply.send(Err(err.clone()));
        }
    }

    pub fn stop_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }
}

/// Actor thread body.
pub(crate) struct StepperActor {
    machine: StepperMachine,
    mailbox: Receiver<StepperMessage>,
    running: Arc<AtomicBool>,
}

impl StepperActor {
    pub fn new(
        mailbox_tx: Sender<StepperMessage>,
        mailbox: Receiver<StepperMessage>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            machine: states::build(StepperData::new(mailbox_tx)),
            mailbox,
            running,
        }
    }

    fn context(&self) -> Context {
        Context::new()
            .with_span("stepper")
            .with_tick(self.machine.parent.latest)
    }

    /// Leave `awaiting_start` for the configured policy.
    ///
    /// Starting in Invalid is not a policy change and keeps epoch 0;
    /// starting in any other policy opens epoch 1.
    pub fn start(&mut self, config: &StepperConfig) -> Result<(), ClockError> {
        let ctx = self.context();
        self.machine.start(&ctx)?;

        let target = match config.initial_policy {
            Policy::Invalid => StepperState::Invalid,
            Policy::NoWait => StepperState::NoWait,
            Policy::Manual => StepperState::Manual,
            Policy::Measured => StepperState::Measured,
        };
        if target != StepperState::Invalid {
            self.machine.parent.bump_epoch();
            self.machine.parent.measured_delay = config.initial_delay();
        }
        if let Err(err) = self.machine.change_state(&ctx, target) {
            self.fault(&ctx, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Serve the mailbox until shutdown.
    pub fn run(mut self) {
        loop {
            let msg = match self.mailbox.recv() {
                Ok(StepperMessage::Shutdown) | Err(_) => break,
                Ok(msg) => msg,
            };
            let ctx = self.context();
            ctx.trace(format_args!(
                "{:?} in '{}'",
                msg.tag(),
                self.machine.current_name()
            ));

            if let Err(err) = self.machine.receive(&ctx, msg) {
                self.fault(&ctx, &err);
            }
            self.flush_deferred();
        }

        let data = &mut self.machine.parent;
        data.stop_ticker();
        data.cancel_waiters(&ClockError::DelayCanceled);
        self.running.store(false, Ordering::Release);
        log::debug!(target: LOG_TARGET, "stepper stopped at tick {}", data.latest);
    }

    fn fault(&mut self, ctx: &Context, err: &ClockError) {
        log::error!(
            target: LOG_TARGET,
            "stepper: transition failed in '{}': {err}; entering faulted",
            self.machine.current_name()
        );
        if self.machine.current() != StepperState::Faulted {
            // Faulted's enter hook cannot fail.
            let _ = self.machine.change_state(ctx, StepperState::Faulted);
        }
    }

    fn flush_deferred(&mut self) {
        if self.machine.parent.deferred.is_empty() {
            return;
        }
        let faulted = self.machine.is_terminated();
        let data = &mut self.machine.parent;
        let status = data.status();
        for deferred in data.deferred.drain(..) {
            match deferred {
                Deferred::Status(reply) => {
                    let _ = reply.send(if faulted {
                        Err(ClockError::Faulted)
                    } else {
                        Ok(status)
                    });
                }
                Deferred::Empty(reply) => {
                    let _ = reply.send(if faulted {
                        Err(ClockError::Faulted)
                    } else {
                        Ok(())
                    });
                }
            }
        }
    }
}
