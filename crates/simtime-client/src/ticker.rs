//! Long-poll loop that turns Stepper ticks into a stream of statuses.
//!
//! The Ticker thread calls `delay(now + 1)` forever and forwards every
//! answer on its tick channel. A failed call drops the connection and
//! retries at once, polling from tick 0 again so that a reset Stepper is
//! noticed on the first answer.
//!
//! Stopping is lazy. [`Ticker::stop`] only sets a flag; the thread sees it
//! when its current poll returns, and only then drops the channel sender.
//! Posting checks the same flag under the same mutex, so nothing is sent
//! once a stop has been requested.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use simtime_core::{
    ClockError, ConfigError, Connector, Context, StatusResponse, StepperConnection, Tick,
    LOG_TARGET,
};

/// Handle to a running Ticker thread.
#[derive(Debug)]
pub struct Ticker {
    stopped: Arc<Mutex<bool>>,
}

impl Ticker {
    /// Spawn the poll loop. Returns the handle and the tick channel, which
    /// closes once the loop has observed a stop.
    pub fn start(
        connector: Arc<dyn Connector>,
        ctx: &Context,
    ) -> Result<(Ticker, Receiver<StatusResponse>), ConfigError> {
        // Unbounded: posting must never block while holding the stop lock.
        let (tx, rx) = crossbeam_channel::unbounded();
        let stopped = Arc::new(Mutex::new(false));

        let worker = TickerLoop {
            connector,
            ctx: ctx.with_span("ticker"),
            stopped: Arc::clone(&stopped),
            tx,
        };
        thread::Builder::new()
            .name("simtime-ticker".into())
            .spawn(move || worker.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("ticker: {e}"),
            })?;

        Ok((Ticker { stopped }, rx))
    }

    /// Ask the loop to stop. Returns immediately; idempotent.
    pub fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct TickerLoop {
    connector: Arc<dyn Connector>,
    ctx: Context,
    stopped: Arc<Mutex<bool>>,
    tx: Sender<StatusResponse>,
}

impl TickerLoop {
    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `status` unless a stop was requested. `false` means stop.
    fn post(&self, status: StatusResponse) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        if *stopped {
            return false;
        }
        self.tx.send(status).is_ok()
    }

    fn run(self) {
        let mut conn: Option<Box<dyn StepperConnection>> = None;
        let mut next = Tick::ZERO;

        while !self.is_stopped() {
            if conn.is_none() {
                match self.connector.connect() {
                    Ok(c) => conn = Some(c),
                    Err(err) => {
                        self.on_failure(&err);
                        thread::yield_now();
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else {
                continue;
            };

            let result = c.delay(&self.ctx, next, 0);

            match result {
                Ok(status) => {
                    self.ctx.trace(format_args!(
                        "tick {} (epoch {})",
                        status.now, status.epoch
                    ));
                    if !self.post(status) {
                        break;
                    }
                    next = status.now.next();
                }
                Err(err) => {
                    self.on_failure(&err);
                    conn = None;
                    next = Tick::ZERO;
                    thread::yield_now();
                }
            }
        }

        log::debug!(target: LOG_TARGET, "[{}] ticker stopped", self.ctx.span());
        // Dropping `self.tx` here closes the tick channel.
    }

    fn on_failure(&self, err: &ClockError) {
        log::warn!(
            target: LOG_TARGET,
            "[{}] ticker: poll failed, reconnecting: {err}",
            self.ctx.span()
        );
    }
}
