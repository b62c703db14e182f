//! Deferred callbacks keyed to simulated time.
//!
//! Where a [`Listener`](crate::Listener) resolves a channel, `Timers` runs
//! a caller-supplied callback with a caller-supplied message once a delay,
//! counted in ticks from the tick in the caller's context, has elapsed.
//!
//! A single worker thread polls the Stepper while at least one timer is
//! pending. It is started lazily by the first timer and retires when the
//! last one fires or is canceled; see [`Supervisor`]. Unlike the Ticker,
//! the worker backs off between reconnect attempts
//! (`retry_step * min(retries, max_retry_factor)`).
//!
//! The worker long-polls for the tick after the last one it saw. A timer
//! that is already due against that tick therefore runs at once, on the
//! caller's thread, instead of waiting for the clock to move again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use simtime_core::{
    Bimap, BimapItem, ClockError, ConfigError, Connector, Context, StatusResponse,
    StepperConnection, Tick, LOG_TARGET,
};

use crate::config::TimersConfig;
use crate::supervisor::Supervisor;

/// Callback run when a timer fires: `(ctx at the fire tick, timer id, message)`.
pub type TimerCallback<M> = Box<dyn FnOnce(&Context, u64, M) + Send>;

struct Timer<M> {
    id: u64,
    due: Tick,
    msg: M,
    callback: TimerCallback<M>,
}

impl<M> BimapItem for Timer<M> {
    type Secondary = Tick;

    fn primary(&self) -> u64 {
        self.id
    }

    fn secondary(&self) -> Tick {
        self.due
    }
}

struct TimersState<M> {
    supervisor: Supervisor,
    next_id: u64,
    timers: Bimap<Timer<M>>,
    /// Last tick the current worker observed.
    last_seen: Option<Tick>,
}

impl<M> TimersState<M> {
    fn retire(&mut self) {
        self.supervisor.deactivate();
        self.last_seen = None;
    }
}

struct Shared<M> {
    state: Mutex<TimersState<M>>,
    connector: Arc<dyn Connector>,
    config: TimersConfig,
}

impl<M> Shared<M> {
    fn lock(&self) -> MutexGuard<'_, TimersState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().supervisor.is_current(generation)
    }
}

/// Scheduler of tick-delayed callbacks carrying messages of type `M`.
pub struct Timers<M: Send + 'static> {
    shared: Arc<Shared<M>>,
}

impl<M: Send + 'static> Timers<M> {
    /// A scheduler that reaches the Stepper through `connector`. No thread
    /// is started until the first timer.
    pub fn new(connector: Arc<dyn Connector>, config: TimersConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimersState {
                    supervisor: Supervisor::new(),
                    next_id: 1,
                    timers: Bimap::new(),
                    last_seen: None,
                }),
                connector,
                config,
            }),
        })
    }

    /// Schedule `callback(ctx, id, msg)` for `delay` ticks after the tick
    /// carried by `ctx`. Returns the timer id.
    ///
    /// If the worker has already seen a tick at or past the due tick, the
    /// callback runs before this returns, with that tick in its context.
    pub fn timer<F>(&self, ctx: &Context, delay: u64, msg: M, callback: F) -> Result<u64, ClockError>
    where
        F: FnOnce(&Context, u64, M) + Send + 'static,
    {
        let now = ctx
            .tick()
            .ok_or_else(|| ClockError::invalid_argument("ctx", "context carries no tick"))?;
        let due = now.after(delay);

        let mut state = self.shared.lock();
        let id = state.next_id;
        state.next_id += 1;
        if let Some(seen) = state.last_seen.filter(|seen| due <= *seen) {
            drop(state);
            let fire_ctx = ctx.with_tick(seen);
            fire_ctx.trace(format_args!("timer #{id} (due {due}) fired on add"));
            callback(&fire_ctx, id, msg);
            return Ok(id);
        }
        let added = state.timers.add(Timer {
            id,
            due,
            msg,
            callback: Box::new(callback),
        });
        if !added {
            return Err(ClockError::TimerIdAlreadyExists { id });
        }

        if let Some(generation) = state.supervisor.activate() {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("simtime-timers".into())
                .spawn(move || TimersWorker { shared, generation }.run());
            if let Err(e) = spawned {
                state.timers.remove(id);
                state.retire();
                return Err(ClockError::unavailable(format!("timers worker spawn failed: {e}")));
            }
            log::debug!(target: LOG_TARGET, "[{}] timers worker {generation} started", ctx.span());
        }
        ctx.trace(format_args!("timer #{id} due {due}"));
        Ok(id)
    }

    /// Cancel a pending timer. Its callback is dropped without running.
    pub fn cancel(&self, id: u64) -> Result<(), ClockError> {
        let mut state = self.shared.lock();
        if state.timers.remove(id).is_none() {
            return Err(ClockError::TimerNotFound { id });
        }
        if state.timers.is_empty() {
            state.retire();
        }
        Ok(())
    }

    /// Number of timers that have neither fired nor been canceled.
    pub fn pending(&self) -> usize {
        self.shared.lock().timers.len()
    }

    /// Drop every pending timer and retire the worker.
    pub fn stop(&self) {
        let dropped = {
            let mut state = self.shared.lock();
            state.retire();
            state.timers.take_all()
        };
        // Callbacks and messages are dropped outside the lock.
        drop(dropped);
    }
}

impl<M: Send + 'static> Drop for Timers<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<M: Send + 'static> std::fmt::Debug for Timers<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Timers")
            .field("pending", &state.timers.len())
            .field("supervisor", &state.supervisor)
            .finish()
    }
}

// ── Worker ───────────────────────────────────────────────────────

struct TimersWorker<M> {
    shared: Arc<Shared<M>>,
    generation: u64,
}

impl<M> TimersWorker<M> {
    fn run(self) {
        let ctx = Context::new().with_span("timers");
        let mut conn: Option<Box<dyn StepperConnection>> = None;
        let mut retries = 0u32;
        let mut next = Tick::ZERO;

        while self.shared.is_current(self.generation) {
            if conn.is_none() {
                match self.shared.connector.connect() {
                    Ok(c) => conn = Some(c),
                    Err(err) => {
                        retries = retries.saturating_add(1);
                        self.back_off(&ctx, &err, retries);
                        continue;
                    }
                }
            }
            let Some(c) = conn.as_mut() else {
                continue;
            };

            match c.delay(&ctx, next, 0) {
                Ok(status) => {
                    retries = 0;
                    next = status.now.next();
                    self.fire(&ctx, status);
                }
                Err(err) => {
                    conn = None;
                    next = Tick::ZERO;
                    self.forget_tick();
                    retries = retries.saturating_add(1);
                    self.back_off(&ctx, &err, retries);
                }
            }
        }
        log::debug!(
            target: LOG_TARGET,
            "[{}] timers worker {} retired",
            ctx.span(),
            self.generation
        );
    }

    /// Run every callback due at `status.now`, outside the lock.
    fn fire(&self, ctx: &Context, status: StatusResponse) {
        let due = {
            let mut state = self.shared.lock();
            if !state.supervisor.is_current(self.generation) {
                return;
            }
            state.last_seen = Some(status.now);
            let due = state.timers.drain_secondary(|at| at <= status.now);
            if state.timers.is_empty() {
                state.retire();
            }
            due
        };
        if due.is_empty() {
            return;
        }
        let fire_ctx = ctx.with_tick(status.now);
        for timer in due {
            fire_ctx.trace(format_args!("timer #{} (due {}) fired", timer.id, timer.due));
            (timer.callback)(&fire_ctx, timer.id, timer.msg);
        }
    }

    fn forget_tick(&self) {
        let mut state = self.shared.lock();
        if state.supervisor.is_current(self.generation) {
            state.last_seen = None;
        }
    }

    fn back_off(&self, ctx: &Context, err: &ClockError, retries: u32) {
        let pause = self.shared.config.backoff(retries);
        log::warn!(
            target: LOG_TARGET,
            "[{}] timers: poll failed ({err}), retry {retries} in {pause:?}",
            ctx.span()
        );
        thread::sleep(pause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refuse;

    impl Connector for Refuse {
        fn connect(&self) -> Result<Box<dyn StepperConnection>, ClockError> {
            Err(ClockError::unavailable("refused"))
        }
    }

    fn timers() -> Timers<&'static str> {
        let cfg = TimersConfig {
            retry_step: std::time::Duration::from_millis(1),
            ..TimersConfig::default()
        };
        Timers::new(Arc::new(Refuse), cfg).unwrap()
    }

    #[test]
    fn timer_needs_a_tick_in_context() {
        let t = timers();
        let err = t.timer(&Context::new(), 1, "x", |_, _, _| {}).unwrap_err();
        assert!(matches!(err, ClockError::InvalidArgument { .. }));
        assert_eq!(t.pending(), 0);
    }

    #[test]
    fn cancel_unknown_is_not_found() {
        let t = timers();
        assert_eq!(t.cancel(42), Err(ClockError::TimerNotFound { id: 42 }));
    }

    #[test]
    fn cancel_last_timer_retires_worker() {
        let t = timers();
        let ctx = Context::new().with_tick(Tick(3));
        let a = t.timer(&ctx, 5, "a", |_, _, _| {}).unwrap();
        let b = t.timer(&ctx, 6, "b", |_, _, _| {}).unwrap();
        assert_ne!(a, b);
        assert_eq!(t.pending(), 2);
        let generation = t.shared.lock().supervisor.generation();

        t.cancel(a).unwrap();
        assert!(t.shared.lock().supervisor.is_current(generation));
        t.cancel(b).unwrap();
        assert!(!t.shared.lock().supervisor.is_active());
        assert_eq!(t.pending(), 0);
    }

    #[test]
    fn zero_retry_step_rejected() {
        let cfg = TimersConfig {
            retry_step: std::time::Duration::ZERO,
            ..TimersConfig::default()
        };
        assert!(matches!(
            Timers::<()>::new(Arc::new(Refuse), cfg),
            Err(ConfigError::ZeroRetryStep)
        ));
    }
}
