//! Client-side subscriptions to the simulated clock.
//!
//! ```text
//! Caller thread(s)              Listener thread                  Ticker thread
//!     |                              |                                |
//!     |--after/cancel/status-------->| requests.recv()                |
//!     |   [requests: bounded(64)]    |                                |
//!     |<--Completion via bounded(1)--|<--StatusResponse---------------| delay(now+1)
//!     |                              |   merge, resolve due waiters   |
//!     |--update_status---->(ack)---->|                                |
//! ```
//!
//! The Listener thread is the only owner of the waiter index. Until the
//! first status arrives it services nothing but updates and stop, so no
//! request is ever resolved against an uninitialized clock.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{never, select, Receiver, Sender};
use simtime_core::{
    Bimap, BimapItem, ClockError, ConfigError, Connector, Context, StatusResponse, Tick, LOG_TARGET,
};

use crate::config::ListenerConfig;
use crate::ticker::Ticker;

/// Outcome delivered to an [`Listener::after`] caller.
pub type Completion = Result<StatusResponse, ClockError>;

/// Channel an [`Listener::after`] caller waits on.
pub type CompletionReceiver = Receiver<Completion>;

/// Channel a [`Listener::cancel`] caller waits on.
pub type CancelReceiver = Receiver<Result<(), ClockError>>;

struct Waiter {
    id: u64,
    name: String,
    due: Tick,
    reply: Sender<Completion>,
}

impl BimapItem for Waiter {
    type Secondary = Tick;

    fn primary(&self) -> u64 {
        self.id
    }

    fn secondary(&self) -> Tick {
        self.due
    }
}

enum Request {
    After(Waiter),
    Cancel {
        id: u64,
        reply: Sender<Result<(), ClockError>>,
    },
    Status {
        reply: Sender<StatusResponse>,
    },
    Count {
        reply: Sender<usize>,
    },
}

struct Update {
    status: StatusResponse,
    ack: Sender<()>,
}

/// Flags and counters shared with callers. The business state lives on
/// the Listener thread.
struct Gate {
    working: bool,
    next_id: u64,
    requests: Option<Sender<Request>>,
    updates: Option<Sender<Update>>,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Resolves waiters once the simulated clock reaches their due tick.
pub struct Listener {
    gate: Mutex<Gate>,
}

impl Listener {
    /// Start a Ticker on `connector` and the Listener thread consuming it.
    pub fn start(
        connector: Arc<dyn Connector>,
        config: ListenerConfig,
    ) -> Result<Listener, ConfigError> {
        config.validate()?;
        let ctx = Context::new().with_span("listener");

        let (ticker, ticks) = Ticker::start(connector, &ctx)?;
        let (requests_tx, requests) = crossbeam_channel::bounded(config.request_capacity);
        let (updates_tx, updates) = crossbeam_channel::bounded(config.request_capacity);
        let (stop_tx, stop) = crossbeam_channel::bounded(1);

        let actor = ListenerLoop {
            ctx,
            ticker,
            ticks,
            requests,
            updates,
            stop,
            last: None,
            waiters: Bimap::new(),
        };
        let thread = thread::Builder::new()
            .name("simtime-listener".into())
            .spawn(move || actor.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: format!("listener: {e}"),
            })?;

        Ok(Listener {
            gate: Mutex::new(Gate {
                working: true,
                next_id: 1,
                requests: Some(requests_tx),
                updates: Some(updates_tx),
                stop: Some(stop_tx),
                thread: Some(thread),
            }),
        })
    }

    /// Register a waiter for `due`. Returns its id and the channel that
    /// receives the merged status once the clock reaches `due`, or
    /// [`ClockError::TimerCanceled`] if it is canceled first.
    ///
    /// A `due` at or before the last known tick resolves at once and is
    /// never indexed.
    pub fn after(&self, name: &str, due: Tick) -> Result<(u64, CompletionReceiver), ClockError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        let (id, requests) = {
            let mut gate = self.lock();
            let requests = match (&gate.requests, gate.working) {
                (Some(tx), true) => tx.clone(),
                _ => return Err(ClockError::NotReady),
            };
            let id = gate.next_id;
            gate.next_id += 1;
            (id, requests)
        };
        // Sent outside the gate: the queue may be full, and stop must still
        // get through. A request that races stop is drained by shutdown.
        requests
            .send(Request::After(Waiter {
                id,
                name: name.to_string(),
                due,
                reply,
            }))
            .map_err(|_| ClockError::NotReady)?;
        Ok((id, rx))
    }

    /// Cancel waiter `id`. The waiter, if still pending, receives
    /// [`ClockError::TimerCanceled`]; the returned channel receives `Ok`
    /// whether or not the id was known.
    pub fn cancel(&self, id: u64) -> Result<CancelReceiver, ClockError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Cancel { id, reply })?;
        Ok(rx)
    }

    /// Merge an externally obtained status and resolve any waiters it
    /// makes due. Blocks until the Listener thread has applied it.
    pub fn update_status(&self, status: StatusResponse) -> Result<(), ClockError> {
        let (ack, acked) = crossbeam_channel::bounded(1);
        let updates = {
            let gate = self.lock();
            match (&gate.updates, gate.working) {
                (Some(tx), true) => tx.clone(),
                _ => return Err(ClockError::NotReady),
            }
        };
        updates
            .send(Update { status, ack })
            .map_err(|_| ClockError::NotReady)?;
        drop(updates);
        acked.recv().map_err(|_| ClockError::NotReady)
    }

    /// The last merged status. Blocks until the first one has arrived.
    pub fn status(&self) -> Result<StatusResponse, ClockError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Status { reply })?;
        rx.recv().map_err(|_| ClockError::NotReady)
    }

    /// Number of indexed (unresolved) waiters.
    pub fn waiter_count(&self) -> Result<usize, ClockError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Count { reply })?;
        rx.recv().map_err(|_| ClockError::NotReady)
    }

    /// Stop the Listener and its Ticker. Every pending waiter and every
    /// still-queued request is answered with [`ClockError::TimerCanceled`]
    /// (cancel requests with `Ok`). Blocks until the thread has finished;
    /// idempotent.
    pub fn stop(&self) {
        let thread = {
            let mut gate = self.lock();
            if !gate.working {
                return;
            }
            gate.working = false;
            gate.requests = None;
            gate.updates = None;
            if let Some(stop) = gate.stop.take() {
                let _ = stop.send(());
            }
            gate.thread.take()
        };
        if let Some(handle) = thread {
            let _ = handle.join();
        }
    }

    /// Whether [`stop`](Listener::stop) has not been called yet.
    pub fn is_working(&self) -> bool {
        self.lock().working
    }

    fn send(&self, request: Request) -> Result<(), ClockError> {
        let requests = {
            let gate = self.lock();
            match (&gate.requests, gate.working) {
                (Some(tx), true) => tx.clone(),
                _ => return Err(ClockError::NotReady),
            }
        };
        requests.send(request).map_err(|_| ClockError::NotReady)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("working", &self.is_working())
            .finish()
    }
}

// ── Listener thread ──────────────────────────────────────────────

struct ListenerLoop {
    ctx: Context,
    ticker: Ticker,
    ticks: Receiver<StatusResponse>,
    requests: Receiver<Request>,
    updates: Receiver<Update>,
    stop: Receiver<()>,
    /// `None` until the first status arrives.
    last: Option<StatusResponse>,
    waiters: Bimap<Waiter>,
}

impl ListenerLoop {
    fn run(mut self) {
        if self.await_first_status() {
            self.serve();
        }
        self.shutdown();
    }

    /// Block until a status is known. `false` if stopped first.
    fn await_first_status(&mut self) -> bool {
        while self.last.is_none() {
            select! {
                recv(self.ticks) -> msg => match msg {
                    Ok(status) => self.apply(status),
                    Err(_) => return false,
                },
                recv(self.updates) -> msg => match msg {
                    Ok(update) => self.apply_update(update),
                    Err(_) => return false,
                },
                recv(self.stop) -> _ => return false,
            }
        }
        self.ctx.trace(format_args!("initialized"));
        true
    }

    fn serve(&mut self) {
        let mut ticks = self.ticks.clone();
        loop {
            select! {
                recv(ticks) -> msg => match msg {
                    Ok(status) => self.apply(status),
                    Err(_) => {
                        log::warn!(target: LOG_TARGET, "[{}] ticker channel closed", self.ctx.span());
                        ticks = never();
                    }
                },
                recv(self.updates) -> msg => match msg {
                    Ok(update) => self.apply_update(update),
                    Err(_) => return,
                },
                recv(self.requests) -> msg => match msg {
                    Ok(request) => self.handle(request),
                    Err(_) => return,
                },
                recv(self.stop) -> _ => return,
            }
        }
    }

    fn apply_update(&mut self, update: Update) {
        self.apply(update.status);
        let _ = update.ack.send(());
    }

    /// Merge `incoming` (epoch first, then tick) and resolve everything due.
    fn apply(&mut self, incoming: StatusResponse) {
        let merged = match self.last {
            Some(last) => last.merge(incoming),
            None => incoming,
        };
        self.last = Some(merged);
        for waiter in self.waiters.drain_secondary(|due| due <= merged.now) {
            self.ctx.trace(format_args!(
                "'{}' (#{}) due {} resolved at {}",
                waiter.name, waiter.id, waiter.due, merged.now
            ));
            let _ = waiter.reply.send(Ok(merged));
        }
    }

    fn handle(&mut self, request: Request) {
        let Some(last) = self.last else {
            // Unreachable: requests are only served once initialized.
            return;
        };
        match request {
            Request::After(waiter) => {
                if self.waiters.contains(waiter.id) {
                    log::error!(
                        target: LOG_TARGET,
                        "[{}] waiter id {} registered twice",
                        self.ctx.span(),
                        waiter.id
                    );
                    let id = waiter.id;
                    let _ = waiter.reply.send(Err(ClockError::TimerIdAlreadyExists { id }));
                } else if waiter.due <= last.now {
                    let _ = waiter.reply.send(Ok(last));
                } else {
                    self.waiters.add(waiter);
                }
            }
            Request::Cancel { id, reply } => {
                if let Some(waiter) = self.waiters.remove(id) {
                    let _ = waiter.reply.send(Err(ClockError::TimerCanceled));
                }
                let _ = reply.send(Ok(()));
            }
            Request::Status { reply } => {
                let _ = reply.send(last);
            }
            Request::Count { reply } => {
                let _ = reply.send(self.waiters.len());
            }
        }
    }

    fn shutdown(mut self) {
        self.ticker.stop();
        let pending = self.waiters.take_all();
        let canceled = pending.len();
        for waiter in pending {
            let _ = waiter.reply.send(Err(ClockError::TimerCanceled));
        }
        // Blocks until every caller still mid-send has delivered. The gate
        // hands out no new senders once stopped, so this ends.
        for request in self.requests.iter() {
            match request {
                Request::After(waiter) => {
                    let _ = waiter.reply.send(Err(ClockError::TimerCanceled));
                }
                Request::Cancel { reply, .. } => {
                    let _ = reply.send(Ok(()));
                }
                Request::Status { .. } | Request::Count { .. } => {}
            }
        }
        for update in self.updates.iter() {
            let _ = update.ack.send(());
        }
        log::debug!(
            target: LOG_TARGET,
            "[{}] listener stopped, {canceled} waiter(s) canceled",
            self.ctx.span()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use simtime_core::{Epoch, Policy};

    use super::*;

    /// A Listener whose Ticker never delivers; statuses come only through
    /// `update_status`.
    fn quiet_listener() -> Listener {
        quiet_listener_with(ListenerConfig::default())
    }

    fn quiet_listener_with(config: ListenerConfig) -> Listener {
        struct Silent;
        impl Connector for Silent {
            fn connect(
                &self,
            ) -> Result<Box<dyn simtime_core::StepperConnection>, ClockError> {
                thread::sleep(Duration::from_millis(20));
                Err(ClockError::unavailable("silent"))
            }
        }
        Listener::start(Arc::new(Silent), config).unwrap()
    }

    fn at(now: u64, epoch: u64) -> StatusResponse {
        StatusResponse {
            policy: Policy::Manual,
            now: Tick(now),
            epoch: Epoch(epoch),
            ..StatusResponse::default()
        }
    }

    #[test]
    fn waiters_resolve_when_due() {
        let l = quiet_listener();
        l.update_status(at(1, 1)).unwrap();
        let (_, rx3) = l.after("three", Tick(3)).unwrap();
        let (_, rx5) = l.after("five", Tick(5)).unwrap();
        assert_eq!(l.waiter_count().unwrap(), 2);

        l.update_status(at(4, 1)).unwrap();
        assert_eq!(rx3.try_recv().unwrap().unwrap().now, Tick(4));
        assert!(rx5.try_recv().is_err());
        assert_eq!(l.waiter_count().unwrap(), 1);
    }

    #[test]
    fn stale_updates_never_regress_the_clock() {
        let l = quiet_listener();
        l.update_status(at(5, 2)).unwrap();
        l.update_status(at(9, 1)).unwrap();
        l.update_status(at(3, 2)).unwrap();
        assert_eq!(l.status().unwrap(), at(5, 2));

        // A newer epoch wins even at a lower tick.
        l.update_status(at(0, 3)).unwrap();
        assert_eq!(l.status().unwrap(), at(0, 3));
    }

    #[test]
    fn cancel_known_and_unknown() {
        let l = quiet_listener();
        l.update_status(at(0, 1)).unwrap();
        let (id, waiter) = l.after("w", Tick(10)).unwrap();

        let done = l.cancel(id).unwrap();
        assert_eq!(waiter.recv().unwrap(), Err(ClockError::TimerCanceled));
        assert_eq!(done.recv().unwrap(), Ok(()));
        // Closed after its one value.
        assert!(waiter.recv().is_err());

        let done = l.cancel(9999).unwrap();
        assert_eq!(done.recv().unwrap(), Ok(()));
    }

    #[test]
    fn stop_cancels_pending_and_rejects_new_requests() {
        let l = quiet_listener();
        l.update_status(at(0, 1)).unwrap();
        let (_, waiter) = l.after("w", Tick(10)).unwrap();
        l.stop();
        assert_eq!(waiter.recv().unwrap(), Err(ClockError::TimerCanceled));
        assert!(matches!(l.after("late", Tick(1)), Err(ClockError::NotReady)));
        assert!(matches!(l.cancel(1), Err(ClockError::NotReady)));
        assert!(!l.is_working());
        l.stop();
    }

    #[test]
    fn requests_before_first_status_wait_for_it() {
        let l = quiet_listener();
        let (_, rx) = l.after("early", Tick(2)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
        l.update_status(at(2, 1)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap().now,
            Tick(2)
        );
    }

    #[test]
    fn stop_answers_requests_queued_before_first_status() {
        let l = quiet_listener();
        let (id, waiter) = l.after("early", Tick(5)).unwrap();
        let done = l.cancel(id).unwrap();
        l.stop();
        assert_eq!(
            waiter.recv_timeout(Duration::from_secs(2)).unwrap(),
            Err(ClockError::TimerCanceled)
        );
        assert_eq!(done.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(()));
    }

    #[test]
    fn stop_gets_through_a_full_request_queue() {
        let l = Arc::new(quiet_listener_with(ListenerConfig {
            request_capacity: 1,
        }));
        let (_, first) = l.after("a", Tick(1)).unwrap();

        // The queue is full and nothing is served before a status arrives,
        // so this send blocks.
        let blocked = Arc::clone(&l);
        let (after_tx, after_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = after_tx.send(blocked.after("b", Tick(2)));
        });
        thread::sleep(Duration::from_millis(50));

        let stopper = Arc::clone(&l);
        let (stopped_tx, stopped_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            stopper.stop();
            let _ = stopped_tx.send(());
        });
        assert!(stopped_rx.recv_timeout(Duration::from_secs(3)).is_ok());

        assert_eq!(
            first.recv_timeout(Duration::from_secs(2)).unwrap(),
            Err(ClockError::TimerCanceled)
        );
        match after_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Ok((_, second)) => assert_eq!(
                second.recv_timeout(Duration::from_secs(2)).unwrap(),
                Err(ClockError::TimerCanceled)
            ),
            Err(err) => assert_eq!(err, ClockError::NotReady),
        }
    }

    #[test]
    fn ids_are_unique() {
        let l = quiet_listener();
        l.update_status(at(0, 1)).unwrap();
        let (a, _ra) = l.after("a", Tick(5)).unwrap();
        let (b, _rb) = l.after("b", Tick(5)).unwrap();
        assert_ne!(a, b);
        assert_eq!(l.waiter_count().unwrap(), 2);
    }
}
