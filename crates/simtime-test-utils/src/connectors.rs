//! Connectors for exercising client reconnect paths.
//!
//! - [`ScriptedConnector`]: `delay` answers come from a test-controlled feed.
//! - [`FailingConnector`]: every connect attempt fails.
//! - [`FlakyConnector`]: wraps another connector and fails a set number of calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use simtime_core::{ClockError, Connector, Context, StatusResponse, StepperConnection, Tick};

type Answer = Result<StatusResponse, ClockError>;

/// Connector whose `delay` calls block until the test feeds an answer.
///
/// All connections share one feed, so answers are consumed in order no
/// matter how many times the client reconnects.
pub struct ScriptedConnector {
    feed: Receiver<Answer>,
    requests: Arc<Mutex<Vec<Tick>>>,
    last: Arc<Mutex<StatusResponse>>,
    connects: Arc<AtomicU64>,
}

/// Test-side handle of a [`ScriptedConnector`].
pub struct ScriptFeed {
    tx: Sender<Answer>,
    requests: Arc<Mutex<Vec<Tick>>>,
    connects: Arc<AtomicU64>,
}

impl ScriptedConnector {
    pub fn new() -> (ScriptedConnector, ScriptFeed) {
        let (tx, feed) = crossbeam_channel::unbounded();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connects = Arc::new(AtomicU64::new(0));
        (
            ScriptedConnector {
                feed,
                requests: Arc::clone(&requests),
                last: Arc::new(Mutex::new(StatusResponse::default())),
                connects: Arc::clone(&connects),
            },
            ScriptFeed {
                tx,
                requests,
                connects,
            },
        )
    }
}

impl ScriptFeed {
    /// Answer the next `delay` with `status`.
    pub fn push(&self, status: StatusResponse) {
        let _ = self.tx.send(Ok(status));
    }

    /// Fail the next `delay` with `err`.
    pub fn fail(&self, err: ClockError) {
        let _ = self.tx.send(Err(err));
    }

    /// Every `at_least` requested so far, in order.
    pub fn requests(&self) -> Vec<Tick> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of connections opened.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> Result<Box<dyn StepperConnection>, ClockError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            feed: self.feed.clone(),
            requests: Arc::clone(&self.requests),
            last: Arc::clone(&self.last),
        }))
    }
}

struct ScriptedConnection {
    feed: Receiver<Answer>,
    requests: Arc<Mutex<Vec<Tick>>>,
    last: Arc<Mutex<StatusResponse>>,
}

impl StepperConnection for ScriptedConnection {
    fn delay(&mut self, _ctx: &Context, at_least: Tick, _jitter: u64) -> Answer {
        self.requests.lock().unwrap().push(at_least);
        let answer = self
            .feed
            .recv()
            .unwrap_or_else(|_| Err(ClockError::unavailable("script feed closed")));
        if let Ok(status) = &answer {
            *self.last.lock().unwrap() = *status;
        }
        answer
    }

    fn get_status(&mut self, _ctx: &Context) -> Answer {
        Ok(*self.last.lock().unwrap())
    }
}

/// Connector that never connects.
#[derive(Default)]
pub struct FailingConnector {
    attempts: AtomicU64,
}

impl FailingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for FailingConnector {
    fn connect(&self) -> Result<Box<dyn StepperConnection>, ClockError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ClockError::unavailable("connection refused"))
    }
}

/// Wraps a connector and fails the first `failures` calls made through
/// any of its connections with `Unavailable`.
pub struct FlakyConnector<C> {
    inner: C,
    failures_left: Arc<AtomicU64>,
    connects: AtomicU64,
}

impl<C: Connector> FlakyConnector<C> {
    pub fn new(inner: C, failures: u64) -> Self {
        Self {
            inner,
            failures_left: Arc::new(AtomicU64::new(failures)),
            connects: AtomicU64::new(0),
        }
    }

    /// Calls still scheduled to fail.
    pub fn failures_left(&self) -> u64 {
        self.failures_left.load(Ordering::SeqCst)
    }

    /// Number of successful connects.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl<C: Connector> Connector for FlakyConnector<C> {
    fn connect(&self) -> Result<Box<dyn StepperConnection>, ClockError> {
        let inner = self.inner.connect()?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyConnection {
            inner,
            failures_left: Arc::clone(&self.failures_left),
        }))
    }
}

struct FlakyConnection {
    inner: Box<dyn StepperConnection>,
    failures_left: Arc<AtomicU64>,
}

impl FlakyConnection {
    fn should_fail(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl StepperConnection for FlakyConnection {
    fn delay(&mut self, ctx: &Context, at_least: Tick, jitter: u64) -> Answer {
        if self.should_fail() {
            return Err(ClockError::unavailable("injected failure"));
        }
        self.inner.delay(ctx, at_least, jitter)
    }

    fn get_status(&mut self, ctx: &Context) -> Answer {
        if self.should_fail() {
            return Err(ClockError::unavailable("injected failure"));
        }
        self.inner.get_status(ctx)
    }
}
