//! Test utilities and mock connectors for simtime development.
//!
//! Provides scripted and failure-injecting [`Connector`] implementations,
//! bounded receive helpers so a hung actor fails a test instead of
//! wedging it, and [`init_logging`] for readable test output.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod connectors;

pub use connectors::{FailingConnector, FlakyConnector, ScriptFeed, ScriptedConnector};

use std::time::Duration;

use crossbeam_channel::Receiver;
use simtime_core::{Epoch, Policy, StatusResponse, Tick};

/// Upper bound on any single blocking wait in tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Install `env_logger` once. Honors `RUST_LOG`; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Receive one value or panic after [`WAIT`].
pub fn recv_soon<T>(rx: &Receiver<T>) -> T {
    match rx.recv_timeout(WAIT) {
        Ok(v) => v,
        Err(e) => panic!("nothing received within {WAIT:?}: {e}"),
    }
}

/// Assert nothing arrives on `rx` for `quiet`.
pub fn assert_silent<T: std::fmt::Debug>(rx: &Receiver<T>, quiet: Duration) {
    if let Ok(v) = rx.recv_timeout(quiet) {
        panic!("expected silence for {quiet:?}, got {v:?}");
    }
}

/// Poll `cond` until it holds or [`WAIT`] elapses.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A snapshot with the given clock position and no waiters.
pub fn status(policy: Policy, now: u64, epoch: u64) -> StatusResponse {
    StatusResponse {
        policy,
        measured_delay: Duration::ZERO,
        now: Tick(now),
        epoch: Epoch(epoch),
        waiter_count: 0,
    }
}
