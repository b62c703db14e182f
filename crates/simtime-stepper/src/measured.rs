//! Wall-clock ticker backing the Measured policy.
//!
//! The ticker never touches Stepper state. Each interval it posts an
//! `AutoStep` stamped with the epoch it was started under; the Stepper
//! drops any whose stamp no longer matches, which covers ticks already in
//! flight when the policy changes.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Sender, TrySendError};
use simtime_core::{ClockError, Epoch, LOG_TARGET};

use crate::messages::StepperMessage;

/// Handle to a running Measured ticker thread. Stopped on drop.
pub(crate) struct MeasuredTicker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MeasuredTicker {
    /// Spawn a ticker posting `AutoStep { guard }` every `interval`.
    pub fn spawn(
        interval: Duration,
        guard: Epoch,
        mailbox: Sender<StepperMessage>,
    ) -> Result<Self, ClockError> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("simtime-measured".into())
            .spawn(move || {
                let ticks = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticks) -> _ => {
                            // try_send: the Stepper may be joining this thread.
                            match mailbox.try_send(StepperMessage::AutoStep { guard }) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    log::warn!(
                                        target: LOG_TARGET,
                                        "measured ticker: mailbox full, skipped a tick (epoch {guard})"
                                    );
                                }
                                Err(TrySendError::Disconnected(_)) => break,
                            }
                        }
                    }
                }
            })
            .map_err(|e| ClockError::unavailable(format!("measured ticker spawn failed: {e}")))?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects `stop_rx`, which wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MeasuredTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
