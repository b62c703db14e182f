//! Benchmark fixtures for the simtime simulated clock.
//!
//! - [`populated_bimap`]: a waiter index with a fixed number of entries
//!   spread over a range of due ticks
//! - [`manual_stepper`] / [`no_wait_stepper`]: started clocks ready for
//!   round-trip measurements

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::time::Duration;

use simtime_core::{Bimap, BimapItem, ConfigError, Context, Policy, Tick};
use simtime_stepper::{Stepper, StepperConfig};

/// Minimal waiter record indexed by id and due tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Unique id.
    pub id: u64,
    /// Due tick.
    pub due: Tick,
}

impl BimapItem for Entry {
    type Secondary = Tick;

    fn primary(&self) -> u64 {
        self.id
    }

    fn secondary(&self) -> Tick {
        self.due
    }
}

/// Build a bimap of `count` entries with ids `0..count` and due ticks
/// cycling through `0..spread`. `spread` of zero is treated as one.
pub fn populated_bimap(count: u64, spread: u64) -> Bimap<Entry> {
    let spread = spread.max(1);
    let mut map = Bimap::new();
    for id in 0..count {
        map.add(Entry {
            id,
            due: Tick(id % spread),
        });
    }
    map
}

/// A Stepper already switched to Manual.
pub fn manual_stepper() -> Result<Stepper, ConfigError> {
    Stepper::start(StepperConfig::with_policy(Policy::Manual))
}

/// A Stepper already switched to NoWait.
pub fn no_wait_stepper() -> Result<Stepper, ConfigError> {
    let stepper = Stepper::start(StepperConfig::default())?;
    // A fresh Invalid clock at epoch 0 cannot reject an unconditional change.
    let _ = stepper.set_policy(&Context::new(), Policy::NoWait, Duration::ZERO, None);
    Ok(stepper)
}
