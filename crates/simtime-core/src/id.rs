//! Strongly-typed simulated-time identifiers.

use std::fmt;

/// Simulated-time value.
///
/// Strictly non-decreasing for the lifetime of a Stepper, except for an
/// explicit reset which returns it to [`Tick::ZERO`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// The first tick of every clock lifetime.
    pub const ZERO: Tick = Tick(0);

    /// The tick immediately after this one.
    pub fn next(self) -> Tick {
        Tick(self.0.saturating_add(1))
    }

    /// This tick moved forward by `delta` ticks, saturating at `u64::MAX`.
    pub fn after(self, delta: u64) -> Tick {
        Tick(self.0.saturating_add(delta))
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Tick {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Policy generation counter.
///
/// Incremented by the Stepper on every policy change, including reset.
/// Clients only ever hold read-only copies taken from status snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The generation before any policy has been selected.
    pub const ZERO: Epoch = Epoch(0);

    /// The generation that follows this one.
    pub fn next(self) -> Epoch {
        Epoch(self.0.saturating_add(1))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Epoch {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_next_and_after() {
        assert_eq!(Tick::ZERO.next(), Tick(1));
        assert_eq!(Tick(5).after(3), Tick(8));
        assert_eq!(Tick(u64::MAX).next(), Tick(u64::MAX));
    }

    #[test]
    fn epoch_ordering() {
        let e = Epoch::ZERO.next().next();
        assert_eq!(e, Epoch(2));
        assert!(Epoch(1) < e);
        assert_eq!(format!("{e}"), "2");
    }
}
