//! Optimistic ordering token for entities that must reject stale commands.
//!
//! A [`Guard`] records the effective point (tick or epoch) of the last
//! accepted command. A later command carries the point it was issued
//! against; if that point is older than the guard the command is stale and
//! is rejected without mutating anything.

use crate::id::Tick;

/// Last accepted effective point for one entity.
///
/// Monotonically non-decreasing: neither [`pass`](Guard::pass) nor
/// [`advance`](Guard::advance) can move it backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Guard<T = Tick> {
    value: T,
}

impl<T: Ord + Copy> Guard<T> {
    /// Create a guard that admits anything at or after `initial`.
    pub fn new(initial: T) -> Self {
        Self { value: initial }
    }

    /// Current guard value.
    pub fn value(&self) -> T {
        self.value
    }

    /// Admission check.
    ///
    /// Returns `false` and leaves the guard untouched if `check` is older
    /// than the guard. Otherwise records `at` as the new guard value
    /// (never lowering it) and returns `true`.
    pub fn pass(&mut self, check: T, at: T) -> bool {
        if check < self.value {
            return false;
        }
        self.advance(at);
        true
    }

    /// Unconditionally raise the guard to `at` if it is ahead.
    pub fn advance(&mut self, at: T) {
        if at > self.value {
            self.value = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Epoch;
    use proptest::prelude::*;

    #[test]
    fn stale_check_is_rejected_without_mutation() {
        let mut g = Guard::new(Tick(10));
        assert!(!g.pass(Tick(9), Tick(20)));
        assert_eq!(g.value(), Tick(10));
    }

    #[test]
    fn equal_check_is_admitted() {
        let mut g = Guard::new(Tick(10));
        assert!(g.pass(Tick(10), Tick(12)));
        assert_eq!(g.value(), Tick(12));
    }

    #[test]
    fn advance_is_max() {
        let mut g = Guard::new(Epoch(4));
        g.advance(Epoch(2));
        assert_eq!(g.value(), Epoch(4));
        g.advance(Epoch(6));
        assert_eq!(g.value(), Epoch(6));
    }

    proptest! {
        #[test]
        fn guard_is_monotonic(ops in proptest::collection::vec((0u64..50, 0u64..50, any::<bool>()), 1..40)) {
            let mut g = Guard::new(Tick::ZERO);
            let mut prev = g.value();
            for (check, at, is_pass) in ops {
                if is_pass {
                    let admitted = g.pass(Tick(check), Tick(at));
                    prop_assert_eq!(admitted, Tick(check) >= prev);
                } else {
                    g.advance(Tick(at));
                }
                prop_assert!(g.value() >= prev);
                prev = g.value();
            }
        }
    }
}
