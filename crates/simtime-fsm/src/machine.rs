//! The state-machine runtime: current state, transitions, and bookkeeping.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use simtime_core::{ClockError, Context, Guard, Tick, LOG_TARGET};

use crate::state::{State, Tagged, Target};

/// Identity of a state. Implemented for any small copyable key.
pub trait StateId: Copy + Eq + Hash + fmt::Debug {}

impl<T: Copy + Eq + Hash + fmt::Debug> StateId for T {}

/// Checkpointable view of a machine's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Savable<S> {
    /// Active state.
    pub current: S,
    /// Tick at which the active state was entered.
    pub entered_at: Tick,
    /// Whether the machine has reached a terminal state.
    pub terminated: bool,
    /// Last accepted effective tick.
    pub guard: Tick,
}

/// A state machine over states `S`, messages `M`, owning actor data `P`.
///
/// Hooks and actions receive `&mut Machine`, so they reach the owning
/// actor's fields through [`parent`](Machine::parent) and the machine's
/// own bookkeeping through its accessors.
pub struct Machine<S, M: Tagged, P> {
    name: &'static str,
    first: S,
    current: S,
    states: IndexMap<S, State<S, M, P>>,
    /// Data of the actor that owns this machine.
    pub parent: P,
    entered_at: Tick,
    terminated: bool,
    guard: Guard<Tick>,
    started: bool,
    clock: Option<fn(&P) -> Tick>,
}

impl<S: StateId, M: Tagged, P> Machine<S, M, P> {
    /// Create a machine whose first state will be `first` once started.
    pub fn new(name: &'static str, first: S, parent: P) -> Self {
        Self {
            name,
            first,
            current: first,
            states: IndexMap::new(),
            parent,
            entered_at: Tick::ZERO,
            terminated: false,
            guard: Guard::new(Tick::ZERO),
            started: false,
            clock: None,
        }
    }

    /// Read the current tick from the owning actor instead of the context.
    ///
    /// For actors that own the clock: an action may move it, and the
    /// context was built before the action ran.
    pub fn with_clock(mut self, clock: fn(&P) -> Tick) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Declare a state. A later declaration with the same id replaces the
    /// earlier one.
    pub fn with_state(mut self, id: S, state: State<S, M, P>) -> Self {
        self.states.insert(id, state);
        self
    }

    /// Enter the first state, running its enter hook.
    pub fn start(&mut self, ctx: &Context) -> Result<(), ClockError> {
        if self.started {
            return Err(ClockError::AlreadyStarted);
        }
        let enter = self.state(self.first)?.enter;
        self.started = true;
        self.current = self.first;
        self.entered_at = self.now(ctx).unwrap_or(Tick::ZERO);
        self.guard.advance(self.entered_at);
        log::debug!(
            target: LOG_TARGET,
            "[{}] {}: start in '{}'",
            ctx.span(),
            self.name,
            self.current_name()
        );
        enter(ctx, self)
    }

    /// Leave the current state and enter `next`.
    ///
    /// The swap is not rolled back if the new state's enter hook fails;
    /// the error is returned with the machine already in `next`.
    pub fn change_state(&mut self, ctx: &Context, next: S) -> Result<(), ClockError> {
        let leave = self.state(self.current)?.leave;
        let enter = self.state(next)?.enter;
        let from = self.current;

        leave(ctx, self, next);

        self.current = next;
        if let Some(tick) = self.now(ctx) {
            self.entered_at = tick;
        }
        self.guard.advance(self.entered_at);
        log::debug!(
            target: LOG_TARGET,
            "[{}] {}: {:?} -> {:?} at {}",
            ctx.span(),
            self.name,
            from,
            next,
            self.entered_at
        );

        enter(ctx, self)
    }

    /// Dispatch `msg` through the current state's action table.
    ///
    /// Returns only transition errors (an enter hook failing); action
    /// outcomes are reported by the actions themselves.
    pub fn receive(&mut self, ctx: &Context, msg: M) -> Result<(), ClockError> {
        let tag = msg.tag();
        let (entry, unexpected) = {
            let state = self.state(self.current)?;
            (state.find(tag), state.unexpected)
        };

        let Some(entry) = entry else {
            unexpected(ctx, self, msg);
            return Ok(());
        };

        let target = if (entry.action)(ctx, self, msg) {
            entry.on_success
        } else {
            entry.on_failure
        };

        match target {
            Target::Stay => Ok(()),
            Target::To(next) => self.change_state(ctx, next),
        }
    }

    /// Machine name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Active state.
    pub fn current(&self) -> S {
        self.current
    }

    /// Display name of the active state.
    pub fn current_name(&self) -> &'static str {
        self.states
            .get(&self.current)
            .map(|s| s.name)
            .unwrap_or("<undeclared>")
    }

    /// Tick at which the active state was entered.
    pub fn entered_at(&self) -> Tick {
        self.entered_at
    }

    /// Whether a terminal state has been reached.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Mark the machine terminated. Called by terminal states' enter hooks.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// The machine's staleness guard.
    pub fn guard(&self) -> &Guard<Tick> {
        &self.guard
    }

    /// Mutable access to the staleness guard, for command admission.
    pub fn guard_mut(&mut self) -> &mut Guard<Tick> {
        &mut self.guard
    }

    /// Export bookkeeping for checkpointing.
    pub fn savable(&self) -> Savable<S> {
        Savable {
            current: self.current,
            entered_at: self.entered_at,
            terminated: self.terminated,
            guard: self.guard.value(),
        }
    }

    fn now(&self, ctx: &Context) -> Option<Tick> {
        match self.clock {
            Some(clock) => Some(clock(&self.parent)),
            None => ctx.tick(),
        }
    }

    fn state(&self, id: S) -> Result<&State<S, M, P>, ClockError> {
        self.states.get(&id).ok_or_else(|| ClockError::InvalidMessage {
            reason: format!("{}: state {:?} is not declared", self.name, id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // A turnstile: locked until paid, one push per payment.

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Gate {
        Locked,
        Open,
        Broken,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Tag {
        Coin,
        Push,
        Kick,
    }

    #[derive(Clone, Debug)]
    enum Msg {
        Coin(u32),
        Push,
        Kick,
    }

    impl Tagged for Msg {
        type Tag = Tag;

        fn tag(&self) -> Tag {
            match self {
                Msg::Coin(_) => Tag::Coin,
                Msg::Push => Tag::Push,
                Msg::Kick => Tag::Kick,
            }
        }
    }

    #[derive(Default)]
    struct Data {
        enters: Vec<Gate>,
        leaves: Vec<(Gate, Gate)>,
        coins: u32,
        unexpected: u32,
        fail_enter_open: bool,
    }

    type Turnstile = Machine<Gate, Msg, Data>;

    fn record_enter(_ctx: &Context, m: &mut Turnstile) -> Result<(), ClockError> {
        let cur = m.current();
        m.parent.enters.push(cur);
        Ok(())
    }

    fn enter_open(ctx: &Context, m: &mut Turnstile) -> Result<(), ClockError> {
        record_enter(ctx, m)?;
        if m.parent.fail_enter_open {
            return Err(ClockError::unavailable("jammed"));
        }
        Ok(())
    }

    fn enter_broken(ctx: &Context, m: &mut Turnstile) -> Result<(), ClockError> {
        m.terminate();
        record_enter(ctx, m)
    }

    fn record_leave(_ctx: &Context, m: &mut Turnstile, next: Gate) {
        let cur = m.current();
        m.parent.leaves.push((cur, next));
    }

    fn coin(_ctx: &Context, m: &mut Turnstile, msg: Msg) -> bool {
        match msg {
            Msg::Coin(n) if n >= 1 => {
                m.parent.coins += n;
                true
            }
            _ => false,
        }
    }

    fn push(_ctx: &Context, _m: &mut Turnstile, _msg: Msg) -> bool {
        true
    }

    fn count_unexpected(_ctx: &Context, m: &mut Turnstile, _msg: Msg) {
        m.parent.unexpected += 1;
    }

    fn turnstile(data: Data) -> Turnstile {
        Machine::new("turnstile", Gate::Locked, data)
            .with_state(
                Gate::Locked,
                State::new("locked")
                    .on_enter(record_enter)
                    .on_leave(record_leave)
                    .on_unexpected(count_unexpected)
                    .on(Tag::Coin, coin, Target::To(Gate::Open), Target::Stay)
                    .on(Tag::Kick, push, Target::To(Gate::Broken), Target::Stay),
            )
            .with_state(
                Gate::Open,
                State::new("open")
                    .on_enter(enter_open)
                    .on_leave(record_leave)
                    .on(Tag::Coin, coin, Target::Stay, Target::Stay)
                    .on(Tag::Push, push, Target::To(Gate::Locked), Target::Stay),
            )
            .with_state(Gate::Broken, State::new("broken").on_enter(enter_broken))
    }

    #[test]
    fn start_enters_first_state_once() {
        let mut m = turnstile(Data::default());
        m.start(&Context::new()).unwrap();
        assert_eq!(m.current(), Gate::Locked);
        assert_eq!(m.parent.enters, vec![Gate::Locked]);
        assert_eq!(m.start(&Context::new()), Err(ClockError::AlreadyStarted));
    }

    #[test]
    fn success_and_failure_targets() {
        let mut m = turnstile(Data::default());
        let ctx = Context::new();
        m.start(&ctx).unwrap();

        m.receive(&ctx, Msg::Coin(0)).unwrap();
        assert_eq!(m.current(), Gate::Locked);
        assert!(m.parent.leaves.is_empty());

        m.receive(&ctx, Msg::Coin(2)).unwrap();
        assert_eq!(m.current(), Gate::Open);
        assert_eq!(m.parent.leaves, vec![(Gate::Locked, Gate::Open)]);

        // Stay: no hooks run.
        m.receive(&ctx, Msg::Coin(1)).unwrap();
        assert_eq!(m.current(), Gate::Open);
        assert_eq!(m.parent.enters, vec![Gate::Locked, Gate::Open]);
        assert_eq!(m.parent.coins, 3);

        m.receive(&ctx, Msg::Push).unwrap();
        assert_eq!(m.current(), Gate::Locked);
    }

    #[test]
    fn unmatched_tag_goes_to_fallback() {
        let mut m = turnstile(Data::default());
        let ctx = Context::new();
        m.start(&ctx).unwrap();
        m.receive(&ctx, Msg::Push).unwrap();
        assert_eq!(m.parent.unexpected, 1);
        assert_eq!(m.current(), Gate::Locked);
    }

    #[test]
    fn transition_records_tick_and_guard() {
        let mut m = turnstile(Data::default());
        m.start(&Context::new().with_tick(Tick(2))).unwrap();
        assert_eq!(m.entered_at(), Tick(2));

        m.receive(&Context::new().with_tick(Tick(9)), Msg::Coin(1))
            .unwrap();
        let saved = m.savable();
        assert_eq!(saved.current, Gate::Open);
        assert_eq!(saved.entered_at, Tick(9));
        assert_eq!(saved.guard, Tick(9));
        assert!(!saved.terminated);
    }

    #[test]
    fn owner_clock_overrides_context_tick() {
        let mut m = turnstile(Data::default()).with_clock(|d| Tick(u64::from(d.coins)));
        m.start(&Context::new().with_tick(Tick(40))).unwrap();
        assert_eq!(m.entered_at(), Tick(0));

        // The action moves the owner's clock; the transition sees it.
        m.receive(&Context::new().with_tick(Tick(40)), Msg::Coin(2))
            .unwrap();
        assert_eq!(m.current(), Gate::Open);
        assert_eq!(m.entered_at(), Tick(2));
    }

    #[test]
    fn enter_failure_is_propagated_without_rollback() {
        let mut m = turnstile(Data {
            fail_enter_open: true,
            ..Data::default()
        });
        let ctx = Context::new();
        m.start(&ctx).unwrap();
        let err = m.receive(&ctx, Msg::Coin(1)).unwrap_err();
        assert_eq!(err, ClockError::unavailable("jammed"));
        assert_eq!(m.current(), Gate::Open);
    }

    #[test]
    fn terminal_state_marks_terminated() {
        let mut m = turnstile(Data::default());
        let ctx = Context::new();
        m.start(&ctx).unwrap();
        m.receive(&ctx, Msg::Kick).unwrap();
        assert_eq!(m.current_name(), "broken");
        assert!(m.is_terminated());
        // Broken has no table; default fallback drops everything.
        m.receive(&ctx, Msg::Coin(5)).unwrap();
        assert_eq!(m.parent.coins, 0);
    }

    fn any_msg() -> impl Strategy<Value = Msg> {
        prop_oneof![
            (0u32..3).prop_map(Msg::Coin),
            Just(Msg::Push),
            Just(Msg::Kick),
        ]
    }

    proptest! {
        /// Whatever arrives, at whatever tick, the guard never moves back,
        /// the machine stays in a declared state, and termination sticks.
        #[test]
        fn bookkeeping_is_monotonic(
            script in proptest::collection::vec((any_msg(), 0u64..50), 0..40),
        ) {
            let mut m = turnstile(Data::default());
            m.start(&Context::new()).unwrap();
            let mut guard = m.guard().value();
            let mut terminated = false;

            for (msg, tick) in script {
                m.receive(&Context::new().with_tick(Tick(tick)), msg).unwrap();
                prop_assert!(m.guard().value() >= guard);
                prop_assert_ne!(m.current_name(), "<undeclared>");
                prop_assert!(!terminated || m.is_terminated());
                guard = m.guard().value();
                terminated = m.is_terminated();
            }
        }
    }

    #[test]
    fn guard_admission_through_machine() {
        let mut m = turnstile(Data::default());
        m.start(&Context::new().with_tick(Tick(5))).unwrap();
        assert!(!m.guard_mut().pass(Tick(4), Tick(6)));
        assert!(m.guard_mut().pass(Tick(5), Tick(6)));
        assert_eq!(m.guard().value(), Tick(6));
    }
}
