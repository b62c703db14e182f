//! State declarations: hooks plus a tag-dispatched action table.

use std::fmt;

use simtime_core::{ClockError, Context, LOG_TARGET};

use crate::machine::{Machine, StateId};

/// A message that can be dispatched by tag.
pub trait Tagged {
    /// Discriminant used to look up actions.
    type Tag: Copy + Eq + fmt::Debug;

    /// The tag of this message.
    fn tag(&self) -> Self::Tag;
}

/// Where a machine goes after an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target<S> {
    /// Remain in the current state without running leave/enter hooks.
    Stay,
    /// Transition to the given state.
    To(S),
}

/// Called when a state becomes current.
pub type EnterFn<S, M, P> = fn(&Context, &mut Machine<S, M, P>) -> Result<(), ClockError>;
/// Called when a state is about to be replaced; receives the destination.
pub type LeaveFn<S, M, P> = fn(&Context, &mut Machine<S, M, P>, S);
/// Handles a message. `true` selects the success target, `false` the failure target.
pub type ActionFn<S, M, P> = fn(&Context, &mut Machine<S, M, P>, M) -> bool;
/// Handles a message whose tag has no entry in the state's table.
pub type UnexpectedFn<S, M, P> = fn(&Context, &mut Machine<S, M, P>, M);

/// One row of a state's action table.
pub struct ActionEntry<S, M: Tagged, P> {
    /// Message tag this row handles.
    pub tag: M::Tag,
    /// Handler.
    pub action: ActionFn<S, M, P>,
    /// Target when the handler returns `true`.
    pub on_success: Target<S>,
    /// Target when the handler returns `false`.
    pub on_failure: Target<S>,
}

impl<S: Copy, M: Tagged, P> Clone for ActionEntry<S, M, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Copy, M: Tagged, P> Copy for ActionEntry<S, M, P> {}

/// Declaration of one state.
pub struct State<S, M: Tagged, P> {
    pub(crate) name: &'static str,
    pub(crate) enter: EnterFn<S, M, P>,
    pub(crate) leave: LeaveFn<S, M, P>,
    pub(crate) unexpected: UnexpectedFn<S, M, P>,
    actions: Vec<ActionEntry<S, M, P>>,
}

impl<S: StateId, M: Tagged, P> State<S, M, P> {
    /// A state with no-op hooks, an empty table, and a fallback that drops
    /// unexpected messages with a warning.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            enter: no_enter,
            leave: no_leave,
            unexpected: drop_unexpected,
            actions: Vec::new(),
        }
    }

    /// Set the enter hook.
    pub fn on_enter(mut self, enter: EnterFn<S, M, P>) -> Self {
        self.enter = enter;
        self
    }

    /// Set the leave hook.
    pub fn on_leave(mut self, leave: LeaveFn<S, M, P>) -> Self {
        self.leave = leave;
        self
    }

    /// Set the fallback for messages with no matching table row.
    pub fn on_unexpected(mut self, unexpected: UnexpectedFn<S, M, P>) -> Self {
        self.unexpected = unexpected;
        self
    }

    /// Append a table row. Rows are scanned in declaration order and the
    /// first matching tag wins.
    pub fn on(
        mut self,
        tag: M::Tag,
        action: ActionFn<S, M, P>,
        on_success: Target<S>,
        on_failure: Target<S>,
    ) -> Self {
        self.actions.push(ActionEntry {
            tag,
            action,
            on_success,
            on_failure,
        });
        self
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn find(&self, tag: M::Tag) -> Option<ActionEntry<S, M, P>> {
        self.actions.iter().find(|entry| entry.tag == tag).copied()
    }
}

fn no_enter<S: StateId, M: Tagged, P>(
    _ctx: &Context,
    _m: &mut Machine<S, M, P>,
) -> Result<(), ClockError> {
    Ok(())
}

fn no_leave<S: StateId, M: Tagged, P>(_ctx: &Context, _m: &mut Machine<S, M, P>, _next: S) {}

fn drop_unexpected<S: StateId, M: Tagged, P>(ctx: &Context, m: &mut Machine<S, M, P>, msg: M) {
    log::warn!(
        target: LOG_TARGET,
        "[{}] {}: dropped unexpected {:?} in state '{}'",
        ctx.span(),
        m.name(),
        msg.tag(),
        m.current_name()
    );
}
