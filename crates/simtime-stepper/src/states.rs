//! Stepper states and their action tables.
//!
//! ```text
//! awaiting_start ──► invalid ◄──────► no_wait
//!                      ▲  ▲             ▲
//!                      │  └──► manual ◄─┤
//!                      └─────► measured ◄┘        (any) ──► faulted
//! ```
//!
//! Every active state accepts the three policy tags, `Step`, `Delay`,
//! `Reset` and `GetStatus`. `AutoStep` is only acted on in Measured.

use simtime_core::{ClockError, Context, Epoch, Policy, LOG_TARGET};
use simtime_fsm::{Machine, State, Tagged, Target};

use crate::actor::{Deferred, StepperData};
use crate::measured::MeasuredTicker;
use crate::messages::{StepperMessage, StepperTag as T};

/// States of the Stepper machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum StepperState {
    /// Constructed, not yet started.
    AwaitingStart,
    /// No policy; the clock does not move.
    Invalid,
    /// Delays resolve immediately.
    NoWait,
    /// Explicit steps only.
    Manual,
    /// Wall-clock driven.
    Measured,
    /// Terminal.
    Faulted,
}

pub(crate) type StepperMachine = Machine<StepperState, StepperMessage, StepperData>;

type Entry = State<StepperState, StepperMessage, StepperData>;

use StepperState as S;

/// Build the Stepper machine around `data`.
pub(crate) fn build(data: StepperData) -> StepperMachine {
    Machine::new("stepper", S::AwaitingStart, data)
        .with_clock(|data| data.latest)
        .with_state(
            S::AwaitingStart,
            State::new("awaiting_start").on_unexpected(reject_not_ready),
        )
        .with_state(
            S::Invalid,
            with_policy_changes(State::new("invalid"))
                .on_enter(enter_invalid)
                .on(T::Step, step_not_ready, Target::Stay, Target::Stay)
                .on(T::Delay, delay, Target::Stay, Target::Stay)
                .on(T::AutoStep, drop_auto_step, Target::Stay, Target::Stay),
        )
        .with_state(
            S::NoWait,
            with_policy_changes(State::new("no_wait"))
                .on_enter(enter_no_wait)
                .on(T::Step, step, Target::Stay, Target::Stay)
                .on(T::Delay, delay_no_wait, Target::Stay, Target::Stay)
                .on(T::AutoStep, drop_auto_step, Target::Stay, Target::Stay),
        )
        .with_state(
            S::Manual,
            with_policy_changes(State::new("manual"))
                .on_enter(enter_manual)
                .on(T::Step, step, Target::Stay, Target::Stay)
                .on(T::Delay, delay, Target::Stay, Target::Stay)
                .on(T::AutoStep, drop_auto_step, Target::Stay, Target::Stay),
        )
        .with_state(
            S::Measured,
            with_policy_changes(State::new("measured"))
                .on_enter(enter_measured)
                .on_leave(leave_measured)
                .on(T::Step, step, Target::Stay, Target::Stay)
                .on(T::Delay, delay, Target::Stay, Target::Stay)
                .on(T::AutoStep, auto_step, Target::Stay, Target::Stay),
        )
        .with_state(
            S::Faulted,
            State::new("faulted")
                .on_enter(enter_faulted)
                .on_unexpected(reject_faulted),
        )
}

/// Rows shared by every active state.
fn with_policy_changes(state: Entry) -> Entry {
    state
        .on_unexpected(reject_unexpected)
        .on(T::NoWaitPolicy, set_policy, Target::To(S::NoWait), Target::Stay)
        .on(T::ManualPolicy, set_policy, Target::To(S::Manual), Target::Stay)
        .on(
            T::MeasuredPolicy,
            set_policy,
            Target::To(S::Measured),
            Target::Stay,
        )
        .on(T::Reset, reset, Target::To(S::Invalid), Target::Stay)
        .on(T::GetStatus, get_status, Target::Stay, Target::Stay)
}

// ── Enter / leave hooks ─────────────────────────────────────────

fn enter_invalid(_ctx: &Context, m: &mut StepperMachine) -> Result<(), ClockError> {
    let data = &mut m.parent;
    data.policy = Policy::Invalid;
    data.measured_delay = std::time::Duration::ZERO;
    data.cancel_waiters(&ClockError::DelayCanceled);
    Ok(())
}

fn enter_no_wait(_ctx: &Context, m: &mut StepperMachine) -> Result<(), ClockError> {
    let data = &mut m.parent;
    data.policy = Policy::NoWait;
    data.jump_to_waiters();
    Ok(())
}

fn enter_manual(_ctx: &Context, m: &mut StepperMachine) -> Result<(), ClockError> {
    let data = &mut m.parent;
    data.policy = Policy::Manual;
    data.check_for_expiry();
    Ok(())
}

fn enter_measured(ctx: &Context, m: &mut StepperMachine) -> Result<(), ClockError> {
    let data = &mut m.parent;
    data.policy = Policy::Measured;
    data.stop_ticker();
    let guard = data.epoch.value();
    data.ticker = Some(MeasuredTicker::spawn(
        data.measured_delay,
        guard,
        data.mailbox.clone(),
    )?);
    ctx.trace(format_args!(
        "measured ticker started: {:?} per tick, epoch {guard}",
        data.measured_delay
    ));
    data.check_for_expiry();
    Ok(())
}

fn leave_measured(_ctx: &Context, m: &mut StepperMachine, _next: StepperState) {
    m.parent.stop_ticker();
}

fn enter_faulted(_ctx: &Context, m: &mut StepperMachine) -> Result<(), ClockError> {
    m.terminate();
    let data = &mut m.parent;
    data.stop_ticker();
    data.policy = Policy::Invalid;
    data.cancel_waiters(&ClockError::DelayCanceled);
    Ok(())
}

// ── Actions ─────────────────────────────────────────────────────

/// Admit a policy change if its epoch is not stale, then open a new epoch.
fn set_policy(ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::SetPolicy {
        request,
        match_epoch,
        reply,
    } = msg
    else {
        return false;
    };

    let data = &mut m.parent;
    let current = data.epoch.value();
    let next = current.next();
    if !data.epoch.pass(match_epoch.unwrap_or(current), next) {
        let requested = match_epoch.unwrap_or(Epoch::ZERO);
        log::warn!(
            target: LOG_TARGET,
            "stepper: policy change to {} rejected, epoch {requested} < {current}",
            request.policy()
        );
        let _ = reply.send(Err(ClockError::PolicyTooLate { requested, current }));
        return false;
    }

    data.measured_delay = request.measured_delay();
    data.deferred.push(Deferred::Status(reply));
    ctx.trace(format_args!("policy -> {} (epoch {next})", request.policy()));
    true
}

fn step(_ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::Step { reply } = msg else {
        return false;
    };
    let data = &mut m.parent;
    data.latest = data.latest.next();
    data.check_for_expiry();
    let _ = reply.send(Ok(data.status()));
    true
}

fn step_not_ready(_ctx: &Context, _m: &mut StepperMachine, msg: StepperMessage) -> bool {
    msg.fail(ClockError::NotReady);
    false
}

fn delay(_ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::Delay {
        at_least, reply, ..
    } = msg
    else {
        return false;
    };
    let data = &mut m.parent;
    data.add_waiter(at_least, reply);
    data.check_for_expiry();
    true
}

fn delay_no_wait(_ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::Delay {
        at_least, reply, ..
    } = msg
    else {
        return false;
    };
    let data = &mut m.parent;
    data.add_waiter(at_least, reply);
    data.jump_to_waiters();
    true
}

fn reset(ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::Reset { reply } = msg else {
        return false;
    };
    let data = &mut m.parent;
    data.latest = simtime_core::Tick::ZERO;
    let epoch = data.bump_epoch();
    data.measured_delay = std::time::Duration::ZERO;
    data.deferred.push(Deferred::Empty(reply));
    ctx.trace(format_args!("reset (epoch {epoch})"));
    true
}

fn get_status(_ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::GetStatus { reply } = msg else {
        return false;
    };
    let _ = reply.send(Ok(m.parent.status()));
    true
}

/// Advance one tick if the ticker that sent this still belongs to the
/// current epoch.
fn auto_step(ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) -> bool {
    let StepperMessage::AutoStep { guard } = msg else {
        return false;
    };
    let data = &mut m.parent;
    if guard != data.epoch.value() {
        ctx.trace(format_args!(
            "stale auto-step from epoch {guard} dropped (current {})",
            data.epoch.value()
        ));
        return true;
    }
    data.latest = data.latest.next();
    data.check_for_expiry();
    true
}

fn drop_auto_step(ctx: &Context, _m: &mut StepperMachine, msg: StepperMessage) -> bool {
    ctx.trace(format_args!("{:?} ignored outside measured", msg.tag()));
    true
}

// ── Fallbacks ───────────────────────────────────────────────────

fn reject_unexpected(_ctx: &Context, m: &mut StepperMachine, msg: StepperMessage) {
    log::error!(
        target: LOG_TARGET,
        "stepper: unexpected {:?} in state '{}'",
        msg.tag(),
        m.current_name()
    );
    let reason = format!("{:?} not accepted in state '{}'", msg.tag(), m.current_name());
    msg.fail(ClockError::InvalidMessage { reason });
}

fn reject_not_ready(_ctx: &Context, _m: &mut StepperMachine, msg: StepperMessage) {
    msg.fail(ClockError::NotReady);
}

fn reject_faulted(_ctx: &Context, _m: &mut StepperMachine, msg: StepperMessage) {
    msg.fail(ClockError::Faulted);
}
