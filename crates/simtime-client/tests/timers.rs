//! Timers against a live in-process Stepper.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use simtime_client::{Timers, TimersConfig};
use simtime_core::{ClockError, Context, Policy, Tick};
use simtime_stepper::{LocalConnector, Stepper, StepperConfig};
use simtime_test_utils::{
    assert_silent, eventually, init_logging, recv_soon, FailingConnector, FlakyConnector,
};

type Fired = (Option<Tick>, u64, &'static str);

fn fast() -> TimersConfig {
    TimersConfig {
        retry_step: Duration::from_millis(1),
        ..TimersConfig::default()
    }
}

fn manual() -> Stepper {
    init_logging();
    Stepper::start(StepperConfig::with_policy(Policy::Manual)).unwrap()
}

fn report(tx: Sender<Fired>) -> impl FnOnce(&Context, u64, &'static str) + Send + 'static {
    move |ctx: &Context, id: u64, msg: &'static str| {
        let _ = tx.send((ctx.tick(), id, msg));
    }
}

#[test]
fn fires_after_delay_with_fire_tick_in_context() {
    let stepper = manual();
    let timers = Timers::new(Arc::new(LocalConnector::new(stepper.clone())), fast()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let at = Context::new().with_tick(Tick(0));
    let id = timers.timer(&at, 2, "wake", report(tx)).unwrap();
    stepper.step(&at).unwrap();
    assert_silent(&rx, Duration::from_millis(30));
    stepper.step(&at).unwrap();

    assert_eq!(recv_soon(&rx), (Some(Tick(2)), id, "wake"));
    assert!(eventually(|| timers.pending() == 0));
}

#[test]
fn canceled_timer_never_fires() {
    let stepper = manual();
    let timers = Timers::new(Arc::new(LocalConnector::new(stepper.clone())), fast()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let at = Context::new().with_tick(Tick(0));
    let keep = timers.timer(&at, 1, "keep", report(tx.clone())).unwrap();
    let gone = timers.timer(&at, 1, "gone", report(tx)).unwrap();
    timers.cancel(gone).unwrap();
    assert_eq!(timers.cancel(gone), Err(ClockError::TimerNotFound { id: gone }));

    stepper.step(&at).unwrap();
    assert_eq!(recv_soon(&rx), (Some(Tick(1)), keep, "keep"));
    assert_silent(&rx, Duration::from_millis(30));
}

#[test]
fn timer_already_due_fires_without_a_step() {
    let stepper = manual();
    let timers = Timers::new(Arc::new(LocalConnector::new(stepper.clone())), fast()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let at = Context::new().with_tick(Tick(0));
    let later = timers.timer(&at, 5, "later", report(tx.clone())).unwrap();
    // Let the worker see tick 0 and park waiting for tick 1.
    std::thread::sleep(Duration::from_millis(50));

    let now = timers.timer(&at, 0, "now", report(tx)).unwrap();
    assert_eq!(recv_soon(&rx), (Some(Tick(0)), now, "now"));
    assert_eq!(timers.pending(), 1);

    timers.cancel(later).unwrap();
    assert_silent(&rx, Duration::from_millis(30));
}

#[test]
fn worker_restarts_after_going_idle() {
    let stepper = Stepper::start(StepperConfig::with_policy(Policy::NoWait)).unwrap();
    let timers = Timers::new(Arc::new(LocalConnector::new(stepper.clone())), fast()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let first = timers
        .timer(&Context::new().with_tick(Tick(0)), 3, "first", report(tx.clone()))
        .unwrap();
    let (tick, id, _) = recv_soon(&rx);
    assert_eq!(id, first);
    assert!(tick >= Some(Tick(3)));
    assert!(eventually(|| timers.pending() == 0));

    let now = stepper.get_status(&Context::new()).unwrap().now;
    let second = timers
        .timer(&Context::new().with_tick(now), 2, "second", report(tx))
        .unwrap();
    let (tick, id, msg) = recv_soon(&rx);
    assert_eq!((id, msg), (second, "second"));
    assert!(tick >= Some(now.after(2)));
}

#[test]
fn reconnects_after_transport_failures() {
    let stepper = manual();
    let flaky = FlakyConnector::new(LocalConnector::new(stepper.clone()), 3);
    let timers = Timers::new(Arc::new(flaky), fast()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let at = Context::new().with_tick(Tick(0));
    timers.timer(&at, 1, "late", report(tx)).unwrap();
    stepper.step(&at).unwrap();
    assert_eq!(recv_soon(&rx).2, "late");
}

#[test]
fn reconnects_back_off() {
    init_logging();
    let failing = Arc::new(FailingConnector::new());
    let cfg = TimersConfig {
        retry_step: Duration::from_millis(20),
        max_retry_factor: 5,
    };
    let timers: Timers<()> = Timers::new(failing.clone(), cfg).unwrap();
    timers
        .timer(&Context::new().with_tick(Tick(0)), 1, (), |_, _, _| {})
        .unwrap();

    // Sleeps of 20, 40, 60, 80ms: a handful of attempts, not a spin.
    std::thread::sleep(Duration::from_millis(150));
    let attempts = failing.attempts();
    assert!((1..=6).contains(&attempts), "attempts = {attempts}");
    timers.stop();
}
