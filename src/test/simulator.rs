use crate::sim::{Event, SimTime, Simulator, World};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<u32>>>;

#[derive(Default)]
struct Recorder {
    ticks: usize,
    torn_down_at: Option<SimTime>,
}

impl World for Recorder {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn on_tick(&mut self, _sim: &mut Simulator) {
        self.ticks += 1;
    }

    fn on_teardown(&mut self, sim: &Simulator) {
        self.torn_down_at = Some(sim.now());
    }
}

struct Mark {
    id: u32,
    log: Log,
}

impl Event for Mark {
    fn execute(self: Box<Self>, _sim: &mut Simulator, _world: &mut dyn World) {
        self.log.borrow_mut().push(self.id);
    }
}

/// Re-arms itself every `period` until `remaining` hits zero.
struct Periodic {
    remaining: u32,
    period: SimTime,
    log: Log,
}

impl Event for Periodic {
    fn execute(self: Box<Self>, sim: &mut Simulator, _world: &mut dyn World) {
        let Periodic {
            remaining,
            period,
            log,
        } = *self;
        log.borrow_mut().push(remaining);
        if remaining > 1 {
            sim.schedule_in(
                period,
                Periodic {
                    remaining: remaining - 1,
                    period,
                    log,
                },
            );
        }
    }
}

fn mark(sim: &mut Simulator, at: u64, id: u32, log: &Log) {
    sim.schedule(
        SimTime(at),
        Mark {
            id,
            log: Rc::clone(log),
        },
    );
}

#[test]
fn equal_times_fire_in_insertion_order() {
    let log = Log::default();
    let mut sim = Simulator::default();
    mark(&mut sim, 10, 1, &log);
    mark(&mut sim, 5, 2, &log);
    mark(&mut sim, 10, 3, &log);
    mark(&mut sim, 5, 4, &log);

    let mut world = Recorder::default();
    sim.run(&mut world);

    assert_eq!(*log.borrow(), [2, 4, 1, 3]);
    assert_eq!(world.ticks, 4);
    assert_eq!(sim.executed(), 4);
    assert_eq!(sim.now(), SimTime(10));
}

#[test]
fn events_in_the_past_fire_now() {
    let log = Log::default();
    let mut sim = Simulator::default();
    let mut world = Recorder::default();
    sim.run_until(SimTime(100), &mut world);

    mark(&mut sim, 20, 7, &log);
    sim.run(&mut world);
    assert_eq!(*log.borrow(), [7]);
    assert_eq!(sim.now(), SimTime(100));
}

#[test]
fn run_until_includes_the_horizon_and_parks_the_clock_there() {
    let log = Log::default();
    let mut sim = Simulator::default();
    sim.schedule(
        SimTime::from_secs(1),
        Periodic {
            remaining: 10,
            period: SimTime::from_secs(1),
            log: Rc::clone(&log),
        },
    );

    let mut world = Recorder::default();
    sim.run_until(SimTime::from_secs(4), &mut world);
    assert_eq!(*log.borrow(), [10, 9, 8, 7]);
    assert_eq!(sim.now(), SimTime::from_secs(4));
    assert_eq!(sim.pending(), 1);

    sim.run_until(SimTime::from_millis(4_500), &mut world);
    assert_eq!(log.borrow().len(), 4);
    assert_eq!(sim.now(), SimTime::from_millis(4_500));
}

#[test]
fn teardown_discards_pending_events_and_notifies_world() {
    let log = Log::default();
    let mut sim = Simulator::default();
    mark(&mut sim, 1, 1, &log);
    mark(&mut sim, 50, 2, &log);
    mark(&mut sim, 60, 3, &log);

    let mut world = Recorder::default();
    sim.run_until(SimTime(10), &mut world);
    let dropped = sim.teardown(&mut world);

    assert_eq!(dropped, 2);
    assert_eq!(sim.pending(), 0);
    assert_eq!(world.torn_down_at, Some(SimTime(10)));

    sim.run(&mut world);
    assert_eq!(*log.borrow(), [1]);
}

#[test]
fn fractional_seconds_round_to_nanoseconds() {
    assert_eq!(SimTime::from_secs_f64(1.5), SimTime(1_500_000_000));
    assert_eq!(SimTime::from_secs_f64(0.0012), SimTime(1_200_000));
    assert_eq!(SimTime::from_secs_f64(-3.0), SimTime::ZERO);
    assert_eq!(SimTime::from_secs_f64(f64::NAN), SimTime::ZERO);
    assert_eq!(SimTime::from_millis(2).to_string(), "+0.002000s");
}
