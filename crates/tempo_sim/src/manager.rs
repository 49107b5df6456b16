//! The clock manager: the single authority over simulated time.
//!
//! Every call to [`ClockManager::tick`] advances global time to the nearest
//! upcoming clock event and nowhere else. Between ticks nothing happens, so
//! the cost of a run is proportional to the number of clock edges rather
//! than to a fixed time resolution.

use tempo_common::TimeValue;

use crate::clock::{Clock, ClockHandle, ClockId};
use crate::error::SimError;
use crate::signal::Driver;
use crate::task::Executor;

/// Owns every clock of a simulation run and the global time.
#[derive(Debug)]
pub struct ClockManager {
    clocks: Vec<Clock>,
    time: TimeValue,
    precision: TimeValue,
    executor: Executor,
    ticks: u64,
}

impl ClockManager {
    /// Creates an empty manager.
    ///
    /// `precision` is the resolution window for deciding that a countdown has
    /// reached zero. It must be positive and finite.
    pub fn new(precision: TimeValue, executor: Executor) -> Result<Self, SimError> {
        if !precision.is_positive() {
            return Err(SimError::InvalidPrecision { precision });
        }
        Ok(Self {
            clocks: Vec::new(),
            time: TimeValue::ZERO,
            precision,
            executor,
            ticks: 0,
        })
    }

    /// Registers a clock with explicit low and high phase durations.
    ///
    /// The clock takes over `driver`, sets it low and will toggle for the
    /// first time after `low` has elapsed.
    pub fn add(
        &mut self,
        driver: Driver<bool>,
        low: TimeValue,
        high: TimeValue,
    ) -> Result<ClockHandle, SimError> {
        let id = ClockId::from_raw(self.clocks.len() as u32);
        let clock = Clock::new(id, driver, self.precision, low, high, self.executor.clone())?;
        tracing::debug!(
            clock = %clock.name(),
            %low,
            %high,
            "registered clock"
        );
        let handle = clock.handle();
        self.clocks.push(clock);
        Ok(handle)
    }

    /// Registers a clock with a 50/50 duty cycle.
    pub fn add_symmetric(
        &mut self,
        driver: Driver<bool>,
        period: TimeValue,
    ) -> Result<ClockHandle, SimError> {
        let half = period / 2.0;
        self.add(driver, half, half)
    }

    /// Advances time to the earliest pending clock event.
    ///
    /// Every clock is advanced by the same amount, in registration order.
    /// Clocks whose countdown reaches the precision window toggle and resume
    /// their edge waiters before the next clock is advanced. Returns the new
    /// global time.
    pub fn tick(&mut self) -> Result<TimeValue, SimError> {
        if let Some(id) = self.executor.current() {
            return Err(SimError::ReentrantTick {
                task: self
                    .executor
                    .task_name(id)
                    .unwrap_or_else(|| id.to_string()),
            });
        }
        let step = self.next_event().ok_or(SimError::NoClocks)?;

        for clock in &mut self.clocks {
            clock.advance(step)?;
        }
        self.time += step;
        self.ticks += 1;
        tracing::trace!(time = %self.time, %step, "tick");
        Ok(self.time)
    }

    /// Time until the next clock event, or `None` without clocks.
    pub fn next_event(&self) -> Option<TimeValue> {
        if self.clocks.is_empty() {
            return None;
        }
        Some(
            self.clocks
                .iter()
                .map(Clock::time_to_next_event)
                .fold(TimeValue::MAX, TimeValue::min),
        )
    }

    /// Global simulated time.
    pub fn time(&self) -> TimeValue {
        self.time
    }

    /// The precision window.
    pub fn precision(&self) -> TimeValue {
        self.precision
    }

    /// Number of ticks taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Looks up a clock by id.
    pub fn clock(&self, id: ClockId) -> Option<&Clock> {
        self.clocks.get(id.as_raw() as usize)
    }

    /// Looks up a clock by name.
    pub fn find(&self, name: &str) -> Option<ClockHandle> {
        self.clocks
            .iter()
            .find(|c| c.name() == name)
            .map(Clock::handle)
    }

    /// Iterates clocks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Clock> {
        self.clocks.iter()
    }

    /// Number of registered clocks.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns `true` if no clock is registered.
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::signal;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ns(v: f64) -> TimeValue {
        TimeValue::from_nanos(v)
    }

    fn manager() -> ClockManager {
        ClockManager::new(TimeValue::from_picos(1.0), Executor::new()).unwrap()
    }

    fn add(mgr: &mut ClockManager, name: &str, period_ns: f64) -> ClockHandle {
        let (drv, _) = signal(name, false);
        mgr.add_symmetric(drv, ns(period_ns)).unwrap()
    }

    #[test]
    fn rejects_bad_precision() {
        let err = ClockManager::new(TimeValue::ZERO, Executor::new()).unwrap_err();
        assert!(matches!(err, SimError::InvalidPrecision { .. }));
    }

    #[test]
    fn tick_without_clocks_fails() {
        let mut mgr = manager();
        assert!(matches!(mgr.tick(), Err(SimError::NoClocks)));
        assert_eq!(mgr.next_event(), None);
    }

    #[test]
    fn first_tick_stops_at_earliest_half_period() {
        let mut mgr = manager();
        let c10 = add(&mut mgr, "c10", 10.0);
        let c8 = add(&mut mgr, "c8", 8.0);
        let c9 = add(&mut mgr, "c9", 9.0);

        let t = mgr.tick().unwrap();
        assert!(t.approx_eq(ns(4.0), TimeValue::from_femtos(1.0)));
        assert!(c8.is_high());
        assert!(!c10.is_high());
        assert!(!c9.is_high());
    }

    #[test]
    fn three_clock_event_sequence() {
        let mut mgr = manager();
        let c10 = add(&mut mgr, "c10", 10.0);
        let c8 = add(&mut mgr, "c8", 8.0);
        let c75 = add(&mut mgr, "c7_5", 7.5);
        let tol = TimeValue::from_femtos(1.0);

        assert!(mgr.tick().unwrap().approx_eq(ns(3.75), tol));
        assert_eq!((c10.toggles(), c8.toggles(), c75.toggles()), (0, 0, 1));
        assert!(mgr.tick().unwrap().approx_eq(ns(4.0), tol));
        assert_eq!((c10.toggles(), c8.toggles(), c75.toggles()), (0, 1, 1));
        assert!(mgr.tick().unwrap().approx_eq(ns(5.0), tol));
        assert_eq!((c10.toggles(), c8.toggles(), c75.toggles()), (1, 1, 1));
        assert!(mgr.tick().unwrap().approx_eq(ns(7.5), tol));
        assert_eq!((c10.toggles(), c8.toggles(), c75.toggles()), (1, 1, 2));
    }

    #[test]
    fn commensurate_periods_never_drift_apart() {
        let mut mgr = manager();
        let slow = add(&mut mgr, "slow", 7.5);
        let fast = add(&mut mgr, "fast", 2.5);

        for _ in 0..10_000 {
            let (slow_before, fast_before) = (slow.toggles(), fast.toggles());
            mgr.tick().unwrap();
            if slow.toggles() != slow_before {
                assert_ne!(fast.toggles(), fast_before, "edges split at {}", mgr.time());
            }
        }
        let t = mgr.time().nanoseconds();
        assert_eq!(slow.toggles(), (t / 3.75).round() as u64);
        assert_eq!(fast.toggles(), (t / 1.25).round() as u64);
    }

    #[test]
    fn simultaneous_toggles_drain_in_registration_order() {
        let mut mgr = manager();
        let b = add(&mut mgr, "b", 10.0);
        let a = add(&mut mgr, "a", 10.0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let exec = mgr.executor.clone();

        for (handle, name) in [(a.clone(), "a"), (b.clone(), "b")] {
            let l = Rc::clone(&log);
            drop(exec.spawn(name, async move {
                handle.rising_edge().await;
                l.borrow_mut().push(name);
            }));
        }

        mgr.tick().unwrap();
        assert!(a.is_high() && b.is_high());
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn waiters_on_one_edge_resume_fifo() {
        let mut mgr = manager();
        let clk = add(&mut mgr, "clk", 10.0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let exec = mgr.executor.clone();

        for name in ["first", "second", "third"] {
            let (h, l) = (clk.clone(), Rc::clone(&log));
            drop(exec.spawn(name, async move {
                h.rising_edge().await;
                l.borrow_mut().push(name);
            }));
        }
        mgr.tick().unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn tick_from_inside_task_is_rejected() {
        let mgr = Rc::new(RefCell::new(manager()));
        add(&mut mgr.borrow_mut(), "clk", 10.0);
        let exec = mgr.borrow().executor.clone();

        let m = Rc::clone(&mgr);
        let mut task = exec.spawn("rogue", async move {
            match m.try_borrow_mut() {
                Ok(mut mgr) => mgr.tick().map(|_| ()),
                Err(_) => Ok(()),
            }
        });
        let result = task.take_result().unwrap().unwrap();
        assert!(matches!(result, Err(SimError::ReentrantTick { task }) if task == "rogue"));
    }

    #[test]
    fn lookup_by_id_and_name() {
        let mut mgr = manager();
        let a = add(&mut mgr, "a", 10.0);
        add(&mut mgr, "b", 20.0);
        assert_eq!(mgr.len(), 2);
        assert_eq!(mgr.clock(a.id()).unwrap().name(), "a");
        assert_eq!(mgr.find("b").unwrap().id().as_raw(), 1);
        assert!(mgr.find("c").is_none());
        let names: Vec<_> = mgr.iter().map(Clock::name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn random_clock_sets_never_skip_or_stretch_phases() {
        let mut rng = StdRng::seed_from_u64(0x7e3b0);
        let precision = TimeValue::from_femtos(1.0);

        for _ in 0..20 {
            let mut mgr = ClockManager::new(precision, Executor::new()).unwrap();
            let count = rng.gen_range(1..=6);
            let mut clocks = Vec::new();
            for i in 0..count {
                let (drv, _) = signal(format!("clk{i}"), false);
                let low = ns(rng.gen_range(0.5..20.0));
                let high = ns(rng.gen_range(0.5..20.0));
                let handle = mgr.add(drv, low, high).unwrap();
                clocks.push((handle, low, high, TimeValue::ZERO));
            }

            for _ in 0..500 {
                let before = mgr.time();
                let expected = mgr.next_event().unwrap();
                let levels: Vec<_> = clocks
                    .iter()
                    .map(|(h, ..)| (h.is_high(), h.toggles()))
                    .collect();

                let now = mgr.tick().unwrap();
                assert!((now - before).approx_eq(expected, precision));

                let mut any = false;
                for ((handle, low, high, last), (was_high, toggles)) in
                    clocks.iter_mut().zip(levels)
                {
                    if handle.toggles() == toggles {
                        continue;
                    }
                    any = true;
                    assert_eq!(handle.toggles(), toggles + 1, "toggled twice in one tick");
                    assert_ne!(handle.is_high(), was_high);
                    let phase = if was_high { *high } else { *low };
                    assert!(
                        (now - *last).approx_eq(phase, precision * 1.000001),
                        "{} phase lasted {} instead of {}",
                        handle.name(),
                        now - *last,
                        phase
                    );
                    *last = now;
                }
                assert!(any, "tick at {now} toggled no clock");
            }
        }
    }
}
