//! The simulation run context.
//!
//! A [`Simulation`] bundles everything one run needs: the executor, the
//! clock manager, the hardware model and an optional trace recorder. A step
//! is always the same sequence:
//!
//! 1. advance the clocks to the next event, resuming edge waiters,
//! 2. let the model settle with [`Evaluator::evaluate`],
//! 3. hand the new time to the recorder.
//!
//! Nothing is global: two `Simulation`s in one process are fully isolated.

use serde::{Deserialize, Serialize};
use tempo_common::TimeValue;

use crate::clock::ClockHandle;
use crate::error::SimError;
use crate::manager::ClockManager;
use crate::model::Evaluator;
use crate::signal::Driver;
use crate::task::{Executor, Task};
use crate::trace::TraceRecorder;

/// Settings of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Resolution window for clock countdowns.
    pub precision: TimeValue,
    /// Stop with [`SimError::TimeLimitExceeded`] rather than step past this time.
    pub time_limit: Option<TimeValue>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            precision: TimeValue::from_picos(1.0),
            time_limit: None,
        }
    }
}

/// Per-clock statistics in a [`SimSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockSummary {
    /// Clock name.
    pub name: String,
    /// Full cycle duration.
    pub period: TimeValue,
    /// Number of toggles.
    pub toggles: u64,
}

/// What a finished run looked like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimSummary {
    /// Global time at the end of the run.
    pub final_time: TimeValue,
    /// Number of steps taken.
    pub steps: u64,
    /// Clocks in registration order.
    pub clocks: Vec<ClockSummary>,
    /// Tasks still suspended when the run ended.
    pub live_tasks: usize,
}

/// One simulation run over a hardware model `E`.
pub struct Simulation<E: Evaluator> {
    executor: Executor,
    clocks: ClockManager,
    model: E,
    recorder: Option<Box<dyn TraceRecorder>>,
    last_timestamp: Option<u64>,
    config: SimConfig,
    steps: u64,
    settled: bool,
}

impl<E: Evaluator> Simulation<E> {
    /// Creates a run over `model` with no clocks and no tasks.
    pub fn new(model: E, config: SimConfig) -> Result<Self, SimError> {
        let executor = Executor::new();
        let clocks = ClockManager::new(config.precision, executor.clone())?;
        Ok(Self {
            executor,
            clocks,
            model,
            recorder: None,
            last_timestamp: None,
            config,
            steps: 0,
            settled: false,
        })
    }

    /// Registers a clock with a 50/50 duty cycle.
    pub fn add_clock(
        &mut self,
        driver: Driver<bool>,
        period: TimeValue,
    ) -> Result<ClockHandle, SimError> {
        self.clocks.add_symmetric(driver, period)
    }

    /// Registers a clock with explicit low and high phase durations.
    pub fn add_clock_phases(
        &mut self,
        driver: Driver<bool>,
        low: TimeValue,
        high: TimeValue,
    ) -> Result<ClockHandle, SimError> {
        self.clocks.add(driver, low, high)
    }

    /// Spawns a task on this run's executor.
    pub fn spawn<T, F>(&self, name: impl Into<String>, future: F) -> Task<T>
    where
        T: 'static,
        F: std::future::Future<Output = T> + 'static,
    {
        self.executor.spawn(name, future)
    }

    /// Returns the executor, for tasks that spawn sub-tasks.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Installs a trace recorder, replacing any previous one.
    pub fn set_recorder<R: TraceRecorder + 'static>(&mut self, recorder: R) {
        self.recorder = Some(Box::new(recorder));
        self.last_timestamp = None;
    }

    /// Advances to the next clock event and lets the model settle.
    ///
    /// The first step also evaluates the model once at time zero so the
    /// recorder sees the initial state.
    pub fn step(&mut self) -> Result<TimeValue, SimError> {
        self.settle()?;

        if let (Some(limit), Some(next)) = (self.config.time_limit, self.clocks.next_event()) {
            if self.clocks.time() + next > limit + self.clocks.precision() * 0.5 {
                return Err(SimError::TimeLimitExceeded { limit });
            }
        }

        let now = self.clocks.tick()?;
        self.model.evaluate();
        self.record()?;
        self.steps += 1;
        Ok(now)
    }

    /// Steps until `task` completes.
    pub fn run_until_done<T: 'static>(&mut self, task: &Task<T>) -> Result<TimeValue, SimError> {
        while !task.is_done() {
            self.step()?;
        }
        Ok(self.time())
    }

    /// Steps through every clock event up to `duration` from now.
    pub fn run_for(&mut self, duration: TimeValue) -> Result<TimeValue, SimError> {
        let end = self.time() + duration;
        let slack = self.clocks.precision() * 0.5;
        loop {
            let next = self.clocks.next_event().ok_or(SimError::NoClocks)?;
            if self.time() + next > end + slack {
                return Ok(self.time());
            }
            self.step()?;
        }
    }

    /// Global simulated time.
    pub fn time(&self) -> TimeValue {
        self.clocks.time()
    }

    /// Number of steps taken.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The clock manager.
    pub fn clocks(&self) -> &ClockManager {
        &self.clocks
    }

    /// The run settings.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The hardware model.
    pub fn model(&self) -> &E {
        &self.model
    }

    /// Mutable access to the hardware model.
    pub fn model_mut(&mut self) -> &mut E {
        &mut self.model
    }

    /// Flushes the recorder and summarizes the run.
    pub fn finish(mut self) -> Result<SimSummary, SimError> {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.finalize()?;
        }
        let summary = SimSummary {
            final_time: self.time(),
            steps: self.steps,
            clocks: self
                .clocks
                .iter()
                .map(|c| ClockSummary {
                    name: c.name().to_string(),
                    period: c.period(),
                    toggles: c.toggles(),
                })
                .collect(),
            live_tasks: self.executor.live_tasks(),
        };
        tracing::info!(
            time = %summary.final_time,
            steps = summary.steps,
            live_tasks = summary.live_tasks,
            "simulation finished"
        );
        Ok(summary)
    }

    fn settle(&mut self) -> Result<(), SimError> {
        if !self.settled {
            self.settled = true;
            self.model.evaluate();
            self.record()?;
        }
        Ok(())
    }

    fn record(&mut self) -> Result<(), SimError> {
        let Some(recorder) = self.recorder.as_mut() else {
            return Ok(());
        };
        let time = self.clocks.time();
        let timestamp = time.to_units(recorder.precision());
        if self.last_timestamp == Some(timestamp) {
            return Err(SimError::TraceTimestampCollision { timestamp, time });
        }
        recorder.record(timestamp)?;
        self.last_timestamp = Some(timestamp);
        Ok(())
    }
}

impl<E: Evaluator> Drop for Simulation<E> {
    fn drop(&mut self) {
        self.executor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::model::FnEvaluator;
    use crate::signal::signal;
    use crate::trace::{TraceSink, VcdRecorder};
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::rc::Rc;

    fn ns(v: f64) -> TimeValue {
        TimeValue::from_nanos(v)
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl TraceSink for SharedBuf {}

    #[test]
    fn evaluates_once_per_step_plus_initial() {
        let evals = Rc::new(Cell::new(0));
        let e = Rc::clone(&evals);
        let mut sim = Simulation::new(
            FnEvaluator(move || e.set(e.get() + 1)),
            SimConfig::default(),
        )
        .unwrap();
        let (drv, _) = signal("clk", false);
        sim.add_clock(drv, ns(10.0)).unwrap();

        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(evals.get(), 3);
        assert_eq!(sim.steps(), 2);
        assert!(sim.time().approx_eq(ns(10.0), TimeValue::from_femtos(1.0)));
    }

    #[test]
    fn step_without_clocks_fails() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        assert!(matches!(sim.step(), Err(SimError::NoClocks)));
        assert!(matches!(sim.run_for(ns(5.0)), Err(SimError::NoClocks)));
    }

    #[test]
    fn run_until_done_follows_edges() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("clk", false);
        let clk = sim.add_clock(drv, ns(10.0)).unwrap();

        let c = clk.clone();
        let task = sim.spawn("wait3", async move { c.rising_edges(3).await });
        let end = sim.run_until_done(&task).unwrap();
        assert!(end.approx_eq(ns(25.0), TimeValue::from_femtos(1.0)));
        assert_eq!(clk.pending_waiters(Edge::Rising), 0);
    }

    #[test]
    fn run_for_stops_at_last_event_in_window() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("clk", false);
        let clk = sim.add_clock(drv, ns(10.0)).unwrap();
        let t = sim.run_for(ns(32.0)).unwrap();
        assert!(t.approx_eq(ns(30.0), TimeValue::from_femtos(1.0)));
        assert_eq!(clk.toggles(), 6);
    }

    #[test]
    fn time_limit_is_enforced() {
        let config = SimConfig {
            time_limit: Some(ns(20.0)),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new((), config).unwrap();
        let (drv, _) = signal("clk", false);
        let clk = sim.add_clock(drv, ns(10.0)).unwrap();
        let c = clk.clone();
        let task = sim.spawn("forever", async move {
            loop {
                c.rising_edge().await;
            }
        });
        let err = sim.run_until_done(&task).unwrap_err();
        assert!(matches!(err, SimError::TimeLimitExceeded { .. }));
        assert!(sim.time().approx_eq(ns(20.0), TimeValue::from_femtos(1.0)));
    }

    #[test]
    fn recorder_sees_initial_state_and_changes() {
        let buf = SharedBuf::default();
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("clk", false);
        let clk = sim.add_clock(drv, ns(10.0)).unwrap();
        let mut rec = VcdRecorder::new(buf.clone(), TimeValue::from_picos(1.0)).unwrap();
        rec.add_probe("tb", clk.signal()).unwrap();
        sim.set_recorder(rec);

        sim.step().unwrap();
        sim.step().unwrap();
        sim.finish().unwrap();

        let out = String::from_utf8(buf.0.borrow().clone()).unwrap();
        assert!(out.contains("#0\n$dumpvars\n0!\n$end"));
        assert!(out.contains("#5000\n1!"));
        assert!(out.contains("#10000\n0!"));
    }

    #[test]
    fn coarse_recorder_precision_collides() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("fast", false);
        sim.add_clock(drv, ns(0.6)).unwrap();
        let rec = VcdRecorder::new(Vec::new(), ns(1.0)).unwrap();
        sim.set_recorder(rec);

        // The first toggle at 0.3 ns rounds to the same 1 ns timestamp as time zero.
        let err = sim.step().unwrap_err();
        assert!(matches!(err, SimError::TraceTimestampCollision { timestamp: 0, .. }));
    }

    #[test]
    fn summary_reports_clocks_and_tasks() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("pclk", false);
        let clk = sim.add_clock(drv, ns(10.0)).unwrap();
        let c = clk.clone();
        drop(sim.spawn("parked", async move { c.falling_edge().await }));
        sim.run_for(ns(10.0)).unwrap();

        let summary = sim.finish().unwrap();
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.clocks[0].name, "pclk");
        assert_eq!(summary.clocks[0].toggles, 2);
        assert_eq!(summary.live_tasks, 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["clocks"][0]["toggles"], 2);
    }

    #[test]
    fn runs_are_isolated() {
        let mut a = Simulation::new((), SimConfig::default()).unwrap();
        let mut b = Simulation::new((), SimConfig::default()).unwrap();
        let (da, _) = signal("a", false);
        let (db, _) = signal("b", false);
        a.add_clock(da, ns(10.0)).unwrap();
        b.add_clock(db, ns(4.0)).unwrap();
        a.step().unwrap();
        assert_eq!(b.time(), TimeValue::ZERO);
        assert_eq!(b.executor().live_tasks(), 0);
    }
}
