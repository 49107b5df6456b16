//! Clock generators driven by the clock manager.
//!
//! A [`Clock`] owns the driver of a one-bit signal and a countdown to its
//! next toggle. It is advanced only by the [`crate::ClockManager`], which
//! always passes an elapsed time no larger than the clock's own countdown.
//! When the countdown falls inside the precision window the clock toggles,
//! reloads the countdown with the new phase's duration and resumes every task
//! waiting on the edge it just produced.
//!
//! Testbench code never sees the `Clock` itself; it gets a [`ClockHandle`],
//! a cheap cloneable handle for reading the clock level and waiting on its
//! edges.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tempo_common::TimeValue;

use crate::edge::{Edge, EdgeWait, EdgeWaitRegistry};
use crate::error::SimError;
use crate::signal::{Driver, Signal};
use crate::task::Executor;

/// Index of a clock in registration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ClockId(u32);

impl ClockId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock#{}", self.0)
    }
}

struct ClockShared {
    id: ClockId,
    name: String,
    pin: Signal<bool>,
    waits: EdgeWaitRegistry,
    toggles: Cell<u64>,
}

/// Read and wait access to a registered clock.
#[derive(Clone)]
pub struct ClockHandle {
    shared: Rc<ClockShared>,
}

impl ClockHandle {
    /// Returns the clock id.
    pub fn id(&self) -> ClockId {
        self.shared.id
    }

    /// Returns the clock name (the name of its signal).
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the current level of the clock signal.
    pub fn is_high(&self) -> bool {
        self.shared.pin.get()
    }

    /// Returns a read handle to the clock signal.
    pub fn signal(&self) -> Signal<bool> {
        self.shared.pin.clone()
    }

    /// Returns how many times the clock has toggled.
    pub fn toggles(&self) -> u64 {
        self.shared.toggles.get()
    }

    /// Waits for the next rising edge.
    pub fn rising_edge(&self) -> EdgeWait {
        self.edge(Edge::Rising)
    }

    /// Waits for the next falling edge.
    pub fn falling_edge(&self) -> EdgeWait {
        self.edge(Edge::Falling)
    }

    /// Waits for the next edge in the given direction.
    pub fn edge(&self, edge: Edge) -> EdgeWait {
        EdgeWait::new(self.clone(), edge)
    }

    /// Waits for `count` consecutive rising edges.
    pub async fn rising_edges(&self, count: usize) {
        for _ in 0..count {
            self.rising_edge().await;
        }
    }

    /// Returns the number of tasks currently waiting on `edge`.
    pub fn pending_waiters(&self, edge: Edge) -> usize {
        self.shared.waits.pending(edge)
    }

    pub(crate) fn waits(&self) -> &EdgeWaitRegistry {
        &self.shared.waits
    }
}

impl fmt::Debug for ClockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("high", &self.is_high())
            .finish()
    }
}

/// A free-running clock with independent low and high phase durations.
pub struct Clock {
    shared: Rc<ClockShared>,
    driver: Driver<bool>,
    low: TimeValue,
    high: TimeValue,
    remaining: TimeValue,
    precision: TimeValue,
    executor: Executor,
}

impl Clock {
    /// Creates a clock that starts low with a full low phase ahead of it.
    ///
    /// Both phases must be positive, finite and no shorter than `precision`.
    pub(crate) fn new(
        id: ClockId,
        driver: Driver<bool>,
        precision: TimeValue,
        low: TimeValue,
        high: TimeValue,
        executor: Executor,
    ) -> Result<Self, SimError> {
        let name = driver.name().to_string();
        if !low.is_positive() || !high.is_positive() {
            return Err(SimError::InvalidPeriod {
                clock: name,
                low,
                high,
            });
        }
        for phase in [low, high] {
            if phase < precision {
                return Err(SimError::PeriodBelowPrecision {
                    clock: name,
                    phase,
                    precision,
                });
            }
        }

        driver.set(false);
        let shared = Rc::new(ClockShared {
            id,
            name,
            pin: driver.reader(),
            waits: EdgeWaitRegistry::default(),
            toggles: Cell::new(0),
        });
        Ok(Self {
            shared,
            driver,
            low,
            high,
            remaining: low,
            precision,
            executor,
        })
    }

    /// Returns a handle for reading the clock and waiting on its edges.
    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Returns the clock id.
    pub fn id(&self) -> ClockId {
        self.shared.id
    }

    /// Returns the clock name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the current level.
    pub fn is_high(&self) -> bool {
        self.driver.get()
    }

    /// Duration of the low phase.
    pub fn low_period(&self) -> TimeValue {
        self.low
    }

    /// Duration of the high phase.
    pub fn high_period(&self) -> TimeValue {
        self.high
    }

    /// Full cycle duration.
    pub fn period(&self) -> TimeValue {
        self.low + self.high
    }

    /// Returns the number of toggles so far.
    pub fn toggles(&self) -> u64 {
        self.shared.toggles.get()
    }

    /// Time left until this clock's next toggle.
    pub fn time_to_next_event(&self) -> TimeValue {
        self.remaining
    }

    /// Moves the clock forward by `elapsed` and returns the new countdown.
    ///
    /// If the countdown lands within the precision window the clock toggles
    /// and every task waiting on the resulting edge is resumed before this
    /// returns. Advancing past the countdown would skip an edge and is
    /// rejected.
    pub fn advance(&mut self, elapsed: TimeValue) -> Result<TimeValue, SimError> {
        if elapsed > self.remaining {
            return Err(SimError::TimeOverrun {
                clock: self.shared.name.clone(),
                elapsed,
                remaining: self.remaining,
            });
        }

        self.remaining -= elapsed;
        if self.remaining < self.precision {
            self.toggle();
        }
        Ok(self.remaining)
    }

    fn toggle(&mut self) {
        let level = !self.driver.get();
        self.driver.set(level);
        self.remaining = if level { self.high } else { self.low };
        self.shared.toggles.set(self.shared.toggles.get() + 1);

        let edge = Edge::entering(level);
        let resumed = self.shared.waits.drain(edge, &self.executor);
        tracing::trace!(clock = %self.shared.name, %edge, resumed, "clock toggled");
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("name", &self.shared.name)
            .field("low", &self.low)
            .field("high", &self.high)
            .field("remaining", &self.remaining)
            .field("high_now", &self.is_high())
            .finish()
    }
}
