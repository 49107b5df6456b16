//! Passive APB protocol monitor.
//!
//! The monitor is an ordinary task. It samples every line of the bus on each
//! falling edge of the bus clock, when all lines are stable between the
//! rising edges that move them, reconstructs completed transfers and flags
//! sequences the protocol does not allow.
//!
//! Line changes made before the first sample may already have moved a
//! transfer from setup into its access phase. The first sample therefore
//! accepts an access phase without having seen its setup.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tempo_sim::{ClockHandle, Executor, SignalValue, Task};

use crate::apb::ApbView;
use crate::bus::Direction;

/// A transfer as seen on the wires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObservedTransfer {
    /// Falling-edge index at which the transfer completed.
    pub cycle: u64,
    /// Byte address.
    pub address: u32,
    /// Direction.
    pub direction: Direction,
    /// Write data or read data, zero-extended.
    pub data: u64,
    /// Sampled cycles with `pready` low.
    pub wait_states: u32,
    /// Whether `pslverr` accompanied `pready`.
    pub error: bool,
}

/// A sequence of line states the APB protocol forbids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolViolation {
    /// `penable` high while `psel` is low.
    EnableWithoutSelect {
        /// Falling-edge index.
        cycle: u64,
    },
    /// An access phase that did not follow a setup phase.
    AccessWithoutSetup {
        /// Falling-edge index.
        cycle: u64,
        /// Address on the bus.
        address: u32,
    },
    /// Address or direction changed while waiting for `pready`.
    ChangedDuringAccess {
        /// Falling-edge index.
        cycle: u64,
        /// Address at the start of the access.
        address: u32,
    },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::EnableWithoutSelect { cycle } => {
                write!(f, "cycle {cycle}: penable asserted without psel")
            }
            ProtocolViolation::AccessWithoutSetup { cycle, address } => {
                write!(
                    f,
                    "cycle {cycle}: access to {address:#x} without setup phase"
                )
            }
            ProtocolViolation::ChangedDuringAccess { cycle, address } => {
                write!(
                    f,
                    "cycle {cycle}: control changed during access to {address:#x}"
                )
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Nothing sampled yet.
    Unobserved,
    Idle,
    Setup { address: u32, write: bool },
    Access { address: u32, write: bool, waits: u32 },
    Completed,
}

#[derive(Debug, Default)]
struct MonitorLog {
    transfers: Vec<ObservedTransfer>,
    violations: Vec<ProtocolViolation>,
}

struct Sampler<W: SignalValue> {
    view: ApbView<W>,
    phase: Phase,
    cycle: u64,
    log: Rc<RefCell<MonitorLog>>,
}

impl<W: SignalValue> Sampler<W> {
    fn sample(&mut self) {
        let v = &self.view;
        let (psel, penable) = (v.psel.get(), v.penable.get());
        let address = v.paddr.get();
        let write = v.pwrite.get();

        self.phase = match (psel, penable, self.phase) {
            (false, false, _) => Phase::Idle,
            (false, true, _) => {
                self.violation(ProtocolViolation::EnableWithoutSelect {
                    cycle: self.cycle,
                });
                Phase::Idle
            }
            (true, false, _) => Phase::Setup { address, write },
            (true, true, Phase::Setup { address: a, write: w }) => self.access(a, w, 0),
            (true, true, Phase::Unobserved) => self.access(address, write, 0),
            (true, true, Phase::Access { address: a, write: w, waits }) => {
                if a != address || w != write {
                    self.violation(ProtocolViolation::ChangedDuringAccess {
                        cycle: self.cycle,
                        address: a,
                    });
                }
                self.access(address, write, waits)
            }
            (true, true, Phase::Idle | Phase::Completed) => {
                self.violation(ProtocolViolation::AccessWithoutSetup {
                    cycle: self.cycle,
                    address,
                });
                self.access(address, write, 0)
            }
        };
    }

    fn access(&mut self, address: u32, write: bool, waits: u32) -> Phase {
        let v = &self.view;
        if !v.pready.get() {
            return Phase::Access {
                address,
                write,
                waits: waits + 1,
            };
        }
        let (direction, data) = if write {
            (Direction::Write, v.pwdata.get().to_bits())
        } else {
            (Direction::Read, v.prdata.get().to_bits())
        };
        let transfer = ObservedTransfer {
            cycle: self.cycle,
            address,
            direction,
            data,
            wait_states: waits,
            error: v.pslverr.get(),
        };
        tracing::trace!(?transfer, "monitor observed transfer");
        self.log.borrow_mut().transfers.push(transfer);
        Phase::Completed
    }

    fn violation(&self, violation: ProtocolViolation) {
        tracing::warn!(%violation, "APB protocol violation");
        self.log.borrow_mut().violations.push(violation);
    }
}

/// Handle to a running APB monitor task.
pub struct ApbMonitor {
    log: Rc<RefCell<MonitorLog>>,
    task: Task<()>,
}

impl ApbMonitor {
    /// Spawns a monitor watching `view` on the falling edges of `clock`.
    ///
    /// A setup phase already on the lines is taken as seen. Otherwise the
    /// first falling-edge sample may open with an access phase whose setup
    /// happened before it, e.g. a transfer started at time zero.
    pub fn spawn<W: SignalValue>(
        executor: &Executor,
        clock: ClockHandle,
        view: ApbView<W>,
    ) -> Self {
        let log = Rc::new(RefCell::new(MonitorLog::default()));
        let initial = match (view.psel.get(), view.penable.get()) {
            (true, false) => Phase::Setup {
                address: view.paddr.get(),
                write: view.pwrite.get(),
            },
            _ => Phase::Unobserved,
        };
        let mut sampler = Sampler {
            view,
            phase: initial,
            cycle: 0,
            log: Rc::clone(&log),
        };
        let name = format!("apb-monitor@{}", clock.name());
        let task = executor.spawn(name, async move {
            loop {
                clock.falling_edge().await;
                sampler.cycle += 1;
                sampler.sample();
            }
        });
        Self { log, task }
    }

    /// Transfers observed so far.
    pub fn transfers(&self) -> Vec<ObservedTransfer> {
        self.log.borrow().transfers.clone()
    }

    /// Violations observed so far.
    pub fn violations(&self) -> Vec<ProtocolViolation> {
        self.log.borrow().violations.clone()
    }

    /// Stops the monitor task.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl fmt::Debug for ApbMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let log = self.log.borrow();
        f.debug_struct("ApbMonitor")
            .field("task", &self.task)
            .field("transfers", &log.transfers.len())
            .field("violations", &log.violations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::apb::{apb_interface, ApbRequester};
    use crate::bus::Bus;
    use crate::completer::{ApbMemory, MemoryConfig};
    use tempo_sim::{signal, SimConfig, Simulation, TimeValue};

    #[test]
    fn transfer_started_at_time_zero_is_clean() {
        let (drv, pclk) = signal("pclk", false);
        let bus = apb_interface::<u8>();
        let memory = ApbMemory::new(pclk, bus.completer, MemoryConfig::default());
        let mut sim = Simulation::new(memory, SimConfig::default()).unwrap();
        let clk = sim.add_clock(drv, TimeValue::from_nanos(10.0)).unwrap();
        let monitor = ApbMonitor::spawn(sim.executor(), clk.clone(), bus.view.clone());
        let requester = Rc::new(ApbRequester::new("apb0", clk.clone(), bus.requester));

        let r = Rc::clone(&requester);
        let c = clk.clone();
        let task = sim.spawn("write", async move {
            let response = r.write(0x07, 0xA5).await;
            c.falling_edge().await;
            response
        });
        sim.run_until_done(&task).unwrap();

        assert!(monitor.violations().is_empty());
        let seen = monitor.transfers();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].address, 0x07);
        assert_eq!(seen[0].direction, Direction::Write);
        assert_eq!(seen[0].data, 0xA5);
        monitor.stop();
    }

    #[test]
    fn only_the_first_sample_excuses_a_missing_setup() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("pclk", false);
        let clk = sim.add_clock(drv, TimeValue::from_nanos(10.0)).unwrap();
        let bus = apb_interface::<u8>();
        let monitor = ApbMonitor::spawn(sim.executor(), clk.clone(), bus.view.clone());

        let pins = bus.requester;
        let c = clk.clone();
        let rogue = sim.spawn("rogue", async move {
            pins.psel.set(true);
            pins.penable.set(true);
            c.rising_edge().await;
            c.rising_edge().await;
            pins.psel.set(false);
            pins.penable.set(false);
            c.rising_edge().await;
            pins.psel.set(true);
            pins.penable.set(true);
            c.rising_edge().await;
        });
        bus.completer.pready.set(true);
        sim.run_until_done(&rogue).unwrap();

        let violations = monitor.violations();
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0],
            ProtocolViolation::AccessWithoutSetup { cycle: 3, .. }
        ));
        monitor.stop();
    }

    #[test]
    fn flags_enable_without_select_and_missing_setup() {
        let mut sim = Simulation::new((), SimConfig::default()).unwrap();
        let (drv, _) = signal("pclk", false);
        let clk = sim.add_clock(drv, TimeValue::from_nanos(10.0)).unwrap();
        let bus = apb_interface::<u8>();
        let monitor = ApbMonitor::spawn(sim.executor(), clk.clone(), bus.view.clone());

        let pins = bus.requester;
        let c = clk.clone();
        let rogue = sim.spawn("rogue", async move {
            pins.penable.set(true);
            c.rising_edge().await;
            c.rising_edge().await;
            pins.psel.set(true);
            c.rising_edge().await;
        });
        bus.completer.pready.set(true);
        sim.run_until_done(&rogue).unwrap();

        let violations = monitor.violations();
        assert_eq!(
            violations[0],
            ProtocolViolation::EnableWithoutSelect { cycle: 1 }
        );
        assert!(matches!(
            violations[1],
            ProtocolViolation::AccessWithoutSetup { cycle: 2, .. }
        ));
        monitor.stop();
    }

    #[test]
    fn violation_display() {
        let v = ProtocolViolation::ChangedDuringAccess {
            cycle: 3,
            address: 0x40,
        };
        assert_eq!(
            v.to_string(),
            "cycle 3: control changed during access to 0x40"
        );
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["kind"], "changed_during_access");
    }
}
