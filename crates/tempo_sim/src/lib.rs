//! Discrete-event clock time base and cooperative task engine.
//!
//! This crate drives cycle-based hardware models from testbench code written
//! as ordinary Rust `async` blocks. Simulated time only ever jumps to the next
//! clock edge; at each edge the tasks waiting on it are resumed one after
//! another, then the hardware model settles and a trace recorder samples it.
//!
//! # Architecture
//!
//! Clocks count down to their next toggle. The [`ClockManager`] advances
//! global time by the smallest countdown, so no edge is ever skipped, and
//! treats countdowns within the precision window as zero so that clocks with
//! commensurate periods stay aligned despite floating-point rounding. Each
//! clock keeps per-edge FIFO queues of suspended tasks, which the
//! single-threaded [`Executor`] resumes inline when the edge fires.
//!
//! # Usage
//!
//! ```ignore
//! use tempo_sim::{signal, SimConfig, Simulation, TimeValue};
//!
//! let mut sim = Simulation::new((), SimConfig::default())?;
//! let (drv, _) = signal("clk", false);
//! let clk = sim.add_clock(drv, TimeValue::from_nanos(10.0))?;
//! let task = sim.spawn("stimulus", async move { clk.rising_edges(4).await });
//! sim.run_until_done(&task)?;
//! println!("finished at {}", sim.time());
//! ```
//!
//! # Modules
//!
//! - `error`: Simulation error types
//! - `signal`: Single-writer signal cells
//! - `task`: Executor and task handles
//! - `edge`: Per-clock edge-wait queues
//! - `clock`: Clock generators and handles
//! - `manager`: Global time and tick loop
//! - `model`: Hardware model collaborator traits
//! - `trace`: Trace recording (VCD format)
//! - `sim`: Simulation run context

#![warn(missing_docs)]

pub mod clock;
pub mod edge;
pub mod error;
pub mod manager;
pub mod model;
pub mod signal;
pub mod sim;
pub mod task;
pub mod trace;

pub use clock::{Clock, ClockHandle, ClockId};
pub use edge::{Edge, EdgeWait};
pub use error::SimError;
pub use manager::ClockManager;
pub use model::{DebugPort, Evaluator, FnEvaluator};
pub use signal::{signal, Driver, Probe, Signal, SignalValue};
pub use sim::{ClockSummary, SimConfig, SimSummary, Simulation};
pub use task::{Executor, Task, TaskError, TaskId};
pub use tempo_common::{Frequency, TimeValue};
pub use trace::{open_vcd, TraceFile, TraceRecorder, TraceSink, VcdRecorder};
