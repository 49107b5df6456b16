//! The APB self-check bench behind `tempo run`.
//!
//! The bench wires an [`ApbRequester`] to an [`ApbMemory`] completer, bursts
//! a known pattern into memory, bursts it back and cross-checks both the
//! read-back data and the memory contents through the debug port.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;
use tempo_bus::{
    apb_interface, element_address, element_bytes, ApbMemory, ApbMonitor, ApbRequester, Bus,
    BusError, MemoryConfig, ProtocolViolation, Response,
};
use tempo_config::{resolve_bus_clock, ConfigError};
use tempo_sim::{open_vcd, DebugPort, SignalValue, SimSummary, Simulation};

use crate::project::{clock_pins, register_clocks, Project};

/// Name of the bench's bus instance, also its trace scope.
pub const BUS_NAME: &str = "apb0";

/// Which comparison found a [`Mismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Data returned by the burst read.
    ReadBack,
    /// Memory contents read through the debug port.
    Peek,
}

/// An element that did not hold the value written to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Comparison that failed.
    pub check: Check,
    /// Element index within the burst.
    pub index: usize,
    /// Byte address of the element.
    pub address: u32,
    /// Value written.
    pub expected: u64,
    /// Value found.
    pub actual: u64,
}

/// Everything `tempo run` reports.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    /// Bus instance name.
    pub bus: String,
    /// Clock driving the bus.
    pub bus_clock: String,
    /// Bits per element.
    pub data_width: u32,
    /// Elements per burst.
    pub elements: u32,
    /// Wait states the completer inserted per transfer.
    pub wait_states: u32,
    /// Outcome of the burst write.
    pub write: Response,
    /// Outcome of the burst read.
    pub read: Response,
    /// Elements that failed a check.
    pub mismatches: Vec<Mismatch>,
    /// Transfers the monitor saw on the wires.
    pub transfers: usize,
    /// Protocol violations the monitor flagged.
    pub violations: Vec<ProtocolViolation>,
    /// Trace file, when one was written.
    pub trace: Option<PathBuf>,
    /// Engine statistics.
    pub summary: SimSummary,
}

impl BenchReport {
    /// Returns `true` when both bursts succeeded and every check passed.
    pub fn passed(&self) -> bool {
        self.write.is_okay()
            && self.read.is_okay()
            && self.mismatches.is_empty()
            && self.violations.is_empty()
    }
}

/// The value written to element `index`, before truncation to the bus width.
pub fn pattern(index: usize) -> u64 {
    0x5AC3_96E1_2DB4_7F08_u64.rotate_left(8 * (index % 8) as u32) ^ index as u64
}

/// Builds and runs the bench for elements of type `W`.
pub fn run_bench<W: SignalValue>(
    project: &Project,
    trace: Option<&Path>,
) -> Result<BenchReport, Box<dyn std::error::Error>> {
    let config = &project.config;
    let bus_clock = resolve_bus_clock(config)?.to_string();
    let pins = clock_pins(config)?;
    let clk = pins
        .iter()
        .find(|p| p.clock.name == bus_clock)
        .map(|p| p.signal.clone())
        .ok_or_else(|| ConfigError::UnknownClock(bus_clock.clone()))?;

    let apb = apb_interface::<W>();
    let memory = ApbMemory::new(
        clk,
        apb.completer,
        MemoryConfig {
            words: config.bus.words,
            wait_states: config.bus.wait_states,
            error_above: config.bus.error_above,
        },
    );
    let mut sim = Simulation::new(memory, project.sim_config())?;
    let clocks = register_clocks(&mut sim, pins)?;
    let bus_handle = clocks
        .iter()
        .find(|c| c.name() == bus_clock)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownClock(bus_clock.clone()))?;

    if let Some(path) = trace {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut recorder = open_vcd(path, config.simulation.precision)?;
        for clock in &clocks {
            recorder.add_probe("clocks", clock.signal())?;
        }
        apb.view.trace_into(&mut recorder, BUS_NAME)?;
        sim.set_recorder(recorder);
    }

    let monitor = ApbMonitor::spawn(sim.executor(), bus_handle.clone(), apb.view.clone());
    let requester = Rc::new(ApbRequester::new(BUS_NAME, bus_handle.clone(), apb.requester));

    let count = config.bus.burst as usize;
    let expected: Vec<W> = (0..count).map(|i| W::from_bits(pattern(i))).collect();
    let data = expected.clone();
    let bus = Rc::clone(&requester);
    let mut task = sim.spawn("self-check", async move {
        let write = bus.burst_write(0, &data, count).await?;
        let mut back = vec![W::default(); count];
        let read = bus.burst_read(0, &mut back, count).await?;
        Ok::<_, BusError>((write, read, back))
    });
    sim.run_until_done(&task)?;

    // The monitor samples on falling edges; let it see the last access.
    let settle = {
        let clk = bus_handle.clone();
        sim.spawn("monitor-settle", async move { clk.falling_edge().await })
    };
    sim.run_until_done(&settle)?;

    let (write, read, back) = task.take_result().ok_or("self-check task left no result")???;
    let mut mismatches = compare(Check::ReadBack, &expected, &back);
    let stored: Vec<W> = (0..count)
        .map(|i| peek_element::<W, _>(sim.model(), element_address::<W>(0, i)))
        .collect();
    mismatches.extend(compare(Check::Peek, &expected, &stored));

    let transfers = monitor.transfers().len();
    let violations = monitor.violations();
    monitor.stop();
    let summary = sim.finish()?;

    Ok(BenchReport {
        bus: BUS_NAME.to_string(),
        bus_clock,
        data_width: W::WIDTH,
        elements: config.bus.burst,
        wait_states: requester.last_wait_states(),
        write,
        read,
        mismatches,
        transfers,
        violations,
        trace: trace.map(Path::to_path_buf),
        summary,
    })
}

/// Reassembles one element from its bytes, little-endian.
fn peek_element<W: SignalValue, D: DebugPort>(port: &D, address: u32) -> W {
    let bits = (0..element_bytes::<W>()).fold(0u64, |acc, byte| {
        acc | u64::from(port.peek(address + byte)) << (8 * byte)
    });
    W::from_bits(bits)
}

fn compare<W: SignalValue>(check: Check, expected: &[W], actual: &[W]) -> Vec<Mismatch> {
    expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (e, a))| e != a)
        .map(|(index, (e, a))| Mismatch {
            check,
            index,
            address: element_address::<W>(0, index),
            expected: e.to_bits(),
            actual: a.to_bits(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_config::load_config_from_str;

    fn project(toml: &str) -> Project {
        Project {
            root: PathBuf::from("."),
            config: load_config_from_str(toml).unwrap(),
        }
    }

    #[test]
    fn byte_bus_round_trip_passes() {
        let project = project("[clocks.pclk]\nperiod = \"10ns\"\n[bus]\nburst = 4\n");
        let report = run_bench::<u8>(&project, None).unwrap();
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.transfers, 8);
        assert_eq!(report.bus_clock, "pclk");
        assert_eq!(report.data_width, 8);
        assert_eq!(report.summary.live_tasks, 0);
    }

    #[test]
    fn wide_bus_with_wait_states_and_second_clock() {
        let project = project(
            r#"
[clocks.hclk]
period = "4ns"
[clocks.pclk]
period = "10ns"
[bus]
data_width = 32
wait_states = 2
burst = 6
bus_clock = "pclk"
"#,
        );
        let report = run_bench::<u32>(&project, None).unwrap();
        assert!(report.passed(), "{report:?}");
        assert_eq!(report.wait_states, 2);
        assert_eq!(report.summary.clocks.len(), 2);
    }

    #[test]
    fn error_region_fails_the_bench() {
        let project = project(
            "[clocks.pclk]\nperiod = \"10ns\"\n[bus]\nburst = 4\nerror_above = 2\n",
        );
        let report = run_bench::<u8>(&project, None).unwrap();
        assert!(!report.passed());
        assert_eq!(report.write.fault().map(|f| f.index), Some(2));
        assert!(report
            .mismatches
            .iter()
            .any(|m| m.check == Check::Peek && m.index == 2));
    }

    #[test]
    fn trace_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("bench.vcd");
        let project = project("[clocks.pclk]\nperiod = \"10ns\"\n");
        let report = run_bench::<u16>(&project, Some(&path)).unwrap();
        assert!(report.passed());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("$scope module apb0 $end"));
        assert!(text.contains("$var wire 16"));
    }

    #[test]
    fn pattern_differs_per_element() {
        let bytes: Vec<u8> = (0..8).map(|i| pattern(i) as u8).collect();
        let mut unique = bytes.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), bytes.len());
    }
}
