//! `tempo clocks`: list the first clock events of the configured clock set.

use serde::Serialize;
use tempo_common::TimeValue;
use tempo_sim::{ClockHandle, Edge, Evaluator, SimError, Simulation};

use crate::project::{self, clock_pins, register_clocks};
use crate::{ClocksArgs, GlobalArgs, ReportFormat};

/// One tick of the clock manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClockEvent {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Global time after the tick.
    pub time: TimeValue,
    /// Clocks that toggled, in registration order.
    pub toggled: Vec<Toggle>,
}

/// A single clock toggle within a [`ClockEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toggle {
    /// Clock name.
    pub clock: String,
    /// The edge the clock produced.
    pub edge: Edge,
}

/// Runs the `tempo clocks` command.
pub fn run(args: &ClocksArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = project::load(global)?;
    let pins = clock_pins(&project.config)?;
    let mut sim = Simulation::new((), project.sim_config())?;
    let handles = register_clocks(&mut sim, pins)?;
    if handles.is_empty() {
        return Err(SimError::NoClocks.into());
    }

    let events = collect_events(&mut sim, &handles, args.edges)?;
    if !global.quiet && (events.len() as u64) < args.edges {
        eprintln!(
            "   Stopped after {} tick(s) at the time limit",
            events.len()
        );
    }

    match args.format {
        ReportFormat::Text => {
            for event in &events {
                println!("{}", format_event(event));
            }
        }
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
    }
    Ok(0)
}

/// Steps `sim` up to `ticks` times, noting which clocks toggled on each step.
///
/// Reaching the configured time limit ends the listing early rather than
/// failing it.
pub fn collect_events<E: Evaluator>(
    sim: &mut Simulation<E>,
    clocks: &[ClockHandle],
    ticks: u64,
) -> Result<Vec<ClockEvent>, SimError> {
    let mut events = Vec::new();
    for tick in 1..=ticks {
        let before: Vec<u64> = clocks.iter().map(ClockHandle::toggles).collect();
        let time = match sim.step() {
            Ok(time) => time,
            Err(SimError::TimeLimitExceeded { .. }) => break,
            Err(e) => return Err(e),
        };
        let toggled = clocks
            .iter()
            .zip(before)
            .filter(|(clock, toggles)| clock.toggles() != *toggles)
            .map(|(clock, _)| Toggle {
                clock: clock.name().to_string(),
                edge: if clock.is_high() {
                    Edge::Rising
                } else {
                    Edge::Falling
                },
            })
            .collect();
        events.push(ClockEvent {
            tick,
            time,
            toggled,
        });
    }
    Ok(events)
}

fn format_event(event: &ClockEvent) -> String {
    let toggles: Vec<String> = event
        .toggled
        .iter()
        .map(|t| format!("{} {}", t.clock, t.edge))
        .collect();
    format!(
        "{:>6}  {:>12}  {}",
        event.tick,
        event.time.to_string(),
        toggles.join(", ")
    )
}
