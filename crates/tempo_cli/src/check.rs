//! `tempo check`: validate the project configuration.
//!
//! Beyond parsing, this registers every clock with a throwaway simulation so
//! periods the configured precision cannot resolve are caught up front.

use tempo_config::{resolve_bus_clock, CONFIG_FILE};
use tempo_sim::Simulation;

use crate::project::{self, clock_pins, register_clocks};
use crate::GlobalArgs;

/// Runs the `tempo check` command. Returns exit code 0 when the configuration is usable.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = project::load(global)?;
    let config = &project.config;

    let pins = clock_pins(config)?;
    let resolved: Vec<_> = pins.iter().map(|p| p.clock.clone()).collect();
    let mut sim = Simulation::new((), project.sim_config())?;
    register_clocks(&mut sim, pins)?;

    if global.quiet {
        return Ok(0);
    }
    eprintln!("   Checked {}", project.root.join(CONFIG_FILE).display());
    if global.verbose {
        for clock in &resolved {
            eprintln!(
                "   clock {}: period {}, low {}, high {}",
                clock.name,
                clock.period(),
                clock.low,
                clock.high
            );
        }
    }
    if resolved.is_empty() {
        eprintln!("warning: no clocks configured; `tempo run` needs at least one");
    } else {
        let bus_clock = resolve_bus_clock(config)?;
        eprintln!(
            "   {} clock(s), {}-bit bus on '{bus_clock}'",
            resolved.len(),
            config.bus.data_width
        );
    }
    Ok(0)
}
