//! Locating and loading the project configuration.

use std::path::{Path, PathBuf};

use tempo_config::{resolve_clocks, ProjectConfig, ResolvedClock, CONFIG_FILE};
use tempo_sim::{signal, ClockHandle, Driver, Evaluator, SimConfig, SimError, Signal, Simulation};

use crate::GlobalArgs;

/// A loaded project: its root directory and parsed configuration.
pub struct Project {
    /// Directory containing `tempo.toml`.
    pub root: PathBuf,
    /// The validated configuration.
    pub config: ProjectConfig,
}

impl Project {
    /// Engine settings for a run of this project.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            precision: self.config.simulation.precision,
            time_limit: self.config.simulation.time_limit,
        }
    }
}

/// A configured clock whose signal exists but is not registered yet.
pub struct ClockPin {
    /// Resolved phase durations.
    pub clock: ResolvedClock,
    /// The clock's output, handed to the clock manager.
    pub driver: Driver<bool>,
    /// Read handle for models sampling the clock.
    pub signal: Signal<bool>,
}

/// Creates one low-initialized signal per configured clock, in name order.
pub fn clock_pins(config: &ProjectConfig) -> Result<Vec<ClockPin>, tempo_config::ConfigError> {
    Ok(resolve_clocks(config)?
        .into_iter()
        .map(|clock| {
            let (driver, signal) = signal(clock.name.clone(), false);
            ClockPin {
                clock,
                driver,
                signal,
            }
        })
        .collect())
}

/// Registers every clock with `sim`, preserving order.
pub fn register_clocks<E: Evaluator>(
    sim: &mut Simulation<E>,
    pins: Vec<ClockPin>,
) -> Result<Vec<ClockHandle>, SimError> {
    pins.into_iter()
        .map(|pin| sim.add_clock_phases(pin.driver, pin.clock.low, pin.clock.high))
        .collect()
}

/// Resolves the project root and loads its configuration.
pub fn load(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    let config = tempo_config::load_config(&root)?;
    Ok(Project { root, config })
}

/// Walks up from `start` looking for the nearest directory containing `tempo.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file: its parent, directory:
/// itself). Otherwise walks up from the current directory.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}
