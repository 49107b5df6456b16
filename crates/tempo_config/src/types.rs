//! Configuration types deserialized from `tempo.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tempo_common::{Frequency, TimeValue};

/// The top-level configuration parsed from `tempo.toml`.
///
/// Every section is optional; an empty file is a valid configuration that
/// simply has no clocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    /// Engine-wide settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Named clock definitions. Clocks are registered in name order.
    #[serde(default)]
    pub clocks: BTreeMap<String, ClockDef>,
    /// The APB bench driven by `tempo run`.
    #[serde(default)]
    pub bus: BusConfig,
}

/// The `[simulation]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Smallest distinguishable time step.
    #[serde(default = "default_precision")]
    pub precision: TimeValue,
    /// Stepping past this time is an error.
    #[serde(default)]
    pub time_limit: Option<TimeValue>,
    /// Where to write a VCD trace. A `.gz` suffix compresses it.
    #[serde(default)]
    pub trace: Option<PathBuf>,
}

fn default_precision() -> TimeValue {
    TimeValue::from_picos(1.0)
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            time_limit: None,
            trace: None,
        }
    }
}

/// A `[clocks.<name>]` table.
///
/// Exactly one of `period`, `frequency` or the `low` + `high` pair must be
/// given. `period` and `frequency` split the cycle evenly.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClockDef {
    /// Full cycle duration (e.g. `"10ns"`).
    #[serde(default)]
    pub period: Option<TimeValue>,
    /// Toggle rate (e.g. `"100MHz"`).
    #[serde(default)]
    pub frequency: Option<Frequency>,
    /// Duration of the low phase.
    #[serde(default)]
    pub low: Option<TimeValue>,
    /// Duration of the high phase.
    #[serde(default)]
    pub high: Option<TimeValue>,
}

/// The `[bus]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusConfig {
    /// Bits per element: 8, 16 or 32.
    #[serde(default = "default_data_width")]
    pub data_width: u32,
    /// Completer memory size in elements.
    #[serde(default = "default_words")]
    pub words: u32,
    /// Wait states the completer inserts into every access phase.
    #[serde(default)]
    pub wait_states: u32,
    /// Elements per burst in the self-check bench.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Clock that drives the bus. Defaults to the first configured clock.
    #[serde(default)]
    pub bus_clock: Option<String>,
    /// Byte addresses at or above this answer with an error.
    #[serde(default)]
    pub error_above: Option<u32>,
}

fn default_data_width() -> u32 {
    8
}

fn default_words() -> u32 {
    256
}

fn default_burst() -> u32 {
    4
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            data_width: default_data_width(),
            words: default_words(),
            wait_states: 0,
            burst: default_burst(),
            bus_clock: None,
            error_above: None,
        }
    }
}
