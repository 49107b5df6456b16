//! Configuration loading for tempo projects.
//!
//! Parses `tempo.toml` into a [`ProjectConfig`], validates it and resolves
//! each clock definition into the low and high phase durations the clock
//! manager consumes.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_bus_clock, resolve_clock, resolve_clocks, ResolvedClock};
pub use types::*;
