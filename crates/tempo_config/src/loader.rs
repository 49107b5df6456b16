//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::resolve::resolve_clocks;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file inside a project directory.
pub const CONFIG_FILE: &str = "tempo.toml";

/// Loads and validates a `tempo.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    let config = load_config_from_str(&content)?;
    tracing::debug!(
        path = %config_path.display(),
        clocks = config.clocks.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Parses and validates a `tempo.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks value ranges and cross-references between sections.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    let sim = &config.simulation;
    if !sim.precision.is_positive() {
        return Err(ConfigError::ValidationError(format!(
            "simulation.precision must be positive, got {}",
            sim.precision
        )));
    }
    if let Some(limit) = sim.time_limit {
        if !limit.is_positive() {
            return Err(ConfigError::ValidationError(format!(
                "simulation.time_limit must be positive, got {limit}"
            )));
        }
    }

    resolve_clocks(config)?;

    let bus = &config.bus;
    if !matches!(bus.data_width, 8 | 16 | 32) {
        return Err(ConfigError::ValidationError(format!(
            "bus.data_width must be 8, 16 or 32, got {}",
            bus.data_width
        )));
    }
    if bus.words == 0 {
        return Err(ConfigError::ValidationError(
            "bus.words must be at least 1".to_string(),
        ));
    }
    if bus.burst == 0 {
        return Err(ConfigError::ValidationError(
            "bus.burst must be at least 1".to_string(),
        ));
    }
    if bus.burst > bus.words {
        return Err(ConfigError::ValidationError(format!(
            "bus.burst ({}) exceeds bus.words ({})",
            bus.burst, bus.words
        )));
    }
    if let Some(name) = &bus.bus_clock {
        if !config.clocks.contains_key(name) {
            return Err(ConfigError::UnknownClock(name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_common::TimeValue;

    #[test]
    fn parse_empty_config() {
        let config = load_config_from_str("").unwrap();
        assert!(config.clocks.is_empty());
        assert_eq!(config.simulation.precision, TimeValue::from_picos(1.0));
        assert_eq!(config.bus.data_width, 8);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[simulation]
precision = "1ps"
time_limit = "20us"
trace = "out/apb.vcd.gz"

[clocks.pclk]
period = "10ns"

[clocks.hclk]
frequency = "125MHz"

[bus]
data_width = 32
words = 64
wait_states = 1
burst = 8
bus_clock = "pclk"
error_above = 0x80
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.simulation.time_limit, Some(TimeValue::from_micros(20.0)));
        assert_eq!(
            config.simulation.trace.as_deref(),
            Some(Path::new("out/apb.vcd.gz"))
        );
        assert_eq!(config.clocks.len(), 2);
        assert_eq!(config.bus.data_width, 32);
        assert_eq!(config.bus.burst, 8);
        assert_eq!(config.bus.bus_clock.as_deref(), Some("pclk"));
        assert_eq!(config.bus.error_above, Some(0x80));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn zero_precision_errors() {
        let err = load_config_from_str("[simulation]\nprecision = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn bad_clock_errors() {
        let err = load_config_from_str("[clocks.pclk]\nlow = \"4ns\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidClock { .. }));
    }

    #[test]
    fn bus_ranges_are_checked() {
        let base = "[clocks.pclk]\nperiod = \"10ns\"\n[bus]\n";
        for bad in [
            "data_width = 12",
            "burst = 0",
            "words = 0",
            "words = 4\nburst = 5",
        ] {
            let err = load_config_from_str(&format!("{base}{bad}")).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn unknown_bus_clock_errors() {
        let toml = "[clocks.pclk]\nperiod = \"10ns\"\n[bus]\nbus_clock = \"hclk\"";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownClock(ref name) if name == "hclk"));
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[clocks.pclk]\nperiod = \"10ns\"\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(config.clocks.contains_key("pclk"));
    }

    #[test]
    fn io_error_from_nonexistent_dir() {
        let err = load_config(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
