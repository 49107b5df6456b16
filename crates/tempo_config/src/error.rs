//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `tempo.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A referenced clock name does not exist in the configuration.
    #[error("unknown clock '{0}'")]
    UnknownClock(String),

    /// A clock table does not say how long its phases are.
    #[error("clock '{clock}': {reason}")]
    InvalidClock {
        /// The clock's table name.
        clock: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_clock() {
        let err = ConfigError::UnknownClock("hclk".to_string());
        assert_eq!(format!("{err}"), "unknown clock 'hclk'");
    }

    #[test]
    fn display_invalid_clock() {
        let err = ConfigError::InvalidClock {
            clock: "pclk".to_string(),
            reason: "period must be positive".to_string(),
        };
        assert_eq!(format!("{err}"), "clock 'pclk': period must be positive");
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("bus.burst must be at least 1".to_string());
        assert_eq!(
            format!("{err}"),
            "validation error: bus.burst must be at least 1"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::IoError(io_err);
        assert!(format!("{err}").starts_with("failed to read configuration:"));
    }
}
