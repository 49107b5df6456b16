//! Clock resolution: turning `[clocks.*]` tables into phase durations.

use crate::error::ConfigError;
use crate::types::{ClockDef, ProjectConfig};
use tempo_common::TimeValue;

/// A clock definition reduced to the two phase durations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClock {
    /// The clock's table name, also used as its signal name.
    pub name: String,
    /// Duration of the low phase.
    pub low: TimeValue,
    /// Duration of the high phase.
    pub high: TimeValue,
}

impl ResolvedClock {
    /// Full cycle duration.
    pub fn period(&self) -> TimeValue {
        self.low + self.high
    }
}

/// Resolves a single clock table.
///
/// `period` and `frequency` yield an even split. Giving more than one form,
/// or none, is an error, as is any non-positive duration or frequency.
pub fn resolve_clock(name: &str, def: &ClockDef) -> Result<ResolvedClock, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidClock {
        clock: name.to_string(),
        reason: reason.to_string(),
    };

    let (low, high) = match (def.period, def.frequency, def.low, def.high) {
        (Some(period), None, None, None) => {
            if !period.is_positive() {
                return Err(invalid("period must be positive"));
            }
            (period / 2.0, period / 2.0)
        }
        (None, Some(frequency), None, None) => {
            if !(frequency.hz().is_finite() && frequency.hz() > 0.0) {
                return Err(invalid("frequency must be positive"));
            }
            let period = frequency.period();
            (period / 2.0, period / 2.0)
        }
        (None, None, Some(low), Some(high)) => {
            if !(low.is_positive() && high.is_positive()) {
                return Err(invalid("low and high phases must be positive"));
            }
            (low, high)
        }
        (None, None, Some(_), None) | (None, None, None, Some(_)) => {
            return Err(invalid("low and high must be given together"));
        }
        (None, None, None, None) => {
            return Err(invalid("expected one of period, frequency or low + high"));
        }
        _ => return Err(invalid("period, frequency and low + high are mutually exclusive")),
    };

    Ok(ResolvedClock {
        name: name.to_string(),
        low,
        high,
    })
}

/// Resolves every configured clock, in name order.
pub fn resolve_clocks(config: &ProjectConfig) -> Result<Vec<ResolvedClock>, ConfigError> {
    config
        .clocks
        .iter()
        .map(|(name, def)| resolve_clock(name, def))
        .collect()
}

/// Returns the name of the clock that drives the bus.
///
/// This is `bus.bus_clock` when set, otherwise the first clock in name order.
pub fn resolve_bus_clock(config: &ProjectConfig) -> Result<&str, ConfigError> {
    match &config.bus.bus_clock {
        Some(name) if config.clocks.contains_key(name) => Ok(name),
        Some(name) => Err(ConfigError::UnknownClock(name.clone())),
        None => config
            .clocks
            .keys()
            .next()
            .map(String::as_str)
            .ok_or_else(|| ConfigError::ValidationError("no clocks configured".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;
    use tempo_common::Frequency;

    fn def() -> ClockDef {
        ClockDef::default()
    }

    #[test]
    fn period_splits_evenly() {
        let clock = resolve_clock(
            "pclk",
            &ClockDef {
                period: Some(TimeValue::from_nanos(10.0)),
                ..def()
            },
        )
        .unwrap();
        assert_eq!(clock.low, TimeValue::from_nanos(5.0));
        assert_eq!(clock.high, TimeValue::from_nanos(5.0));
        assert_eq!(clock.period(), TimeValue::from_nanos(10.0));
    }

    #[test]
    fn frequency_uses_reciprocal() {
        let clock = resolve_clock(
            "fast",
            &ClockDef {
                frequency: Some(Frequency::new(125e6)),
                ..def()
            },
        )
        .unwrap();
        assert!(clock
            .period()
            .approx_eq(TimeValue::from_nanos(8.0), TimeValue::from_femtos(1.0)));
    }

    #[test]
    fn explicit_phases_are_kept() {
        let clock = resolve_clock(
            "skewed",
            &ClockDef {
                low: Some(TimeValue::from_nanos(4.0)),
                high: Some(TimeValue::from_nanos(6.0)),
                ..def()
            },
        )
        .unwrap();
        assert_eq!(clock.low, TimeValue::from_nanos(4.0));
        assert_eq!(clock.high, TimeValue::from_nanos(6.0));
    }

    #[test]
    fn rejects_ambiguous_and_missing_forms() {
        let both = ClockDef {
            period: Some(TimeValue::from_nanos(10.0)),
            frequency: Some(Frequency::new(1e8)),
            ..def()
        };
        let half = ClockDef {
            low: Some(TimeValue::from_nanos(4.0)),
            ..def()
        };
        for bad in [both, half, def()] {
            let err = resolve_clock("c", &bad).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidClock { ref clock, .. } if clock == "c"));
        }
    }

    #[test]
    fn rejects_non_positive_values() {
        let zero = ClockDef {
            period: Some(TimeValue::ZERO),
            ..def()
        };
        let negative = ClockDef {
            low: Some(TimeValue::from_nanos(-1.0)),
            high: Some(TimeValue::from_nanos(1.0)),
            ..def()
        };
        let still = ClockDef {
            frequency: Some(Frequency::new(0.0)),
            ..def()
        };
        for bad in [zero, negative, still] {
            assert!(resolve_clock("c", &bad).is_err());
        }
    }

    #[test]
    fn clocks_resolve_in_name_order() {
        let config = load_config_from_str(
            r#"
[clocks.zeta]
period = "8ns"
[clocks.alpha]
period = "10ns"
"#,
        )
        .unwrap();
        let names: Vec<_> = resolve_clocks(&config)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["alpha", "zeta"]);
        assert_eq!(resolve_bus_clock(&config).unwrap(), "alpha");
    }

    #[test]
    fn bus_clock_without_clocks_is_an_error() {
        let config = ProjectConfig::default();
        assert!(matches!(
            resolve_bus_clock(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
