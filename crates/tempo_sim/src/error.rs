//! Simulation error types for the clock time base and task engine.
//!
//! All errors that can occur while configuring or advancing a simulation are
//! represented as variants of [`SimError`]. Every variant names the clock,
//! task or recorder that violated the invariant.

use std::io;

use tempo_common::TimeValue;

/// Errors that can occur during simulation setup or execution.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Time was advanced with no clock registered, so there is no time reference.
    #[error("cannot advance time: no clocks registered")]
    NoClocks,

    /// The simulation precision is zero, negative or not finite.
    #[error("invalid simulation precision {precision}")]
    InvalidPrecision {
        /// The rejected precision.
        precision: TimeValue,
    },

    /// A clock was registered with a zero, negative or non-finite half period.
    #[error("clock '{clock}' has invalid period (low {low}, high {high})")]
    InvalidPeriod {
        /// Name of the offending clock.
        clock: String,
        /// The requested low-phase duration.
        low: TimeValue,
        /// The requested high-phase duration.
        high: TimeValue,
    },

    /// A clock phase is shorter than the precision window and could never be resolved.
    #[error("clock '{clock}' phase {phase} is shorter than the precision {precision}")]
    PeriodBelowPrecision {
        /// Name of the offending clock.
        clock: String,
        /// The phase duration that is too short.
        phase: TimeValue,
        /// The simulation precision.
        precision: TimeValue,
    },

    /// A clock was advanced past its own next event.
    #[error("clock '{clock}' advanced by {elapsed} with only {remaining} to its next edge")]
    TimeOverrun {
        /// Name of the clock whose event would have been skipped.
        clock: String,
        /// The requested advance.
        elapsed: TimeValue,
        /// The countdown that was left.
        remaining: TimeValue,
    },

    /// Time was advanced from inside a running task.
    #[error("cannot advance time from inside task '{task}'")]
    ReentrantTick {
        /// Name of the task that was running.
        task: String,
    },

    /// A task that already ran to completion was resumed.
    #[error("task '{task}' has already completed and cannot be resumed")]
    TaskCompleted {
        /// Name of the completed task.
        task: String,
    },

    /// Two trace records would land on the same integer timestamp.
    #[error("trace timestamp {timestamp} recorded twice (time {time}); trace precision too coarse")]
    TraceTimestampCollision {
        /// The duplicated timestamp in recorder units.
        timestamp: u64,
        /// The simulation time of the second record.
        time: TimeValue,
    },

    /// The recorder precision cannot be expressed as a VCD timescale.
    #[error(
        "precision {precision} is not a valid trace timescale (must be 1, 10 or 100 of a unit)"
    )]
    InvalidTimescale {
        /// The rejected precision.
        precision: TimeValue,
    },

    /// The simulation reached its configured time limit.
    #[error("time limit exceeded: {limit}")]
    TimeLimitExceeded {
        /// The configured limit.
        limit: TimeValue,
    },

    /// A probe was added to a recorder after recording started.
    #[error("cannot add probe '{name}' after recording started")]
    ProbeAfterStart {
        /// Name of the late probe.
        name: String,
    },

    /// An I/O error occurred while writing trace data.
    #[error("trace I/O error: {0}")]
    TraceIo(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_clocks_display() {
        assert_eq!(
            SimError::NoClocks.to_string(),
            "cannot advance time: no clocks registered"
        );
    }

    #[test]
    fn invalid_period_names_clock() {
        let e = SimError::InvalidPeriod {
            clock: "pclk".into(),
            low: TimeValue::ZERO,
            high: TimeValue::from_nanos(5.0),
        };
        assert_eq!(
            e.to_string(),
            "clock 'pclk' has invalid period (low 0 s, high 5 ns)"
        );
    }

    #[test]
    fn time_overrun_display() {
        let e = SimError::TimeOverrun {
            clock: "clk".into(),
            elapsed: TimeValue::from_nanos(5.0),
            remaining: TimeValue::from_nanos(4.0),
        };
        assert_eq!(
            e.to_string(),
            "clock 'clk' advanced by 5 ns with only 4 ns to its next edge"
        );
    }

    #[test]
    fn task_completed_display() {
        let e = SimError::TaskCompleted {
            task: "stimulus".into(),
        };
        assert_eq!(
            e.to_string(),
            "task 'stimulus' has already completed and cannot be resumed"
        );
    }

    #[test]
    fn collision_display() {
        let e = SimError::TraceTimestampCollision {
            timestamp: 4,
            time: TimeValue::from_nanos(4.2),
        };
        assert!(e.to_string().contains("timestamp 4 recorded twice"));
    }

    #[test]
    fn trace_io_display() {
        let e = SimError::TraceIo(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(e.to_string().starts_with("trace I/O error"));
    }
}
