//! Shared value types for the tempo simulation engine.
//!
//! This crate provides [`TimeValue`], the floating-point seconds scalar every
//! clock and countdown is expressed in, and [`Frequency`], its reciprocal.
//! Both parse from unit strings (`"7.5ns"`, `"100MHz"`) and display using the
//! most readable unit.

#![warn(missing_docs)]

pub mod frequency;
pub mod time;

pub use frequency::{Frequency, ParseFrequencyError};
pub use time::{ParseTimeError, TimeValue};
