//! Bus transaction engine for tempo testbenches.
//!
//! This crate expresses bus protocols as suspendable routines on top of
//! `tempo_sim`. A transfer drives and samples signals between awaits on the
//! bus clock, so it interleaves naturally with every other task waiting on
//! the same clock.
//!
//! It provides:
//!
//! - [`Bus`], the protocol-independent capability interface,
//! - [`ApbRequester`], an APB requester state machine,
//! - [`ApbMemory`], a memory completer model usable as the hardware model,
//! - [`ApbMonitor`], a passive protocol checker.

#![warn(missing_docs)]

pub mod apb;
pub mod bus;
pub mod completer;
pub mod error;
pub mod monitor;

pub use apb::{
    apb_interface, ApbCompleterPins, ApbInterface, ApbRequester, ApbRequesterPins, ApbState,
    ApbView,
};
pub use bus::{element_address, element_bytes, Bus, Direction, Response, TransferFault};
pub use completer::{ApbMemory, MemoryConfig};
pub use error::BusError;
pub use monitor::{ApbMonitor, ObservedTransfer, ProtocolViolation};
