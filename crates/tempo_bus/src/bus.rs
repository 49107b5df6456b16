//! The protocol-independent bus capability interface.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tempo_sim::SignalValue;

use crate::error::BusError;

/// Direction of a transfer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Completer to requester.
    Read,
    /// Requester to completer.
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// An error the completer signaled for one element of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFault {
    /// Name of the bus.
    pub bus: String,
    /// Byte address of the failing element.
    pub address: u32,
    /// Direction of the transfer.
    pub direction: Direction,
    /// Index of the failing element within its burst.
    pub index: usize,
}

impl fmt::Display for TransferFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bus '{}': {} of element {} at {:#x} answered with an error",
            self.bus, self.direction, self.index, self.address
        )
    }
}

/// Outcome of a completed transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Every element was accepted.
    Okay,
    /// The completer signaled an error; the transfer stopped at that element.
    Error(TransferFault),
}

impl Response {
    /// Returns `true` for [`Response::Okay`].
    pub fn is_okay(&self) -> bool {
        matches!(self, Response::Okay)
    }

    /// Returns the fault, if any.
    pub fn fault(&self) -> Option<&TransferFault> {
        match self {
            Response::Okay => None,
            Response::Error(fault) => Some(fault),
        }
    }
}

/// A bus a testbench can issue transfers on.
///
/// All transfer methods are suspendable: they return futures that wait on
/// the bus clock and must be awaited from inside a task. At most one transfer
/// may be in flight per bus instance; starting another fails immediately
/// with [`BusError::Busy`].
pub trait Bus<W: SignalValue> {
    /// Name of the bus instance.
    fn name(&self) -> &str;

    /// Writes one element.
    fn write(&self, address: u32, data: W) -> impl Future<Output = Result<Response, BusError>>;

    /// Reads one element into `data`.
    fn read(&self, address: u32, data: &mut W) -> impl Future<Output = Result<Response, BusError>>;

    /// Writes the first `count` elements of `data` to consecutive addresses.
    fn burst_write(
        &self,
        address: u32,
        data: &[W],
        count: usize,
    ) -> impl Future<Output = Result<Response, BusError>>;

    /// Reads `count` consecutive elements into the front of `buffer`.
    fn burst_read(
        &self,
        address: u32,
        buffer: &mut [W],
        count: usize,
    ) -> impl Future<Output = Result<Response, BusError>>;

    /// Returns `true` while a transfer is in flight.
    fn busy(&self) -> bool;

    /// The fault reported by the most recent transfer, if it failed.
    fn error(&self) -> Option<TransferFault>;

    /// Returns `true` when no transfer is in flight.
    fn done(&self) -> bool {
        !self.busy()
    }
}

/// Size in bytes of one bus element.
pub fn element_bytes<W: SignalValue>() -> u32 {
    (W::WIDTH / 8).max(1)
}

/// Byte address of element `index` of a burst starting at `base`.
pub fn element_address<W: SignalValue>(base: u32, index: usize) -> u32 {
    base.wrapping_add((index as u32).wrapping_mul(element_bytes::<W>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_addressing() {
        assert_eq!(element_bytes::<u8>(), 1);
        assert_eq!(element_bytes::<u32>(), 4);
        assert_eq!(element_address::<u16>(0x10, 3), 0x16);
        assert_eq!(element_address::<u32>(0x100, 2), 0x108);
    }

    #[test]
    fn response_helpers() {
        let fault = TransferFault {
            bus: "apb".into(),
            address: 0x84,
            direction: Direction::Write,
            index: 1,
        };
        let resp = Response::Error(fault.clone());
        assert!(!resp.is_okay());
        assert_eq!(resp.fault(), Some(&fault));
        assert!(Response::Okay.is_okay());
        assert_eq!(
            fault.to_string(),
            "bus 'apb': write of element 1 at 0x84 answered with an error"
        );
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Read).unwrap(), "\"read\"");
    }
}
