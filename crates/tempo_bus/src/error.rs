//! Usage errors of the bus transaction engine.
//!
//! Errors signaled by the completer are not here: they are ordinary
//! [`Response::Error`](crate::Response::Error) values returned to the caller.

/// Misuse of a bus instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// A transfer was started while another one is still in flight.
    #[error("bus '{bus}' is busy: transfers on one bus must be serialized")]
    Busy {
        /// Name of the bus.
        bus: String,
    },

    /// A burst asked for more elements than the buffer holds.
    #[error("bus '{bus}': burst of {count} elements but buffer holds only {len}")]
    BufferTooShort {
        /// Name of the bus.
        bus: String,
        /// Requested element count.
        count: usize,
        /// Buffer length.
        len: usize,
    },
}
