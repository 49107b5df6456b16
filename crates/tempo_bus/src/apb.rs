//! APB signal set and the requester-side transaction engine.
//!
//! [`apb_interface`] creates the signal cells of one APB bus and splits the
//! write capabilities between the two roles: the requester drives address,
//! direction, write data, select and enable; the completer drives ready, read
//! data and the error line. [`ApbView`] is a read-only view of every line for
//! monitors and trace recorders.
//!
//! [`ApbRequester`] runs the APB state machine:
//!
//! ```text
//!   Idle --request--> Setup --1 rising edge--> Access --pready--> Idle
//!                       ^                                 |
//!                       +------- next burst element ------+
//! ```
//!
//! The completer may hold `pready` low for any number of rising edges; each
//! such edge is counted as a wait state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tempo_sim::{signal, ClockHandle, Driver, Signal, SignalValue, SimError, VcdRecorder};

use crate::bus::{element_address, Bus, Direction, Response, TransferFault};
use crate::error::BusError;

/// Lines the requester drives and samples.
pub struct ApbRequesterPins<W: SignalValue> {
    /// Address.
    pub paddr: Driver<u32>,
    /// Direction, high for writes.
    pub pwrite: Driver<bool>,
    /// Write data.
    pub pwdata: Driver<W>,
    /// Select.
    pub psel: Driver<bool>,
    /// Enable, high during the access phase.
    pub penable: Driver<bool>,
    /// Ready, driven by the completer.
    pub pready: Signal<bool>,
    /// Read data, driven by the completer.
    pub prdata: Signal<W>,
    /// Error, driven by the completer.
    pub pslverr: Signal<bool>,
}

/// Lines the completer drives and samples.
pub struct ApbCompleterPins<W: SignalValue> {
    /// Address.
    pub paddr: Signal<u32>,
    /// Direction, high for writes.
    pub pwrite: Signal<bool>,
    /// Write data.
    pub pwdata: Signal<W>,
    /// Select.
    pub psel: Signal<bool>,
    /// Enable.
    pub penable: Signal<bool>,
    /// Ready.
    pub pready: Driver<bool>,
    /// Read data.
    pub prdata: Driver<W>,
    /// Error.
    pub pslverr: Driver<bool>,
}

/// Read-only view of every line of an APB bus.
#[derive(Clone, Debug)]
pub struct ApbView<W: SignalValue> {
    /// Address.
    pub paddr: Signal<u32>,
    /// Direction, high for writes.
    pub pwrite: Signal<bool>,
    /// Write data.
    pub pwdata: Signal<W>,
    /// Select.
    pub psel: Signal<bool>,
    /// Enable.
    pub penable: Signal<bool>,
    /// Ready.
    pub pready: Signal<bool>,
    /// Read data.
    pub prdata: Signal<W>,
    /// Error.
    pub pslverr: Signal<bool>,
}

impl<W: SignalValue> ApbView<W> {
    /// Adds every line as a probe under `scope`.
    pub fn trace_into<O: Write>(
        &self,
        recorder: &mut VcdRecorder<O>,
        scope: &str,
    ) -> Result<(), SimError> {
        recorder.add_probe(scope, self.psel.clone())?;
        recorder.add_probe(scope, self.penable.clone())?;
        recorder.add_probe(scope, self.pwrite.clone())?;
        recorder.add_probe(scope, self.paddr.clone())?;
        recorder.add_probe(scope, self.pwdata.clone())?;
        recorder.add_probe(scope, self.pready.clone())?;
        recorder.add_probe(scope, self.prdata.clone())?;
        recorder.add_probe(scope, self.pslverr.clone())?;
        Ok(())
    }
}

/// The three halves of a freshly created APB bus.
pub struct ApbInterface<W: SignalValue> {
    /// Requester capabilities.
    pub requester: ApbRequesterPins<W>,
    /// Completer capabilities.
    pub completer: ApbCompleterPins<W>,
    /// Read-only view.
    pub view: ApbView<W>,
}

/// Creates the signal cells of one APB bus, all lines low.
pub fn apb_interface<W: SignalValue>() -> ApbInterface<W> {
    let (paddr_d, paddr) = signal("paddr", 0u32);
    let (pwrite_d, pwrite) = signal("pwrite", false);
    let (pwdata_d, pwdata) = signal("pwdata", W::default());
    let (psel_d, psel) = signal("psel", false);
    let (penable_d, penable) = signal("penable", false);
    let (pready_d, pready) = signal("pready", false);
    let (prdata_d, prdata) = signal("prdata", W::default());
    let (pslverr_d, pslverr) = signal("pslverr", false);

    ApbInterface {
        requester: ApbRequesterPins {
            paddr: paddr_d,
            pwrite: pwrite_d,
            pwdata: pwdata_d,
            psel: psel_d,
            penable: penable_d,
            pready: pready.clone(),
            prdata: prdata.clone(),
            pslverr: pslverr.clone(),
        },
        completer: ApbCompleterPins {
            paddr: paddr.clone(),
            pwrite: pwrite.clone(),
            pwdata: pwdata.clone(),
            psel: psel.clone(),
            penable: penable.clone(),
            pready: pready_d,
            prdata: prdata_d,
            pslverr: pslverr_d,
        },
        view: ApbView {
            paddr,
            pwrite,
            pwdata,
            psel,
            penable,
            pready,
            prdata,
            pslverr,
        },
    }
}

/// Phase of the requester state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApbState {
    /// No transfer; select and enable low.
    Idle,
    /// Address and control driven, select high, enable low.
    Setup,
    /// Enable high, waiting for ready.
    Access,
}

impl fmt::Display for ApbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApbState::Idle => f.write_str("idle"),
            ApbState::Setup => f.write_str("setup"),
            ApbState::Access => f.write_str("access"),
        }
    }
}

/// Requester-side APB transaction engine.
///
/// Owns the requester pins for its whole lifetime. Share it between tasks
/// with an `Rc`; the busy flag keeps transfers from overlapping.
pub struct ApbRequester<W: SignalValue> {
    name: String,
    clock: ClockHandle,
    pins: ApbRequesterPins<W>,
    state: Cell<ApbState>,
    busy: Cell<bool>,
    last_fault: RefCell<Option<TransferFault>>,
    last_wait_states: Cell<u32>,
    elements: Cell<u64>,
}

/// Marks the bus busy for the lifetime of one transfer.
///
/// Dropping it returns the bus to idle, even if the transfer was abandoned
/// mid-way because its task was aborted.
struct Transaction<'a, W: SignalValue> {
    requester: &'a ApbRequester<W>,
}

impl<W: SignalValue> Drop for Transaction<'_, W> {
    fn drop(&mut self) {
        let r = self.requester;
        r.pins.penable.set(false);
        r.pins.psel.set(false);
        r.state.set(ApbState::Idle);
        r.busy.set(false);
    }
}

/// Result of a single access phase.
struct Beat<W> {
    rdata: W,
    error: bool,
    wait_states: u32,
}

impl<W: SignalValue> ApbRequester<W> {
    /// Creates a requester clocked by the rising edges of `clock`.
    pub fn new(name: impl Into<String>, clock: ClockHandle, pins: ApbRequesterPins<W>) -> Self {
        pins.psel.set(false);
        pins.penable.set(false);
        Self {
            name: name.into(),
            clock,
            pins,
            state: Cell::new(ApbState::Idle),
            busy: Cell::new(false),
            last_fault: RefCell::new(None),
            last_wait_states: Cell::new(0),
            elements: Cell::new(0),
        }
    }

    /// Current phase of the state machine.
    pub fn state(&self) -> ApbState {
        self.state.get()
    }

    /// Wait states inserted during the most recent transfer, summed over its
    /// elements.
    pub fn last_wait_states(&self) -> u32 {
        self.last_wait_states.get()
    }

    /// Total number of elements transferred.
    pub fn elements_transferred(&self) -> u64 {
        self.elements.get()
    }

    /// The clock the bus runs on.
    pub fn clock(&self) -> &ClockHandle {
        &self.clock
    }

    fn begin(
        &self,
        direction: Direction,
        address: u32,
        count: usize,
        len: usize,
    ) -> Result<Transaction<'_, W>, BusError> {
        if self.busy.get() {
            tracing::warn!(bus = %self.name, "transfer started on busy bus");
            return Err(BusError::Busy {
                bus: self.name.clone(),
            });
        }
        if count > len {
            return Err(BusError::BufferTooShort {
                bus: self.name.clone(),
                count,
                len,
            });
        }
        self.busy.set(true);
        self.last_fault.replace(None);
        self.last_wait_states.set(0);
        tracing::debug!(bus = %self.name, %direction, address, count, "transfer started");
        Ok(Transaction { requester: self })
    }

    async fn beat(&self, address: u32, direction: Direction, wdata: W) -> Beat<W> {
        let p = &self.pins;

        self.state.set(ApbState::Setup);
        p.paddr.set(address);
        p.pwrite.set(direction == Direction::Write);
        if direction == Direction::Write {
            p.pwdata.set(wdata);
        }
        p.penable.set(false);
        p.psel.set(true);
        self.clock.rising_edge().await;

        self.state.set(ApbState::Access);
        p.penable.set(true);
        let mut wait_states = 0;
        loop {
            self.clock.rising_edge().await;
            if p.pready.get() {
                break;
            }
            wait_states += 1;
        }

        let beat = Beat {
            rdata: p.prdata.get(),
            error: p.pslverr.get(),
            wait_states,
        };
        p.penable.set(false);
        self.elements.set(self.elements.get() + 1);
        self.last_wait_states
            .set(self.last_wait_states.get() + wait_states);
        beat
    }

    fn fault(&self, address: u32, direction: Direction, index: usize) -> Response {
        let fault = TransferFault {
            bus: self.name.clone(),
            address,
            direction,
            index,
        };
        tracing::warn!(%fault, "completer signaled an error");
        self.last_fault.replace(Some(fault.clone()));
        Response::Error(fault)
    }
}

impl<W: SignalValue> Bus<W> for ApbRequester<W> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, address: u32, data: W) -> Result<Response, BusError> {
        self.burst_write(address, std::slice::from_ref(&data), 1).await
    }

    async fn read(&self, address: u32, data: &mut W) -> Result<Response, BusError> {
        self.burst_read(address, std::slice::from_mut(data), 1).await
    }

    async fn burst_write(
        &self,
        address: u32,
        data: &[W],
        count: usize,
    ) -> Result<Response, BusError> {
        let _txn = self.begin(Direction::Write, address, count, data.len())?;
        for (index, &value) in data[..count].iter().enumerate() {
            let addr = element_address::<W>(address, index);
            let beat = self.beat(addr, Direction::Write, value).await;
            if beat.error {
                return Ok(self.fault(addr, Direction::Write, index));
            }
        }
        Ok(Response::Okay)
    }

    async fn burst_read(
        &self,
        address: u32,
        buffer: &mut [W],
        count: usize,
    ) -> Result<Response, BusError> {
        let _txn = self.begin(Direction::Read, address, count, buffer.len())?;
        for (index, slot) in buffer[..count].iter_mut().enumerate() {
            let addr = element_address::<W>(address, index);
            let beat = self.beat(addr, Direction::Read, W::default()).await;
            if beat.error {
                return Ok(self.fault(addr, Direction::Read, index));
            }
            *slot = beat.rdata;
        }
        Ok(Response::Okay)
    }

    fn busy(&self) -> bool {
        self.busy.get()
    }

    fn error(&self) -> Option<TransferFault> {
        self.last_fault.borrow().clone()
    }
}

impl<W: SignalValue> fmt::Debug for ApbRequester<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApbRequester")
            .field("name", &self.name)
            .field("clock", &self.clock.name())
            .field("state", &self.state.get())
            .field("busy", &self.busy.get())
            .finish()
    }
}
