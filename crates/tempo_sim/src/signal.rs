//! Hardware signal storage with single-writer ownership.
//!
//! A signal is a shared storage cell the hardware model and the testbench
//! both see. [`signal`] returns two halves: a [`Driver`], the only handle that
//! can write the cell, and a [`Signal`], a cloneable read handle. Whoever holds
//! the driver (a clock, a bus transaction, the hardware model) is the single
//! writer; handing the driver over is an explicit move.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A value that can live in a signal cell.
///
/// Implemented for `bool` and the unsigned integers up to 64 bits. The raw
/// bit pattern is what trace recorders dump.
pub trait SignalValue: Copy + Default + PartialEq + fmt::Debug + 'static {
    /// Width of the value in bits.
    const WIDTH: u32;

    /// Returns the value as a zero-extended bit pattern.
    fn to_bits(self) -> u64;

    /// Builds a value from the low `WIDTH` bits of `bits`.
    fn from_bits(bits: u64) -> Self;
}

impl SignalValue for bool {
    const WIDTH: u32 = 1;

    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Self {
        bits & 1 == 1
    }
}

macro_rules! impl_signal_value {
    ($($ty:ty),*) => {
        $(
            impl SignalValue for $ty {
                const WIDTH: u32 = <$ty>::BITS;

                fn to_bits(self) -> u64 {
                    self as u64
                }

                fn from_bits(bits: u64) -> Self {
                    bits as $ty
                }
            }
        )*
    };
}

impl_signal_value!(u8, u16, u32, u64);

struct Slot<T> {
    name: String,
    value: Cell<T>,
}

/// Creates a named signal cell, returning its writer and a reader.
pub fn signal<T: SignalValue>(name: impl Into<String>, init: T) -> (Driver<T>, Signal<T>) {
    let slot = Rc::new(Slot {
        name: name.into(),
        value: Cell::new(init),
    });
    (
        Driver {
            slot: Rc::clone(&slot),
        },
        Signal { slot },
    )
}

/// Read handle to a signal cell.
#[derive(Clone)]
pub struct Signal<T: SignalValue> {
    slot: Rc<Slot<T>>,
}

impl<T: SignalValue> Signal<T> {
    /// Returns the current value.
    pub fn get(&self) -> T {
        self.slot.value.get()
    }

    /// Returns the signal name.
    pub fn name(&self) -> &str {
        &self.slot.name
    }
}

impl<T: SignalValue> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({} = {:?})", self.slot.name, self.get())
    }
}

/// Exclusive write capability for a signal cell.
///
/// Deliberately not `Clone`: at most one component writes a given signal.
pub struct Driver<T: SignalValue> {
    slot: Rc<Slot<T>>,
}

impl<T: SignalValue> Driver<T> {
    /// Drives a new value onto the signal.
    pub fn set(&self, value: T) {
        self.slot.value.set(value);
    }

    /// Returns the value currently driven.
    pub fn get(&self) -> T {
        self.slot.value.get()
    }

    /// Returns the signal name.
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Returns a read handle to the same cell.
    pub fn reader(&self) -> Signal<T> {
        Signal {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: SignalValue> fmt::Debug for Driver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Driver({} = {:?})", self.slot.name, self.get())
    }
}

/// A signal a trace recorder can sample.
pub trait Probe {
    /// Name written into the trace.
    fn name(&self) -> &str;

    /// Width in bits.
    fn width(&self) -> u32;

    /// Current value as a zero-extended bit pattern.
    fn bits(&self) -> u64;
}

impl<T: SignalValue> Probe for Signal<T> {
    fn name(&self) -> &str {
        Signal::name(self)
    }

    fn width(&self) -> u32 {
        T::WIDTH
    }

    fn bits(&self) -> u64 {
        self.get().to_bits()
    }
}
