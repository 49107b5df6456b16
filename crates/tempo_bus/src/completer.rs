//! A cycle-based APB memory completer.
//!
//! [`ApbMemory`] is a hardware model in the simulator's sense: it holds
//! state, reads its input signals and drives its outputs each time it is
//! evaluated. Registered behavior happens on rising edges of its clock and
//! acts on the inputs as they were just before the edge, the same way a
//! flip-flop captures its D input.

use serde::{Deserialize, Serialize};
use tempo_sim::{DebugPort, Evaluator, Signal, SignalValue};

use crate::apb::ApbCompleterPins;
use crate::bus::element_bytes;

/// Shape and behavior of an [`ApbMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Number of elements.
    pub words: u32,
    /// Rising edges `pready` stays low at the start of each access phase.
    pub wait_states: u32,
    /// Byte addresses at or above this answer with `pslverr`.
    pub error_above: Option<u32>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            words: 256,
            wait_states: 0,
            error_above: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Inputs<W> {
    psel: bool,
    penable: bool,
    pwrite: bool,
    paddr: u32,
    pwdata: W,
}

/// Memory behind an APB completer interface.
pub struct ApbMemory<W: SignalValue> {
    clk: Signal<bool>,
    pins: ApbCompleterPins<W>,
    config: MemoryConfig,
    mem: Vec<W>,
    last_clk: bool,
    sampled: Option<Inputs<W>>,
    in_access: bool,
    waits_left: u32,
    writes: u64,
    reads: u64,
}

impl<W: SignalValue> ApbMemory<W> {
    /// Creates a zero-filled memory clocked by `clk`.
    pub fn new(clk: Signal<bool>, pins: ApbCompleterPins<W>, config: MemoryConfig) -> Self {
        pins.pready.set(false);
        pins.pslverr.set(false);
        Self {
            last_clk: clk.get(),
            clk,
            pins,
            config,
            mem: vec![W::default(); config.words as usize],
            sampled: None,
            in_access: false,
            waits_left: 0,
            writes: 0,
            reads: 0,
        }
    }

    /// The memory configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Reads an element directly, bypassing the bus.
    pub fn word(&self, index: u32) -> Option<W> {
        self.mem.get(index as usize).copied()
    }

    /// Number of completed write transfers.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Number of completed read transfers.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn index(&self, address: u32) -> Option<usize> {
        if self.config.error_above.is_some_and(|limit| address >= limit) {
            return None;
        }
        let index = (address / element_bytes::<W>()) as usize;
        (index < self.mem.len()).then_some(index)
    }

    fn sample(&self) -> Inputs<W> {
        Inputs {
            psel: self.pins.psel.get(),
            penable: self.pins.penable.get(),
            pwrite: self.pins.pwrite.get(),
            paddr: self.pins.paddr.get(),
            pwdata: self.pins.pwdata.get(),
        }
    }

    fn on_rising_edge(&mut self) {
        let Some(before) = self.sampled else { return };
        if !(before.psel && before.penable && self.in_access) {
            return;
        }
        if self.waits_left > 0 {
            self.waits_left -= 1;
            return;
        }

        // The access phase completes on this edge.
        self.in_access = false;
        if before.pwrite {
            if let Some(index) = self.index(before.paddr) {
                self.mem[index] = before.pwdata;
            }
            self.writes += 1;
        } else {
            self.reads += 1;
        }
    }
}

impl<W: SignalValue> Evaluator for ApbMemory<W> {
    fn evaluate(&mut self) {
        let clk = self.clk.get();
        if clk && !self.last_clk {
            self.on_rising_edge();
        }
        self.last_clk = clk;

        let now = self.sample();
        let access = now.psel && now.penable;
        if !access {
            self.in_access = false;
        } else if !self.in_access {
            self.in_access = true;
            self.waits_left = self.config.wait_states;
        }
        self.sampled = Some(now);

        let index = self.index(now.paddr);
        let ready = access && self.in_access && self.waits_left == 0;
        self.pins.pready.set(ready);
        self.pins.pslverr.set(ready && index.is_none());
        let rdata = match index {
            Some(i) if now.psel && !now.pwrite => self.mem[i],
            _ => W::default(),
        };
        self.pins.prdata.set(rdata);
    }
}

impl<W: SignalValue> DebugPort for ApbMemory<W> {
    /// Reads byte `register` of the memory, little-endian within elements.
    fn peek(&self, register: u32) -> u8 {
        let bytes = element_bytes::<W>();
        match self.mem.get((register / bytes) as usize) {
            Some(word) => (word.to_bits() >> (8 * (register % bytes))) as u8,
            None => 0,
        }
    }

    fn poke(&mut self, register: u32, value: u8) {
        let bytes = element_bytes::<W>();
        let shift = 8 * (register % bytes);
        if let Some(word) = self.mem.get_mut((register / bytes) as usize) {
            let bits = (word.to_bits() & !(0xFF << shift)) | (u64::from(value) << shift);
            *word = W::from_bits(bits);
        }
    }
}
