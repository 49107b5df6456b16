//! Collaborator interfaces for the hardware model.
//!
//! The simulator never looks inside the model. It asks the model to settle
//! its combinational logic once per tick through [`Evaluator`], and offers
//! testbenches byte-level backdoor access through [`DebugPort`].

use std::cell::RefCell;
use std::rc::Rc;

/// A hardware model that recomputes its outputs from its current inputs.
pub trait Evaluator {
    /// Propagates the current input values through the model.
    fn evaluate(&mut self);
}

impl Evaluator for () {
    fn evaluate(&mut self) {}
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(&mut self) {
        (**self).evaluate();
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Rc<RefCell<E>> {
    fn evaluate(&mut self) {
        self.borrow_mut().evaluate();
    }
}

/// Adapts a closure into an [`Evaluator`].
pub struct FnEvaluator<F>(pub F);

impl<F: FnMut()> Evaluator for FnEvaluator<F> {
    fn evaluate(&mut self) {
        (self.0)();
    }
}

/// Several models evaluated one after another.
impl<E: Evaluator> Evaluator for Vec<E> {
    fn evaluate(&mut self) {
        for model in self.iter_mut() {
            model.evaluate();
        }
    }
}

/// Backdoor access to model state that bypasses the bus protocol.
///
/// `register` addresses a byte of state (a memory word, a CSR) in whatever
/// numbering the model chooses. Reads of unmapped registers return zero and
/// writes to them are ignored.
pub trait DebugPort {
    /// Reads one byte.
    fn peek(&self, register: u32) -> u8;

    /// Writes one byte.
    fn poke(&mut self, register: u32, value: u8);
}

impl<D: DebugPort + ?Sized> DebugPort for Rc<RefCell<D>> {
    fn peek(&self, register: u32) -> u8 {
        self.borrow().peek(register)
    }

    fn poke(&mut self, register: u32, value: u8) {
        self.borrow_mut().poke(register, value);
    }
}
