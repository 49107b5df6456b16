//! Per-clock edge-wait registry.
//!
//! Each clock keeps one FIFO queue of suspended tasks per edge direction.
//! When the clock toggles, the queue for the edge just entered is swapped out
//! for an empty one *before* any entry is resumed. A task that waits on the
//! same edge again while being resumed therefore lands in the fresh queue and
//! waits for the next toggle, never for the one being drained.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use serde::{Deserialize, Serialize};

use crate::clock::ClockHandle;
use crate::task::Executor;

/// Direction of a clock transition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    /// Low to high.
    Rising,
    /// High to low.
    Falling,
}

impl Edge {
    /// Returns the edge that puts a signal into `level`.
    pub fn entering(level: bool) -> Edge {
        if level {
            Edge::Rising
        } else {
            Edge::Falling
        }
    }

    /// Returns the signal level right after this edge.
    pub fn level(self) -> bool {
        matches!(self, Edge::Rising)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => f.write_str("rising"),
            Edge::Falling => f.write_str("falling"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum WaitState {
    Pending,
    Fired,
    Cancelled,
}

struct EdgeWaiter {
    state: Rc<Cell<WaitState>>,
    waker: Waker,
}

/// FIFO queues of tasks suspended on a clock's rising and falling edges.
#[derive(Default)]
pub struct EdgeWaitRegistry {
    rising: RefCell<VecDeque<EdgeWaiter>>,
    falling: RefCell<VecDeque<EdgeWaiter>>,
}

impl EdgeWaitRegistry {
    fn queue(&self, edge: Edge) -> &RefCell<VecDeque<EdgeWaiter>> {
        match edge {
            Edge::Rising => &self.rising,
            Edge::Falling => &self.falling,
        }
    }

    pub(crate) fn enqueue(&self, edge: Edge, waker: Waker) -> Rc<Cell<WaitState>> {
        let state = Rc::new(Cell::new(WaitState::Pending));
        self.queue(edge).borrow_mut().push_back(EdgeWaiter {
            state: Rc::clone(&state),
            waker,
        });
        state
    }

    /// Returns the number of live entries waiting on `edge`.
    pub fn pending(&self, edge: Edge) -> usize {
        self.queue(edge)
            .borrow()
            .iter()
            .filter(|w| w.state.get() == WaitState::Pending)
            .count()
    }

    /// Resumes every task waiting on `edge`, in registration order.
    ///
    /// Each task runs to its next suspension point before the next entry is
    /// resumed. Entries whose wait was dropped are skipped. Returns the
    /// number of entries resumed.
    pub(crate) fn drain(&self, edge: Edge, executor: &Executor) -> usize {
        let batch = std::mem::take(&mut *self.queue(edge).borrow_mut());
        let mut resumed = 0;
        for waiter in batch {
            if waiter.state.get() != WaitState::Pending {
                continue;
            }
            waiter.state.set(WaitState::Fired);
            waiter.waker.wake();
            executor.run_ready();
            resumed += 1;
        }
        resumed
    }
}

impl fmt::Debug for EdgeWaitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeWaitRegistry")
            .field("rising", &self.pending(Edge::Rising))
            .field("falling", &self.pending(Edge::Falling))
            .finish()
    }
}

/// Future that completes at the next occurrence of one edge of one clock.
///
/// The wait is registered on first poll. Dropping a registered wait before
/// its edge withdraws it from the queue.
#[must_use = "futures do nothing unless awaited"]
pub struct EdgeWait {
    clock: ClockHandle,
    edge: Edge,
    state: Option<Rc<Cell<WaitState>>>,
}

impl EdgeWait {
    pub(crate) fn new(clock: ClockHandle, edge: Edge) -> Self {
        Self {
            clock,
            edge,
            state: None,
        }
    }

    /// Returns the edge being waited for.
    pub fn edge(&self) -> Edge {
        self.edge
    }
}

impl Future for EdgeWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match &self.state {
            Some(state) if state.get() == WaitState::Fired => Poll::Ready(()),
            Some(_) => Poll::Pending,
            None => {
                let state = self.clock.waits().enqueue(self.edge, cx.waker().clone());
                self.state = Some(state);
                Poll::Pending
            }
        }
    }
}

impl Drop for EdgeWait {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            if state.get() == WaitState::Pending {
                state.set(WaitState::Cancelled);
            }
        }
    }
}

impl fmt::Debug for EdgeWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeWait")
            .field("clock", &self.clock.name())
            .field("edge", &self.edge)
            .field("state", &self.state.as_ref().map(|s| s.get()))
            .finish()
    }
}
