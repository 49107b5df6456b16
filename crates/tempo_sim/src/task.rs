//! Suspendable tasks and the single-threaded executor that resumes them.
//!
//! A task is any `'static` future, typically an `async` block written as a
//! stimulus or checking routine. Tasks suspend at explicit points only:
//! waiting for a clock edge (see [`crate::edge`]) or awaiting another
//! [`Task`]. There are no threads and no preemption; the [`Executor`] polls a
//! task inline, to its next suspension or to completion, whenever something
//! it waits on happens.
//!
//! # Resumption order
//!
//! Woken tasks are queued in a FIFO ready queue and polled one at a time.
//! When a task completes and another task is awaiting it, the awaiter is
//! pushed to the *front* of the ready queue, so it resumes as the very next
//! thing the executor does: the completion step of the sub-task hands its
//! result straight to the awaiter.
//!
//! # Faults
//!
//! A panic inside a task body is caught at the task boundary and stored as
//! [`TaskError::Panicked`]. The executor and every other task keep running.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Opaque identifier of a spawned task.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Returns the raw index.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Failure of a task observed by whoever consumes its result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task body panicked; the panic was contained at the task boundary.
    #[error("task '{task}' panicked: {message}")]
    Panicked {
        /// Name of the task.
        task: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The result was already taken out of the task.
    #[error("result of task '{task}' was already taken")]
    ResultTaken {
        /// Name of the task.
        task: String,
    },
}

/// The ready queue shared with wakers.
///
/// Wakers must be `Send + Sync`, so the queue sits behind a mutex even though
/// only one thread ever touches it.
#[derive(Default)]
struct ReadyQueue {
    ids: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<TaskId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_back(&self, id: TaskId) {
        self.lock().push_back(id);
    }

    fn push_front(&self, id: TaskId) {
        self.lock().push_front(id);
    }

    fn pop_front(&self) -> Option<TaskId> {
        self.lock().pop_front()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

struct TaskWaker {
    id: TaskId,
    ready: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push_back(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push_back(self.id);
    }
}

/// Who to resume when a task completes.
enum Waiter {
    /// Another task on the same executor.
    Task(TaskId),
    /// A future polled outside the executor.
    External(Waker),
}

/// Type-erased view of a task the executor can poll.
trait Runnable {
    fn name(&self) -> &str;
    fn waker(&self) -> &Waker;
    fn poll_task(&self, cx: &mut Context<'_>) -> Poll<()>;
    fn take_waiter(&self) -> Option<Waiter>;
    fn release(&self);
}

struct TaskCore<T> {
    id: TaskId,
    name: String,
    waker: Waker,
    future: RefCell<Option<Pin<Box<dyn Future<Output = T>>>>>,
    output: RefCell<Option<Result<T, TaskError>>>,
    done: Cell<bool>,
    waiter: RefCell<Option<Waiter>>,
}

impl<T: 'static> Runnable for TaskCore<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn waker(&self) -> &Waker {
        &self.waker
    }

    fn poll_task(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut slot = self.future.borrow_mut();
        let Some(future) = slot.as_mut() else {
            return Poll::Ready(());
        };

        let output = match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(Poll::Pending) => return Poll::Pending,
            Ok(Poll::Ready(value)) => Ok(value),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(task = %self.id, name = %self.name, %message, "task panicked");
                Err(TaskError::Panicked {
                    task: self.name.clone(),
                    message,
                })
            }
        };

        let finished = slot.take();
        drop(slot);
        drop(finished);
        *self.output.borrow_mut() = Some(output);
        self.done.set(true);
        Poll::Ready(())
    }

    fn take_waiter(&self) -> Option<Waiter> {
        self.waiter.borrow_mut().take()
    }

    fn release(&self) {
        // A task releasing itself mid-poll keeps its future until the poll returns.
        let future = match self.future.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        drop(future);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

struct ExecutorInner {
    tasks: RefCell<HashMap<TaskId, Rc<dyn Runnable>>>,
    ready: Arc<ReadyQueue>,
    current: Cell<Option<TaskId>>,
    running: Cell<bool>,
    next_id: Cell<u64>,
}

/// Resets the executor's running flag even if a poll unwinds.
struct RunGuard<'a>(&'a Cell<bool>);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Single-threaded cooperative executor.
///
/// Cloning an `Executor` yields another handle to the same task set. One
/// executor belongs to one simulation run; the clocks of that run hold a
/// handle so their edge drains can resume tasks inline.
#[derive(Clone)]
pub struct Executor {
    inner: Rc<ExecutorInner>,
}

impl Executor {
    /// Creates an executor with no tasks.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ExecutorInner {
                tasks: RefCell::new(HashMap::new()),
                ready: Arc::new(ReadyQueue::default()),
                current: Cell::new(None),
                running: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Spawns a task and runs it up to its first suspension point.
    ///
    /// When called from inside another task, the new task starts as soon as
    /// the caller suspends.
    pub fn spawn<T, F>(&self, name: impl Into<String>, future: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        let id = TaskId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let core = Rc::new(TaskCore {
            id,
            name: name.into(),
            waker: Waker::from(Arc::new(TaskWaker {
                id,
                ready: Arc::clone(&self.inner.ready),
            })),
            future: RefCell::new(Some(Box::pin(future))),
            output: RefCell::new(None),
            done: Cell::new(false),
            waiter: RefCell::new(None),
        });
        tracing::debug!(task = %id, name = %core.name, "spawned task");

        let runnable: Rc<dyn Runnable> = core.clone();
        self.inner.tasks.borrow_mut().insert(id, runnable);
        self.inner.ready.push_back(id);
        self.run_ready();

        Task {
            core,
            executor: self.clone(),
        }
    }

    /// Returns the task currently being polled, if any.
    pub fn current(&self) -> Option<TaskId> {
        self.inner.current.get()
    }

    /// Returns the name of a live task.
    pub fn task_name(&self, id: TaskId) -> Option<String> {
        self.inner
            .tasks
            .borrow()
            .get(&id)
            .map(|task| task.name().to_string())
    }

    /// Returns `true` while the executor is draining its ready queue.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Returns the number of tasks that have not yet completed.
    pub fn live_tasks(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// Polls every ready task until the ready queue is empty.
    ///
    /// Re-entrant calls return immediately; the outer drain picks up whatever
    /// was queued. Ids of tasks that completed or were aborted are skipped,
    /// so stale wake-ups never resume a released task.
    pub fn run_ready(&self) {
        if self.inner.running.replace(true) {
            return;
        }
        let _guard = RunGuard(&self.inner.running);

        while let Some(id) = self.inner.ready.pop_front() {
            let task = self.inner.tasks.borrow().get(&id).cloned();
            let Some(task) = task else {
                tracing::trace!(task = %id, "skipping wake-up of released task");
                continue;
            };

            self.inner.current.set(Some(id));
            let mut cx = Context::from_waker(task.waker());
            let poll = task.poll_task(&mut cx);
            self.inner.current.set(None);

            if poll.is_ready() {
                self.inner.tasks.borrow_mut().remove(&id);
                tracing::debug!(task = %id, name = %task.name(), "task completed");
                match task.take_waiter() {
                    Some(Waiter::Task(waiter)) => self.inner.ready.push_front(waiter),
                    Some(Waiter::External(waker)) => waker.wake(),
                    None => {}
                }
            }
        }
    }

    /// Releases every live task and forgets all pending wake-ups.
    ///
    /// Called when a simulation run is torn down; futures are dropped outside
    /// of any executor borrow so their destructors may use the executor.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.inner.tasks.borrow_mut());
        self.inner.ready.clear();
        for task in tasks.into_values() {
            task.release();
        }
    }

    fn schedule(&self, id: TaskId) {
        self.inner.ready.push_back(id);
        self.run_ready();
    }

    fn remove(&self, id: TaskId) -> Option<Rc<dyn Runnable>> {
        self.inner.tasks.borrow_mut().remove(&id)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("live_tasks", &self.live_tasks())
            .field("current", &self.current())
            .finish()
    }
}

/// Owning handle to a spawned task.
///
/// Awaiting the handle suspends the awaiting task until this one completes
/// and yields its result. Dropping the handle detaches the task: it keeps
/// running and its result is discarded. [`Task::abort`] releases it instead.
pub struct Task<T> {
    core: Rc<TaskCore<T>>,
    executor: Executor,
}

impl<T: 'static> Task<T> {
    /// Returns the task id.
    pub fn id(&self) -> TaskId {
        self.core.id
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns `true` once the task has run to completion (or panicked).
    pub fn is_done(&self) -> bool {
        self.core.done.get()
    }

    /// Takes the stored result of a completed task.
    pub fn take_result(&mut self) -> Option<Result<T, TaskError>> {
        self.core.output.borrow_mut().take()
    }

    /// Explicitly resumes the task from outside the executor.
    ///
    /// Resuming a completed task is a usage error. A task resumed while it is
    /// waiting on an edge is polled once and goes back to waiting.
    pub fn resume(&self) -> Result<(), SimError> {
        if self.is_done() {
            return Err(SimError::TaskCompleted {
                task: self.core.name.clone(),
            });
        }
        self.executor.schedule(self.core.id);
        Ok(())
    }

    /// Releases the task without running it further.
    ///
    /// Edge-wait entries the task left queued on clocks are never resumed.
    pub fn abort(self) {
        if let Some(task) = self.executor.remove(self.core.id) {
            tracing::debug!(task = %self.core.id, name = %self.core.name, "task aborted");
            task.release();
        }
    }
}

impl<T: 'static> Future for Task<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.core.done.get() {
            let output = this.core.output.borrow_mut().take();
            return Poll::Ready(output.unwrap_or_else(|| {
                Err(TaskError::ResultTaken {
                    task: this.core.name.clone(),
                })
            }));
        }

        let waiter = match this.executor.current() {
            Some(id) => Waiter::Task(id),
            None => Waiter::External(cx.waker().clone()),
        };
        *this.core.waiter.borrow_mut() = Some(waiter);
        Poll::Pending
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("done", &self.core.done.get())
            .finish()
    }
}
