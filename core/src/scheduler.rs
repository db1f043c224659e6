//! Next-tick scheduling.
//!
//! The [`Scheduler`] models the host's micro-task checkpoint: the first
//! [`Scheduler::schedule`] into an idle queue arms exactly one flush, and the
//! host drains armed flushes with [`Scheduler::run_microtasks`]. A flush runs a
//! snapshot of the queue, so callbacks scheduled while flushing land in the
//! next flush instead of extending the current one.
//!
//! Macro tasks ([`Scheduler::after_flush`]) run one at a time from
//! [`Scheduler::run_until_idle`], each followed by a micro-task checkpoint.
//! Hosts with their own event loop call [`Scheduler::run_macrotask`] directly.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() -> anyhow::Result<()>>;

#[derive(Default)]
struct SchedulerInner {
    queue: RefCell<VecDeque<Task>>,
    macrotasks: RefCell<VecDeque<Task>>,
    armed: Cell<bool>,
    flushing: Cell<bool>,
    flushes: Cell<u64>,
}

/// Single-threaded FIFO of pending callbacks, flushed once per micro-task turn.
#[derive(Clone, Default)]
pub struct Scheduler(Rc<SchedulerInner>);

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.0.queue.borrow().len())
            .field("macrotasks", &self.0.macrotasks.borrow().len())
            .field("armed", &self.0.armed.get())
            .field("flushes", &self.0.flushes.get())
            .finish()
    }
}

impl Scheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `task` to the queue, arming a flush if none is pending.
    pub fn schedule(&self, task: impl FnOnce() -> anyhow::Result<()> + 'static) {
        self.0.queue.borrow_mut().push_back(Box::new(task));
        if !self.0.armed.get() {
            self.0.armed.set(true);
        }
    }

    /// Drains the tasks queued so far, in FIFO order.
    ///
    /// Every task in the snapshot runs even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a task of this flush.
    pub fn flush(&self) -> anyhow::Result<()> {
        let batch = std::mem::take(&mut *self.0.queue.borrow_mut());
        if batch.is_empty() {
            return Ok(());
        }
        let count = self.0.flushes.get() + 1;
        self.0.flushes.set(count);
        tracing::trace!(flush = count, tasks = batch.len(), "flushing scheduler queue");

        self.0.flushing.set(true);
        let mut first_error = None;
        for task in batch {
            if let Err(error) = task() {
                first_error.get_or_insert(error);
            }
        }
        self.0.flushing.set(false);
        first_error.map_or(Ok(()), Err)
    }

    /// Runs armed flushes until the queue stays empty (one micro-task checkpoint).
    ///
    /// Returns how many flushes ran.
    ///
    /// # Errors
    ///
    /// Stops at, and returns, the first flush that failed. Tasks queued after
    /// it remain queued and armed for the next checkpoint.
    pub fn run_microtasks(&self) -> anyhow::Result<usize> {
        let mut flushes = 0;
        while self.0.armed.get() {
            self.0.armed.set(false);
            flushes += 1;
            let result = self.flush();
            if !self.0.queue.borrow().is_empty() {
                self.0.armed.set(true);
            }
            result?;
        }
        Ok(flushes)
    }

    /// Runs `task` once the queue is fully drained. If work is pending when the
    /// macro task comes up, it is retried on the following macro task.
    pub fn after_flush(&self, task: impl FnOnce() -> anyhow::Result<()> + 'static) {
        self.defer(Box::new(task));
    }

    fn defer(&self, task: Task) {
        let scheduler = self.clone();
        self.0.macrotasks.borrow_mut().push_back(Box::new(move || {
            if scheduler.is_pending() {
                scheduler.defer(task);
                Ok(())
            } else {
                task()
            }
        }));
    }

    /// Runs the oldest macro task without a micro-task checkpoint first.
    ///
    /// Returns `false` when no macro task was queued.
    ///
    /// # Errors
    ///
    /// Returns the task's error.
    pub fn run_macrotask(&self) -> anyhow::Result<bool> {
        let next = self.0.macrotasks.borrow_mut().pop_front();
        match next {
            Some(task) => task().map(|()| true),
            None => Ok(false),
        }
    }

    /// Drives micro-tasks and macro tasks until nothing is left.
    ///
    /// # Errors
    ///
    /// Returns the first error from a flush or a macro task.
    pub fn run_until_idle(&self) -> anyhow::Result<()> {
        loop {
            self.run_microtasks()?;
            if !self.run_macrotask()? {
                return Ok(());
            }
        }
    }

    /// Number of queued macro tasks.
    #[must_use]
    pub fn macrotask_count(&self) -> usize {
        self.0.macrotasks.borrow().len()
    }

    /// Returns `true` while callbacks are queued or a flush is armed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.armed.get() || !self.0.queue.borrow().is_empty()
    }

    /// Returns `true` while a flush is executing.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.0.flushing.get()
    }

    /// Number of flushes executed so far.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.0.flushes.get()
    }
}
