//! Cooperative deferred scheduling.
//!
//! Two layers:
//!
//! - [`Scheduler`]: the host's "run this later" facility. [`EventLoop`] is a minimal
//!   single-threaded implementation; apps with their own loop can implement the trait instead.
//! - [`UpdateScheduler`]: a per-owner coalescing primitive built on top of a [`Scheduler`]. Any
//!   number of [`UpdateScheduler::request_update`] calls between two flushes collapse into a
//!   single flush task.
//!
//! # Invariants
//!
//! 1. At most one flush task per [`UpdateScheduler`] is queued at any time.
//! 2. A flush never runs inside the call that requested it; it runs on a later
//!    [`EventLoop::run_pending`] iteration.
//! 3. The pending flag is cleared *before* the callback runs, so a request issued by the callback
//!    schedules a fresh flush instead of being lost.
//! 4. After [`UpdateScheduler::cancel`], queued and future flushes are no-ops.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;

use crate::error::Error;
use crate::error::Result;

/// A unit of deferred work. Errors propagate to whoever drives the loop.
pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// The flush callback an [`UpdateScheduler`] invokes.
pub type FlushCallback = Box<dyn FnMut() -> Result<()>>;

pub trait Scheduler {
    /// Queues `task` to run on a later iteration of the host loop.
    fn schedule(&self, task: Task);
}

/// A FIFO task queue driven explicitly by the host.
///
/// Cloning an `EventLoop` yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct EventLoop {
    queue: Rc<RefCell<VecDeque<Task>>>,
    iterations: Rc<Cell<u64>>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending_tasks", &self.pending_tasks())
            .field("iterations", &self.iterations.get())
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Number of completed [`Self::run_pending`] iterations.
    pub fn iterations(&self) -> u64 {
        self.iterations.get()
    }

    /// Runs one iteration: every task queued before this call, in order.
    ///
    /// Tasks scheduled while the iteration runs are left for the next one. If a task fails, its
    /// error is returned immediately and the tasks after it stay queued.
    pub fn run_pending(&self) -> Result<usize> {
        let budget = self.pending_tasks();
        let mut ran = 0usize;
        while ran < budget {
            let Some(task) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            ran += 1;
            task()?;
        }
        self.iterations.set(self.iterations.get() + 1);
        Ok(ran)
    }

    /// Runs iterations until the queue is empty. Returns the total number of tasks run.
    pub fn run_until_idle(&self, max_iterations: usize) -> Result<usize> {
        let mut total = 0usize;
        for _ in 0..max_iterations {
            if self.is_idle() {
                return Ok(total);
            }
            total += self.run_pending()?;
        }
        if self.is_idle() {
            Ok(total)
        } else {
            Err(Error::Unsettled {
                iterations: max_iterations,
            })
        }
    }
}

impl Scheduler for EventLoop {
    fn schedule(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}

struct UpdateState {
    label: &'static str,
    pending: Cell<bool>,
    cancelled: Cell<bool>,
    flushes: Cell<u64>,
    callback: RefCell<Option<FlushCallback>>,
}

/// Coalesces update requests into at most one pending flush.
///
/// This is a cheap, clonable handle; clones share the pending flag. A queued flush task holds only
/// a weak reference, so dropping every handle silently retires it.
#[derive(Clone)]
pub struct UpdateScheduler {
    state: Rc<UpdateState>,
    host: Rc<dyn Scheduler>,
}

impl fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("label", &self.state.label)
            .field("pending", &self.state.pending.get())
            .field("cancelled", &self.state.cancelled.get())
            .field("flushes", &self.state.flushes.get())
            .finish()
    }
}

impl UpdateScheduler {
    pub fn new(host: Rc<dyn Scheduler>) -> Self {
        Self::with_label(host, "update")
    }

    /// Like [`Self::new`]; `label` tags the log records of this scheduler.
    pub fn with_label(host: Rc<dyn Scheduler>, label: &'static str) -> Self {
        Self {
            state: Rc::new(UpdateState {
                label,
                pending: Cell::new(false),
                cancelled: Cell::new(false),
                flushes: Cell::new(0),
                callback: RefCell::new(None),
            }),
            host,
        }
    }

    /// Installs the owner's render callback, replacing any previous one.
    pub fn set_callback(&self, callback: impl FnMut() -> Result<()> + 'static) {
        if self.state.cancelled.get() {
            return;
        }
        *self.state.callback.borrow_mut() = Some(Box::new(callback));
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    /// Number of flushes that reached the callback.
    pub fn flush_count(&self) -> u64 {
        self.state.flushes.get()
    }

    /// Requests a flush. Returns `true` if this call queued a new flush task, `false` if one was
    /// already pending (or the scheduler is cancelled).
    pub fn request_update(&self) -> bool {
        if self.state.cancelled.get() {
            return false;
        }
        if self.state.pending.replace(true) {
            return false;
        }
        tracing::debug!(scheduler = self.state.label, "update requested");
        let weak: Weak<UpdateState> = Rc::downgrade(&self.state);
        self.host.schedule(Box::new(move || match weak.upgrade() {
            Some(state) => flush_state(&state),
            None => Ok(()),
        }));
        true
    }

    /// Runs the pending cycle now: clears the pending flag, then invokes the callback.
    ///
    /// Normally the host calls this through the queued task; calling it directly is allowed, in
    /// which case the queued task later finds nothing pending and does nothing. Callback errors
    /// are returned as-is.
    pub fn flush(&self) -> Result<()> {
        flush_state(&self.state)
    }

    /// Retires this scheduler: drops the callback and turns every queued or future flush into a
    /// no-op. Calling it again has no further effect.
    pub fn cancel(&self) {
        if self.state.cancelled.replace(true) {
            return;
        }
        self.state.pending.set(false);
        let callback = self.state.callback.borrow_mut().take();
        drop(callback);
        tracing::debug!(scheduler = self.state.label, "cancelled");
    }
}

fn flush_state(state: &UpdateState) -> Result<()> {
    if state.cancelled.get() {
        return Ok(());
    }
    if !state.pending.replace(false) {
        return Ok(());
    }

    let Some(mut callback) = state.callback.borrow_mut().take() else {
        tracing::debug!(scheduler = state.label, "flush without callback");
        return Ok(());
    };
    state.flushes.set(state.flushes.get() + 1);
    tracing::debug!(scheduler = state.label, flush = state.flushes.get(), "flush");
    let res = callback();

    if !state.cancelled.get() {
        let mut slot = state.callback.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counting(host: &EventLoop) -> (UpdateScheduler, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let sched = UpdateScheduler::new(Rc::new(host.clone()));
        let hits2 = Rc::clone(&hits);
        sched.set_callback(move || {
            hits2.set(hits2.get() + 1);
            Ok(())
        });
        (sched, hits)
    }

    #[test]
    fn event_loop_defers_tasks_scheduled_mid_iteration() {
        let host = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let host2 = host.clone();
        let order2 = Rc::clone(&order);
        host.schedule(Box::new(move || {
            order2.borrow_mut().push("first");
            let order3 = Rc::clone(&order2);
            host2.schedule(Box::new(move || {
                order3.borrow_mut().push("nested");
                Ok(())
            }));
            Ok(())
        }));

        assert_eq!(host.run_pending().unwrap(), 1);
        assert_eq!(*order.borrow(), vec!["first"]);
        assert_eq!(host.pending_tasks(), 1);
        assert_eq!(host.run_pending().unwrap(), 1);
        assert_eq!(*order.borrow(), vec!["first", "nested"]);
        assert_eq!(host.iterations(), 2);
    }

    #[test]
    fn event_loop_stops_at_failing_task() {
        let host = EventLoop::new();
        host.schedule(Box::new(|| Err(Error::task_failed("boom", "nope"))));
        host.schedule(Box::new(|| Ok(())));

        let err = host.run_pending().unwrap_err();
        assert!(matches!(err, Error::TaskFailed { .. }));
        assert_eq!(host.pending_tasks(), 1);
    }

    #[test]
    fn run_until_idle_reports_runaway_loops() {
        let host = EventLoop::new();
        fn respawn(host: EventLoop) -> Task {
            Box::new(move || {
                let next = respawn(host.clone());
                host.schedule(next);
                Ok(())
            })
        }
        host.schedule(respawn(host.clone()));

        let err = host.run_until_idle(5).unwrap_err();
        assert!(matches!(err, Error::Unsettled { iterations: 5 }));
    }

    #[test]
    fn repeated_requests_coalesce_into_one_flush() {
        let host = EventLoop::new();
        let (sched, hits) = counting(&host);

        assert!(sched.request_update());
        assert!(!sched.request_update());
        assert!(!sched.request_update());
        assert_eq!(host.pending_tasks(), 1);
        assert_eq!(hits.get(), 0);

        host.run_until_idle(8).unwrap();
        assert_eq!(hits.get(), 1);
        assert!(!sched.is_pending());
    }

    #[test]
    fn request_from_inside_callback_schedules_next_cycle() {
        let host = EventLoop::new();
        let sched = UpdateScheduler::new(Rc::new(host.clone()));
        let hits = Rc::new(Cell::new(0));

        let again = sched.clone();
        let hits2 = Rc::clone(&hits);
        sched.set_callback(move || {
            hits2.set(hits2.get() + 1);
            if hits2.get() == 1 {
                assert!(again.request_update());
            }
            Ok(())
        });

        sched.request_update();
        host.run_pending().unwrap();
        assert_eq!(hits.get(), 1);
        assert!(sched.is_pending());
        host.run_pending().unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn direct_flush_consumes_the_pending_cycle() {
        let host = EventLoop::new();
        let (sched, hits) = counting(&host);

        sched.request_update();
        sched.flush().unwrap();
        assert_eq!(hits.get(), 1);

        host.run_until_idle(8).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn callback_errors_reach_the_caller() {
        let host = EventLoop::new();
        let sched = UpdateScheduler::new(Rc::new(host.clone()));
        sched.set_callback(|| Err(Error::task_failed("render", "exploded")));

        sched.request_update();
        assert!(host.run_pending().is_err());
        assert!(!sched.is_pending());
    }

    #[test]
    fn cancel_turns_queued_flush_into_noop() {
        let host = EventLoop::new();
        let (sched, hits) = counting(&host);

        sched.request_update();
        sched.cancel();
        sched.cancel();
        host.run_until_idle(8).unwrap();

        assert_eq!(hits.get(), 0);
        assert!(!sched.request_update());
        assert_eq!(host.pending_tasks(), 0);
    }

    #[test]
    fn dropped_scheduler_retires_its_task() {
        let host = EventLoop::new();
        let (sched, hits) = counting(&host);
        sched.request_update();
        drop(sched);

        host.run_until_idle(8).unwrap();
        assert_eq!(hits.get(), 0);
    }

    proptest! {
        #[test]
        fn bursts_always_flush_once_per_cycle(bursts in prop::collection::vec(1usize..20, 1..10)) {
            let host = EventLoop::new();
            let (sched, hits) = counting(&host);

            for (cycle, n) in bursts.iter().enumerate() {
                for _ in 0..*n {
                    sched.request_update();
                }
                prop_assert_eq!(host.pending_tasks(), 1);
                host.run_pending().unwrap();
                prop_assert_eq!(hits.get() as usize, cycle + 1);
            }
            prop_assert_eq!(sched.flush_count() as usize, bursts.len());
        }
    }
}
