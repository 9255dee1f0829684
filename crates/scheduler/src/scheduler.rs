//! Scheduler core
//!
//! Admission, ambient priority and the time-sliced work loop. The scheduler
//! is a cheap-to-clone handle over single-threaded shared state, so task
//! callbacks can hold a clone and schedule more work while they run.

use crate::error::SchedulerError;
use crate::host::{FlushCallback, HostTimingAdapter, TimeoutCallback};
use crate::priority::PriorityLevel;
use crate::store::TaskStore;
use crate::task::{Continuation, Task, TaskHandle, TaskId, TaskResult};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks scheduled
    pub tasks_scheduled: u64,

    /// Tasks whose callback finished without a follow-up
    pub tasks_completed: u64,

    /// Tasks cancelled before their callback ran
    pub tasks_cancelled: u64,

    /// Tasks whose callback failed
    pub tasks_faulted: u64,

    /// Follow-up callbacks returned by tasks
    pub continuations: u64,

    /// Work loop invocations
    pub flushes: u64,

    /// Current ready queue size, including lazily cancelled entries
    pub ready_len: usize,

    /// Current delayed queue size, including lazily cancelled entries
    pub delayed_len: usize,
}

impl SchedulerStats {
    /// Get the number of tasks that have neither finished, failed nor been cancelled
    pub fn pending_tasks(&self) -> u64 {
        self.tasks_scheduled - self.tasks_completed - self.tasks_cancelled - self.tasks_faulted
    }
}

/// Options for [`Scheduler::schedule_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Hold the task back for this long; zero means no delay.
    pub delay: Option<Duration>,
}

impl ScheduleOptions {
    /// Options delaying the task by `delay`
    pub fn delayed(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

struct Inner<H> {
    host: H,
    store: RefCell<TaskStore>,
    next_id: Cell<u64>,
    current_task: RefCell<Option<Rc<Task>>>,
    current_priority: Cell<PriorityLevel>,
    paused: Cell<bool>,
    performing_work: Cell<bool>,
    host_callback_scheduled: Cell<bool>,
    host_timeout_scheduled: Cell<bool>,
    stats: RefCell<SchedulerStats>,
}

/// Cooperative priority scheduler
///
/// Ready tasks run in order of expiration time, ties broken by scheduling
/// order. The loop runs inside host continuations and hands control back
/// when the host's slice is over, unless the next task has expired.
///
/// # Example
///
/// ```
/// use cadence_scheduler::{Continuation, ManualHost, PriorityLevel, Scheduler};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let host = Rc::new(ManualHost::new());
/// let scheduler = Scheduler::new(host.clone());
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = log.clone();
/// scheduler.schedule(PriorityLevel::Normal, move |_| {
///     sink.borrow_mut().push("normal");
///     Ok(Continuation::Done)
/// });
/// let sink = log.clone();
/// scheduler.schedule(PriorityLevel::UserBlocking, move |_| {
///     sink.borrow_mut().push("user-blocking");
///     Ok(Continuation::Done)
/// });
///
/// host.run_until_idle().unwrap();
/// assert_eq!(*log.borrow(), vec!["user-blocking", "normal"]);
/// ```
pub struct Scheduler<H: HostTimingAdapter + 'static> {
    inner: Rc<Inner<H>>,
}

impl<H: HostTimingAdapter + 'static> Clone for Scheduler<H> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<H: HostTimingAdapter + 'static> Scheduler<H> {
    /// Create a scheduler driven by `host`
    pub fn new(host: H) -> Self {
        Self {
            inner: Rc::new(Inner {
                host,
                store: RefCell::new(TaskStore::new()),
                next_id: Cell::new(1),
                current_task: RefCell::new(None),
                current_priority: Cell::new(PriorityLevel::Normal),
                paused: Cell::new(false),
                performing_work: Cell::new(false),
                host_callback_scheduled: Cell::new(false),
                host_timeout_scheduled: Cell::new(false),
                stats: RefCell::new(SchedulerStats::default()),
            }),
        }
    }

    /// Get the host
    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// Current host time
    pub fn now(&self) -> Duration {
        self.inner.host.now()
    }

    /// Schedule `callback` to run as soon as its priority allows
    pub fn schedule<F>(&self, priority: impl Into<PriorityLevel>, callback: F) -> TaskHandle
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        self.schedule_with(priority, ScheduleOptions::default(), callback)
    }

    /// Schedule `callback` to become eligible after `delay`
    pub fn schedule_delayed<F>(
        &self,
        priority: impl Into<PriorityLevel>,
        delay: Duration,
        callback: F,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        self.schedule_with(priority, ScheduleOptions::delayed(delay), callback)
    }

    /// Schedule `callback` with explicit options
    ///
    /// Ready tasks arm a host continuation unless one is already armed or the
    /// loop is running. Delayed tasks arm the host's deferred callback when
    /// they become the earliest pending work.
    pub fn schedule_with<F>(
        &self,
        priority: impl Into<PriorityLevel>,
        options: ScheduleOptions,
        callback: F,
    ) -> TaskHandle
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        let inner = &*self.inner;
        let priority = priority.into();
        let current_time = inner.host.now();
        let start_time = match options.delay {
            Some(delay) if !delay.is_zero() => current_time.saturating_add(delay),
            _ => current_time,
        };

        let id = TaskId(inner.next_id.get());
        inner.next_id.set(id.0 + 1);
        let task = Rc::new(Task::new(id, priority, start_time, Box::new(callback)));
        inner.stats.borrow_mut().tasks_scheduled += 1;

        if start_time > current_time {
            let delay = start_time - current_time;
            debug!(task_id = %id, %priority, delay = ?delay, "scheduled delayed task");

            let is_earliest = {
                let mut store = inner.store.borrow_mut();
                store.push_delayed(Rc::clone(&task));
                store.peek_ready().is_none()
                    && store.peek_delayed().is_some_and(|first| Rc::ptr_eq(&first, &task))
            };
            if is_earliest {
                self.arm_deferred(delay);
            }
        } else {
            debug!(task_id = %id, %priority, "scheduled task");
            inner.store.borrow_mut().push_ready(Rc::clone(&task));
            self.request_host_callback();
        }

        TaskHandle::new(task)
    }

    /// Cancel a task
    ///
    /// Idempotent. The task stays queued and is discarded when it reaches
    /// the front. Returns `true` if a pending callback was dropped.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        let cancelled = handle.cancel();
        if cancelled {
            debug!(task_id = %handle.id(), "cancelled task");
            self.inner.stats.borrow_mut().tasks_cancelled += 1;
        }
        cancelled
    }

    /// Peek at the ready task that would run next
    ///
    /// The task may have been cancelled but not yet discarded.
    pub fn first_pending_task(&self) -> Option<TaskHandle> {
        self.inner.store.borrow().peek_ready().map(TaskHandle::new)
    }

    /// The task whose callback is executing, if any
    pub fn current_task(&self) -> Option<TaskHandle> {
        self.inner.current_task.borrow().clone().map(TaskHandle::new)
    }

    /// Current ambient priority
    pub fn current_priority(&self) -> PriorityLevel {
        self.inner.current_priority.get()
    }

    /// Run `f` with the ambient priority set to `priority`
    ///
    /// The previous priority is restored when `f` returns or unwinds.
    pub fn run_with_priority<F, R>(&self, priority: impl Into<PriorityLevel>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = PriorityGuard::enter(&self.inner.current_priority, priority.into());
        f()
    }

    /// Run `f` one step down from the ambient priority
    ///
    /// Immediate, UserBlocking and Normal run `f` at Normal; Low and Idle
    /// keep their level.
    pub fn run_next<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let priority = match self.current_priority() {
            PriorityLevel::Immediate | PriorityLevel::UserBlocking | PriorityLevel::Normal => {
                PriorityLevel::Normal
            }
            other => other,
        };
        self.run_with_priority(priority, f)
    }

    /// Capture the ambient priority now and reinstate it on every call of
    /// the returned function
    pub fn wrap_with_ambient_priority<F, R>(&self, mut f: F) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        let priority = self.current_priority();
        let scheduler = self.clone();
        move || scheduler.run_with_priority(priority, &mut f)
    }

    /// Stop the work loop from picking up further tasks
    pub fn pause(&self) {
        debug!("scheduler paused");
        self.inner.paused.set(true);
    }

    /// Resume a paused scheduler and arm a continuation
    pub fn resume(&self) {
        debug!("scheduler resumed");
        self.inner.paused.set(false);
        self.request_host_callback();
    }

    /// Check if the scheduler is paused
    pub fn is_paused(&self) -> bool {
        self.inner.paused.get()
    }

    /// Check if the current slice is over
    ///
    /// Long-running callbacks can poll this and return a follow-up.
    pub fn should_yield(&self) -> bool {
        self.inner.host.should_yield()
    }

    /// Signal pending urgent host work such as a paint
    pub fn request_yield_signal(&self) {
        self.inner.host.request_yield_signal();
    }

    /// Tune the slice length to `rate` slices per second
    pub fn set_target_slice_rate(&self, rate: u32) -> Result<(), SchedulerError> {
        self.inner.host.set_target_slice_rate(rate)
    }

    /// Get the number of ready entries
    pub fn ready_len(&self) -> usize {
        self.inner.store.borrow().ready_len()
    }

    /// Get the number of delayed entries
    pub fn delayed_len(&self) -> usize {
        self.inner.store.borrow().delayed_len()
    }

    /// Check if any entries are queued
    pub fn has_pending_work(&self) -> bool {
        !self.inner.store.borrow().is_empty()
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.stats.borrow().clone();
        let store = self.inner.store.borrow();
        stats.ready_len = store.ready_len();
        stats.delayed_len = store.delayed_len();
        stats
    }

    /// Run the work loop once
    ///
    /// This is the callback hosts invoke for a continuation. With
    /// `has_time_budget == false` only expired tasks run. Returns `Ok(true)`
    /// if ready work remains. A failing task is returned as
    /// [`SchedulerError::TaskFault`]; the scheduler stays consistent and a
    /// later flush carries on with the remaining work.
    pub fn flush_work(
        &self,
        has_time_budget: bool,
        initial_time: Duration,
    ) -> Result<bool, SchedulerError> {
        let inner = &*self.inner;
        inner.host_callback_scheduled.set(false);
        if inner.host_timeout_scheduled.replace(false) {
            inner.host.cancel_deferred();
        }

        inner.stats.borrow_mut().flushes += 1;
        let _guard = FlushGuard::enter(inner);
        self.work_loop(has_time_budget, initial_time)
    }

    fn work_loop(&self, has_time_budget: bool, initial_time: Duration) -> Result<bool, SchedulerError> {
        let inner = &*self.inner;
        let mut current_time = initial_time;
        inner.store.borrow_mut().advance(current_time);
        let mut current = self.load_current_task();

        while let Some(task) = current.clone() {
            if inner.paused.get() {
                break;
            }
            if task.expiration_time() > current_time
                && (!has_time_budget || inner.host.should_yield())
            {
                break;
            }

            let Some(callback) = task.take_callback() else {
                inner.store.borrow_mut().pop_ready();
                current = self.load_current_task();
                continue;
            };

            inner.current_priority.set(task.priority());
            let did_timeout = task.expiration_time() <= current_time;
            trace!(task_id = %task.task_id(), priority = %task.priority(), did_timeout, "running task");

            let outcome = callback(did_timeout);
            current_time = inner.host.now();

            match outcome {
                Ok(Continuation::Continue(next)) => {
                    task.set_callback(next);
                    inner.stats.borrow_mut().continuations += 1;
                }
                Ok(Continuation::Done) => {
                    // The callback may have scheduled work that now sits in
                    // front of this task; only pop if it is still the root.
                    inner.store.borrow_mut().pop_ready_if_root(&task);
                    inner.stats.borrow_mut().tasks_completed += 1;
                }
                Err(source) => {
                    inner.stats.borrow_mut().tasks_faulted += 1;
                    warn!(task_id = %task.task_id(), error = %source, "task failed");
                    return Err(SchedulerError::TaskFault { task_id: task.task_id(), source });
                }
            }

            inner.store.borrow_mut().advance(current_time);
            current = self.load_current_task();
        }

        if current.is_some() {
            // Report no immediate work while paused so the host disarms
            // instead of spinning; resume() arms a new continuation.
            return Ok(!inner.paused.get());
        }

        let first_delayed = inner.store.borrow().peek_delayed();
        if let Some(first) = first_delayed {
            self.arm_deferred(first.start_time().saturating_sub(current_time));
        }
        Ok(false)
    }

    /// Deferred callback entry point: promote matured tasks and arm whatever
    /// comes next.
    fn handle_timeout(&self, now: Duration) {
        let inner = &*self.inner;
        inner.host_timeout_scheduled.set(false);
        inner.store.borrow_mut().advance(now);

        if inner.host_callback_scheduled.get() {
            return;
        }

        let (has_ready, first_delayed) = {
            let store = inner.store.borrow();
            (store.peek_ready().is_some(), store.peek_delayed())
        };
        if has_ready {
            self.request_host_callback();
        } else if let Some(first) = first_delayed {
            self.arm_deferred(first.start_time().saturating_sub(now));
        }
    }

    fn load_current_task(&self) -> Option<Rc<Task>> {
        let task = self.inner.store.borrow().peek_ready();
        *self.inner.current_task.borrow_mut() = task.clone();
        task
    }

    fn request_host_callback(&self) {
        let inner = &*self.inner;
        if inner.host_callback_scheduled.get() || inner.performing_work.get() {
            return;
        }
        inner.host_callback_scheduled.set(true);
        inner.host.request_continuation(self.flush_callback());
    }

    fn arm_deferred(&self, delay: Duration) {
        let inner = &*self.inner;
        if inner.host_timeout_scheduled.replace(true) {
            inner.host.cancel_deferred();
        }
        trace!(delay = ?delay, "arming deferred callback");
        inner.host.request_deferred(self.timeout_callback(), delay);
    }

    fn flush_callback(&self) -> FlushCallback {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move |has_time_budget: bool, now: Duration| match weak.upgrade() {
            Some(inner) => Scheduler { inner }.flush_work(has_time_budget, now),
            None => Ok(false),
        })
    }

    fn timeout_callback(&self) -> TimeoutCallback {
        let weak = Rc::downgrade(&self.inner);
        Box::new(move |now: Duration| {
            if let Some(inner) = weak.upgrade() {
                Scheduler { inner }.handle_timeout(now);
            }
        })
    }
}

/// Restores the ambient priority on drop
struct PriorityGuard<'a> {
    slot: &'a Cell<PriorityLevel>,
    previous: PriorityLevel,
}

impl<'a> PriorityGuard<'a> {
    fn enter(slot: &'a Cell<PriorityLevel>, priority: PriorityLevel) -> Self {
        Self { slot, previous: slot.replace(priority) }
    }
}

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        self.slot.set(self.previous);
    }
}

/// Marks the loop as running and resets loop state on drop, including when
/// a task panics.
struct FlushGuard<'a, H> {
    inner: &'a Inner<H>,
    previous_priority: PriorityLevel,
}

impl<'a, H> FlushGuard<'a, H> {
    fn enter(inner: &'a Inner<H>) -> Self {
        inner.performing_work.set(true);
        Self { inner, previous_priority: inner.current_priority.get() }
    }
}

impl<H> Drop for FlushGuard<'_, H> {
    fn drop(&mut self) {
        self.inner.current_task.borrow_mut().take();
        self.inner.current_priority.set(self.previous_priority);
        self.inner.performing_work.set(false);
    }
}
