//! Virtual-clock host
//!
//! Nothing happens until the embedder pumps it: `run_continuation` runs one
//! slice and `fire_deferred` fires the deferred callback once the virtual
//! clock has reached it. Time only moves through `advance` and `set_time`,
//! which makes runs fully deterministic.

use super::{FlushCallback, HostTimingAdapter, MessageLoop, TimeoutCallback};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::slice::SliceBudget;
use std::cell::{Cell, RefCell};
use std::time::Duration;
use tracing::trace;

struct Deferred {
    due: Duration,
    callback: TimeoutCallback,
}

/// Host driven by explicit calls against a virtual clock
///
/// # Example
///
/// ```
/// use cadence_scheduler::{Continuation, ManualHost, PriorityLevel, Scheduler};
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let host = Rc::new(ManualHost::new());
/// let scheduler = Scheduler::new(host.clone());
///
/// scheduler.schedule_delayed(PriorityLevel::Normal, Duration::from_millis(100), |_| {
///     Ok(Continuation::Done)
/// });
/// assert!(scheduler.first_pending_task().is_none());
///
/// host.run_until_idle().unwrap();
/// assert_eq!(host.now_ms(), 100);
/// assert!(!scheduler.has_pending_work());
/// ```
pub struct ManualHost {
    clock: Cell<Duration>,
    budget: RefCell<SliceBudget>,
    message_loop: MessageLoop,
    deferred: RefCell<Option<Deferred>>,
    input_pending: Cell<bool>,
}

impl ManualHost {
    /// Create a host at time zero with the default slice budget
    pub fn new() -> Self {
        Self::with_budget(SliceBudget::new())
    }

    /// Create a host with a custom slice budget
    pub fn with_budget(budget: SliceBudget) -> Self {
        Self {
            clock: Cell::new(Duration::ZERO),
            budget: RefCell::new(budget),
            message_loop: MessageLoop::new(),
            deferred: RefCell::new(None),
            input_pending: Cell::new(false),
        }
    }

    /// Create a host from config
    pub fn with_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        Ok(Self::with_budget(SliceBudget::from_config(config)?))
    }

    /// Move the virtual clock forward
    pub fn advance(&self, by: Duration) {
        self.clock.set(self.clock.get().saturating_add(by));
    }

    /// Set the virtual clock; it never moves backwards.
    pub fn set_time(&self, now: Duration) {
        if now > self.clock.get() {
            self.clock.set(now);
        }
    }

    /// Current virtual time in whole milliseconds
    pub fn now_ms(&self) -> u128 {
        self.clock.get().as_millis()
    }

    /// Simulate pending user input
    pub fn set_input_pending(&self, pending: bool) {
        self.input_pending.set(pending);
    }

    /// Check if a continuation is armed
    pub fn has_pending_continuation(&self) -> bool {
        self.message_loop.is_running()
    }

    /// When the armed deferred callback is due, if any
    pub fn deferred_due(&self) -> Option<Duration> {
        self.deferred.borrow().as_ref().map(|deferred| deferred.due)
    }

    /// Snapshot of the slice budget
    pub fn budget(&self) -> SliceBudget {
        self.budget.borrow().clone()
    }

    /// Run one slice if a continuation is armed.
    ///
    /// Returns `Ok(true)` if work remains and the continuation is still armed.
    pub fn run_continuation(&self) -> Result<bool, SchedulerError> {
        if !self.message_loop.is_running() {
            return Ok(false);
        }
        self.message_loop.perform_work_until_deadline(self.clock.get(), &self.budget)
    }

    /// Fire the deferred callback if the clock has reached it.
    ///
    /// Returns `true` if it fired.
    pub fn fire_deferred(&self) -> bool {
        let now = self.clock.get();
        let due = matches!(self.deferred_due(), Some(at) if at <= now);
        if !due {
            return false;
        }

        let deferred = self.deferred.borrow_mut().take();
        match deferred {
            Some(deferred) => {
                trace!(now = ?now, "firing deferred callback");
                (deferred.callback)(now);
                true
            }
            None => false,
        }
    }

    /// Pump until nothing is armed.
    ///
    /// Continuations run first; when none is armed the clock jumps to the
    /// deferred callback and fires it. Stops at the first task fault, leaving
    /// the host armed so a later call resumes.
    pub fn run_until_idle(&self) -> Result<(), SchedulerError> {
        loop {
            if self.message_loop.is_running() {
                self.run_continuation()?;
            } else if let Some(due) = self.deferred_due() {
                self.set_time(due);
                self.fire_deferred();
            } else {
                return Ok(());
            }
        }
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTimingAdapter for ManualHost {
    fn now(&self) -> Duration {
        self.clock.get()
    }

    fn request_continuation(&self, callback: FlushCallback) {
        self.message_loop.request(callback);
    }

    fn request_deferred(&self, callback: TimeoutCallback, delay: Duration) {
        let due = self.clock.get().saturating_add(delay);
        *self.deferred.borrow_mut() = Some(Deferred { due, callback });
    }

    fn cancel_deferred(&self) {
        self.deferred.borrow_mut().take();
    }

    fn should_yield(&self) -> bool {
        self.budget.borrow().should_yield(self.clock.get(), self.input_pending.get())
    }

    fn request_yield_signal(&self) {
        self.budget.borrow_mut().request_paint();
    }

    fn set_target_slice_rate(&self, rate: u32) -> Result<(), SchedulerError> {
        self.budget.borrow_mut().set_target_rate(rate)
    }
}
