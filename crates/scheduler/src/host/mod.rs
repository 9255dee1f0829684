//! Host timing contract
//!
//! The scheduler never sleeps or spawns anything itself. It asks its host to
//! run the work loop "soon" and to call back after a delay, and it asks the
//! host whether the current slice is over. How those requests are honoured
//! (a timer wheel, a dedicated thread, an event loop tick) is up to the host.

mod local;
mod manual;

pub use local::{InputProbe, LocalHost};
pub use manual::ManualHost;

use crate::error::SchedulerError;
use crate::slice::SliceBudget;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Work loop entry point handed to [`HostTimingAdapter::request_continuation`].
///
/// Called with `(has_time_budget, now)`. Returns `Ok(true)` while ready work
/// remains.
pub type FlushCallback = Rc<dyn Fn(bool, Duration) -> Result<bool, SchedulerError>>;

/// Deferred callback handed to [`HostTimingAdapter::request_deferred`].
///
/// Called with the current time when it fires.
pub type TimeoutCallback = Box<dyn FnOnce(Duration)>;

/// Services the embedding platform provides to the scheduler
///
/// All methods are called from the scheduler's own execution context and
/// must not invoke the supplied callbacks synchronously.
pub trait HostTimingAdapter {
    /// Monotonic time since the host's epoch
    fn now(&self) -> Duration;

    /// Run `callback` soon on the same execution context.
    ///
    /// Only one continuation is outstanding; a new request replaces the
    /// callback of the previous one.
    fn request_continuation(&self, callback: FlushCallback);

    /// Run `callback` once `delay` has elapsed, replacing any armed one.
    fn request_deferred(&self, callback: TimeoutCallback, delay: Duration);

    /// Disarm the deferred callback, if any.
    fn cancel_deferred(&self);

    /// Check if the work loop should hand control back early
    fn should_yield(&self) -> bool;

    /// Mark urgent host work (such as a pending paint) for the current slice
    fn request_yield_signal(&self);

    /// Tune the slice length to `rate` slices per second
    fn set_target_slice_rate(&self, rate: u32) -> Result<(), SchedulerError>;
}

impl<H: HostTimingAdapter + ?Sized> HostTimingAdapter for Rc<H> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn request_continuation(&self, callback: FlushCallback) {
        (**self).request_continuation(callback)
    }

    fn request_deferred(&self, callback: TimeoutCallback, delay: Duration) {
        (**self).request_deferred(callback, delay)
    }

    fn cancel_deferred(&self) {
        (**self).cancel_deferred()
    }

    fn should_yield(&self) -> bool {
        (**self).should_yield()
    }

    fn request_yield_signal(&self) {
        (**self).request_yield_signal()
    }

    fn set_target_slice_rate(&self, rate: u32) -> Result<(), SchedulerError> {
        (**self).set_target_slice_rate(rate)
    }
}

/// Single-flight continuation slot shared by the bundled hosts
///
/// Holds the flush callback and whether a continuation is outstanding, and
/// runs one slice at a time.
#[derive(Default)]
pub struct MessageLoop {
    callback: RefCell<Option<FlushCallback>>,
    running: Cell<bool>,
}

impl MessageLoop {
    /// Create an idle message loop
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `callback` and mark a continuation as outstanding.
    ///
    /// Returns `true` if no continuation was outstanding before, meaning the
    /// host has to post a new tick.
    pub fn request(&self, callback: FlushCallback) -> bool {
        *self.callback.borrow_mut() = Some(callback);
        !self.running.replace(true)
    }

    /// Check if a continuation is outstanding
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Run one slice of work starting at `now`.
    ///
    /// The continuation stays outstanding while the flush reports more work,
    /// and also when it fails or panics so later ticks can drain what is
    /// left. It is dropped once the flush reports no immediate work.
    pub fn perform_work_until_deadline(
        &self,
        now: Duration,
        budget: &RefCell<SliceBudget>,
    ) -> Result<bool, SchedulerError> {
        let callback = self.callback.borrow().clone();
        let Some(callback) = callback else {
            self.running.set(false);
            return Ok(false);
        };

        budget.borrow_mut().begin_slice(now);
        let result = callback(true, now);
        if let Ok(false) = result {
            self.running.set(false);
            self.callback.borrow_mut().take();
        }
        budget.borrow_mut().end_slice();
        result
    }
}
