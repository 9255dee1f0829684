//! Real-clock host for the current thread

use super::{FlushCallback, HostTimingAdapter, MessageLoop, TimeoutCallback};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::slice::SliceBudget;
use std::cell::RefCell;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Probe reporting whether user input is waiting to be handled
pub type InputProbe = Box<dyn Fn() -> bool>;

struct Deferred {
    due: Instant,
    callback: TimeoutCallback,
}

/// Host backed by [`Instant`] that drives the loop on the calling thread
///
/// Time is measured from host creation. [`LocalHost::run_until_idle`]
/// alternates between running slices and sleeping until the deferred
/// callback is due.
pub struct LocalHost {
    origin: Instant,
    budget: RefCell<SliceBudget>,
    message_loop: MessageLoop,
    deferred: RefCell<Option<Deferred>>,
    input_probe: Option<InputProbe>,
}

impl LocalHost {
    /// Create a host with the default slice budget
    pub fn new() -> Self {
        Self::with_budget(SliceBudget::new())
    }

    /// Create a host with a custom slice budget
    pub fn with_budget(budget: SliceBudget) -> Self {
        Self {
            origin: Instant::now(),
            budget: RefCell::new(budget),
            message_loop: MessageLoop::new(),
            deferred: RefCell::new(None),
            input_probe: None,
        }
    }

    /// Create a host from config
    pub fn with_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        Ok(Self::with_budget(SliceBudget::from_config(config)?))
    }

    /// Consult `probe` for pending input once past the slice deadline
    pub fn with_input_probe(mut self, probe: InputProbe) -> Self {
        self.input_probe = Some(probe);
        self
    }

    /// Check if a continuation or deferred callback is armed
    pub fn is_idle(&self) -> bool {
        !self.message_loop.is_running() && self.deferred.borrow().is_none()
    }

    /// Run slices and deferred callbacks until nothing is armed.
    ///
    /// Stops at the first task fault; calling again resumes.
    pub fn run_until_idle(&self) -> Result<(), SchedulerError> {
        loop {
            if self.message_loop.is_running() {
                self.message_loop.perform_work_until_deadline(self.now(), &self.budget)?;
                continue;
            }

            let due = self.deferred.borrow().as_ref().map(|deferred| deferred.due);
            let Some(due) = due else {
                return Ok(());
            };

            let wait = due.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                trace!(wait = ?wait, "sleeping until deferred callback");
                thread::sleep(wait);
            }

            let deferred = self.deferred.borrow_mut().take();
            if let Some(deferred) = deferred {
                (deferred.callback)(self.now());
            }
        }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostTimingAdapter for LocalHost {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn request_continuation(&self, callback: FlushCallback) {
        self.message_loop.request(callback);
    }

    fn request_deferred(&self, callback: TimeoutCallback, delay: Duration) {
        let due = Instant::now() + delay;
        *self.deferred.borrow_mut() = Some(Deferred { due, callback });
    }

    fn cancel_deferred(&self) {
        self.deferred.borrow_mut().take();
    }

    fn should_yield(&self) -> bool {
        let input_pending = self.input_probe.as_ref().is_some_and(|probe| probe());
        self.budget.borrow().should_yield(self.now(), input_pending)
    }

    fn request_yield_signal(&self) {
        self.budget.borrow_mut().request_paint();
    }

    fn set_target_slice_rate(&self, rate: u32) -> Result<(), SchedulerError> {
        self.budget.borrow_mut().set_target_rate(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_new_host_is_idle() {
        let host = LocalHost::new();
        assert!(host.is_idle());
        host.run_until_idle().unwrap();
    }

    #[test]
    #[serial]
    fn test_deferred_waits_for_delay() {
        let host = LocalHost::new();
        let fired_at = Rc::new(Cell::new(None));

        let sink = fired_at.clone();
        host.request_deferred(Box::new(move |now: Duration| sink.set(Some(now))), Duration::from_millis(15));
        assert!(!host.is_idle());

        host.run_until_idle().unwrap();
        let fired_at = fired_at.get().expect("deferred callback should fire");
        assert!(fired_at >= Duration::from_millis(15));
        assert!(host.is_idle());
    }

    #[test]
    #[serial]
    fn test_should_yield_after_slice() {
        let host = Rc::new(LocalHost::with_budget(
            SliceBudget::new().with_yield_interval(Duration::from_millis(2)),
        ));
        let observed = Rc::new(Cell::new((true, false)));

        let (inner, sink) = (host.clone(), observed.clone());
        host.request_continuation(Rc::new(move |_: bool, _: Duration| -> Result<bool, SchedulerError> {
            let before = inner.should_yield();
            thread::sleep(Duration::from_millis(4));
            sink.set((before, inner.should_yield()));
            Ok(false)
        }));

        host.run_until_idle().unwrap();
        assert_eq!(observed.get(), (false, true));
    }

    #[test]
    fn test_input_probe_is_consulted() {
        let host = LocalHost::with_budget(SliceBudget::new().with_pressure_signals(true))
            .with_input_probe(Box::new(|| true));

        // No slice has started, so the deadline is already behind us.
        assert!(host.should_yield());
    }
}
