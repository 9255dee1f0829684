//! Cadence Scheduler Library
//!
//! Cooperative, priority-based task scheduler for a single execution context.
//!
//! Work is queued at one of five priority levels. Each level gives a task a
//! timeout; ready tasks run in order of expiration time, with ties broken by
//! scheduling order. The work loop runs in short slices handed out by a host
//! and gives control back when a slice is over, except for tasks that have
//! already expired, which always run. Tasks can be delayed, cancelled, and
//! can split long work by returning a follow-up callback.
//!
//! The platform side (clock, "run soon" and "run later" callbacks, yield
//! pressure) sits behind [`HostTimingAdapter`]. [`ManualHost`] drives the
//! loop against a virtual clock and [`LocalHost`] against the real one.
//!
//! # Example
//!
//! ```
//! use cadence_scheduler::{Continuation, ManualHost, PriorityLevel, Scheduler};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let host = Rc::new(ManualHost::new());
//! let scheduler = Scheduler::new(host.clone());
//!
//! // Split a large job into chunks, yielding between them when asked to.
//! let remaining = Rc::new(Cell::new(3));
//! fn chunk(remaining: Rc<Cell<u32>>) -> cadence_scheduler::TaskResult {
//!     remaining.set(remaining.get() - 1);
//!     if remaining.get() == 0 {
//!         Ok(Continuation::Done)
//!     } else {
//!         Ok(Continuation::then(move |_| chunk(remaining)))
//!     }
//! }
//!
//! let counter = remaining.clone();
//! let handle = scheduler.schedule(PriorityLevel::Low, move |_| chunk(counter));
//!
//! host.run_until_idle().unwrap();
//! assert_eq!(remaining.get(), 0);
//! assert!(handle.is_cancelled());
//! ```

mod config;
mod error;
mod heap;
mod host;
mod priority;
mod scheduler;
mod slice;
mod store;
mod task;

// Re-export public API
pub use config::SchedulerConfig;
pub use error::{SchedulerError, MAX_SLICE_RATE};
pub use heap::{HeapEntry, PriorityQueue};
pub use host::{
    FlushCallback, HostTimingAdapter, InputProbe, LocalHost, ManualHost, MessageLoop,
    TimeoutCallback,
};
pub use priority::PriorityLevel;
pub use scheduler::{ScheduleOptions, Scheduler, SchedulerStats};
pub use slice::{SliceBudget, DEFAULT_YIELD_INTERVAL, MAX_YIELD_INTERVAL};
pub use task::{Continuation, TaskCallback, TaskHandle, TaskId, TaskResult};
