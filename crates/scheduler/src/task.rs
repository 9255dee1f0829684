//! Tasks and task handles
//!
//! A task owns its callback until the work loop takes it. Cancelling a task
//! only clears the callback slot; the task itself stays in whichever queue
//! holds it and is discarded once it surfaces at the root.

use crate::heap::HeapEntry;
use crate::priority::PriorityLevel;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Unique task identifier, assigned in scheduling order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// Raw id value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a task callback asks the scheduler to do next.
pub enum Continuation {
    /// The task is finished and leaves the queue.
    Done,

    /// More work remains; the task keeps its place and expiration time and
    /// runs this callback on a later turn of the loop.
    Continue(TaskCallback),
}

impl Continuation {
    /// Wrap a follow-up callback.
    pub fn then<F>(callback: F) -> Self
    where
        F: FnOnce(bool) -> TaskResult + 'static,
    {
        Continuation::Continue(Box::new(callback))
    }

    /// Check if this is a follow-up
    pub fn is_continue(&self) -> bool {
        matches!(self, Continuation::Continue(_))
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Done => f.write_str("Done"),
            Continuation::Continue(_) => f.write_str("Continue(..)"),
        }
    }
}

/// Result of running a task callback; `Err` is a task fault.
pub type TaskResult = anyhow::Result<Continuation>;

/// A task callback. The argument is `true` when the task had already expired
/// by the time it was run.
pub type TaskCallback = Box<dyn FnOnce(bool) -> TaskResult>;

/// A unit of schedulable work
pub(crate) struct Task {
    id: TaskId,
    priority: PriorityLevel,
    start_time: Duration,
    expiration_time: Duration,

    /// Start time while delayed, expiration time while ready
    sort_key: Cell<Duration>,

    /// `None` once cancelled or taken for execution
    callback: RefCell<Option<TaskCallback>>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        priority: PriorityLevel,
        start_time: Duration,
        callback: TaskCallback,
    ) -> Self {
        Self {
            id,
            priority,
            start_time,
            expiration_time: priority.expiration_for(start_time),
            sort_key: Cell::new(start_time),
            callback: RefCell::new(Some(callback)),
        }
    }

    pub(crate) fn task_id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn priority(&self) -> PriorityLevel {
        self.priority
    }

    pub(crate) fn start_time(&self) -> Duration {
        self.start_time
    }

    pub(crate) fn expiration_time(&self) -> Duration {
        self.expiration_time
    }

    /// Must only change while the task is outside every queue.
    pub(crate) fn set_sort_key(&self, key: Duration) {
        self.sort_key.set(key);
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.callback.borrow().is_some()
    }

    pub(crate) fn take_callback(&self) -> Option<TaskCallback> {
        self.callback.borrow_mut().take()
    }

    pub(crate) fn set_callback(&self, callback: TaskCallback) {
        *self.callback.borrow_mut() = Some(callback);
    }
}

impl HeapEntry for Rc<Task> {
    fn sort_key(&self) -> Duration {
        self.sort_key.get()
    }

    fn id(&self) -> u64 {
        self.id.0
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("start_time", &self.start_time)
            .field("expiration_time", &self.expiration_time)
            .field("sort_key", &self.sort_key.get())
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

/// Handle to a scheduled task
///
/// Clones share the same task. Dropping a handle does not cancel the task.
#[derive(Clone)]
pub struct TaskHandle {
    task: Rc<Task>,
}

impl TaskHandle {
    pub(crate) fn new(task: Rc<Task>) -> Self {
        Self { task }
    }

    /// Task id
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    /// Priority the task was scheduled with
    pub fn priority(&self) -> PriorityLevel {
        self.task.priority
    }

    /// Time at which the task became, or becomes, eligible to run
    pub fn start_time(&self) -> Duration {
        self.task.start_time
    }

    /// Time after which the task runs regardless of yield pressure
    pub fn expiration_time(&self) -> Duration {
        self.task.expiration_time
    }

    /// Drop the pending callback. Returns `true` if there was one.
    pub(crate) fn cancel(&self) -> bool {
        self.task.take_callback().is_some()
    }

    /// Check if the task no longer holds a callback
    ///
    /// True after cancellation and after the task has finished. It is also
    /// true while the task's own callback is executing.
    pub fn is_cancelled(&self) -> bool {
        !self.task.has_callback()
    }

    /// Check if two handles refer to the same task
    pub fn ptr_eq(&self, other: &TaskHandle) -> bool {
        Rc::ptr_eq(&self.task, &other.task)
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.task).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TaskCallback {
        Box::new(|_| Ok(Continuation::Done))
    }

    #[test]
    fn test_new_task_fields() {
        let task = Task::new(TaskId(7), PriorityLevel::Normal, Duration::from_millis(10), noop());

        assert_eq!(task.task_id(), TaskId(7));
        assert_eq!(task.priority(), PriorityLevel::Normal);
        assert_eq!(task.start_time(), Duration::from_millis(10));
        assert_eq!(task.expiration_time(), Duration::from_millis(5_010));
        assert!(task.has_callback());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let handle = TaskHandle::new(Rc::new(Task::new(
            TaskId(1),
            PriorityLevel::Low,
            Duration::ZERO,
            noop(),
        )));

        assert!(!handle.is_cancelled());
        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_cancel_visible_through_clones() {
        let handle =
            TaskHandle::new(Rc::new(Task::new(TaskId(1), PriorityLevel::Idle, Duration::ZERO, noop())));
        let other = handle.clone();

        handle.cancel();
        assert!(other.is_cancelled());
        assert_eq!(handle, other);
    }

    #[test]
    fn test_sort_key_follows_setter() {
        let task = Rc::new(Task::new(
            TaskId(3),
            PriorityLevel::UserBlocking,
            Duration::from_millis(100),
            noop(),
        ));
        assert_eq!(task.sort_key(), Duration::from_millis(100));

        task.set_sort_key(task.expiration_time());
        assert_eq!(task.sort_key(), Duration::from_millis(350));
        assert_eq!(HeapEntry::id(&task), 3);
    }

    #[test]
    fn test_continuation_then() {
        let next = Continuation::then(|_| Ok(Continuation::Done));
        assert!(next.is_continue());
        assert!(!Continuation::Done.is_continue());
        assert_eq!(format!("{next:?}"), "Continue(..)");
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(12).to_string(), "#12");
        assert_eq!(TaskId(12).get(), 12);
    }
}
