//! Ready and delayed task queues
//!
//! The delayed queue is keyed by start time and the ready queue by
//! expiration time. [`TaskStore::advance`] moves tasks across as time passes.

use crate::heap::PriorityQueue;
use crate::task::Task;
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
pub(crate) struct TaskStore {
    ready: PriorityQueue<Rc<Task>>,
    delayed: PriorityQueue<Rc<Task>>,
}

impl TaskStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_ready(&mut self, task: Rc<Task>) {
        task.set_sort_key(task.expiration_time());
        self.ready.push(task);
    }

    pub(crate) fn push_delayed(&mut self, task: Rc<Task>) {
        task.set_sort_key(task.start_time());
        self.delayed.push(task);
    }

    pub(crate) fn peek_ready(&self) -> Option<Rc<Task>> {
        self.ready.peek().cloned()
    }

    pub(crate) fn peek_delayed(&self) -> Option<Rc<Task>> {
        self.delayed.peek().cloned()
    }

    pub(crate) fn pop_ready(&mut self) -> Option<Rc<Task>> {
        self.ready.pop()
    }

    /// Pop the ready root only if it is `task`.
    ///
    /// A callback may schedule work that displaces its own task from the
    /// root, in which case the task stays queued without a callback and is
    /// discarded later.
    pub(crate) fn pop_ready_if_root(&mut self, task: &Rc<Task>) -> bool {
        match self.ready.peek() {
            Some(root) if Rc::ptr_eq(root, task) => {
                self.ready.pop();
                true
            }
            _ => false,
        }
    }

    /// Promote every delayed task whose start time has passed.
    ///
    /// Cancelled delayed tasks at the root are dropped on the way. The scan
    /// stops at the first task that is not yet eligible: the queue is ordered
    /// by start time, so nothing behind it is eligible either.
    pub(crate) fn advance(&mut self, now: Duration) {
        while let Some(top) = self.delayed.peek() {
            if !top.has_callback() {
                self.delayed.pop();
            } else if top.start_time() <= now {
                if let Some(task) = self.delayed.pop() {
                    trace!(task_id = %task.task_id(), "promoting delayed task");
                    self.push_ready(task);
                }
            } else {
                return;
            }
        }
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub(crate) fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_valid(&self) -> bool {
        self.ready.is_valid() && self.delayed.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapEntry;
    use crate::priority::PriorityLevel;
    use crate::task::{Continuation, TaskId};

    fn task(id: u64, priority: PriorityLevel, start_ms: u64) -> Rc<Task> {
        Rc::new(Task::new(
            TaskId(id),
            priority,
            Duration::from_millis(start_ms),
            Box::new(|_| Ok(Continuation::Done)),
        ))
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_advance_promotes_eligible_tasks() {
        let mut store = TaskStore::new();
        store.push_delayed(task(1, PriorityLevel::Normal, 100));
        store.push_delayed(task(2, PriorityLevel::Normal, 200));

        store.advance(ms(50));
        assert_eq!(store.ready_len(), 0);
        assert_eq!(store.delayed_len(), 2);

        store.advance(ms(100));
        assert_eq!(store.ready_len(), 1);
        assert_eq!(store.delayed_len(), 1);

        let promoted = store.peek_ready().unwrap();
        assert_eq!(promoted.task_id(), TaskId(1));
        assert_eq!(promoted.sort_key(), promoted.expiration_time());
        assert!(store.is_valid());
    }

    #[test]
    fn test_advance_drops_cancelled_delayed_tasks() {
        let mut store = TaskStore::new();
        let cancelled = task(1, PriorityLevel::Normal, 100);
        store.push_delayed(cancelled.clone());
        store.push_delayed(task(2, PriorityLevel::Normal, 500));

        cancelled.take_callback();
        store.advance(ms(150));

        assert_eq!(store.ready_len(), 0);
        assert_eq!(store.delayed_len(), 1);
        assert_eq!(store.peek_delayed().unwrap().task_id(), TaskId(2));
    }

    #[test]
    fn test_promoted_tasks_order_by_expiration() {
        let mut store = TaskStore::new();
        store.push_delayed(task(1, PriorityLevel::Low, 10));
        store.push_delayed(task(2, PriorityLevel::UserBlocking, 20));

        store.advance(ms(30));

        assert_eq!(store.pop_ready().unwrap().task_id(), TaskId(2));
        assert_eq!(store.pop_ready().unwrap().task_id(), TaskId(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_pop_ready_if_root() {
        let mut store = TaskStore::new();
        let normal = task(1, PriorityLevel::Normal, 0);
        store.push_ready(normal.clone());

        let urgent = task(2, PriorityLevel::Immediate, 0);
        store.push_ready(urgent.clone());

        assert!(!store.pop_ready_if_root(&normal));
        assert_eq!(store.ready_len(), 2);

        assert!(store.pop_ready_if_root(&urgent));
        assert!(store.pop_ready_if_root(&normal));
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_reads() {
        let mut store = TaskStore::new();
        assert!(store.peek_ready().is_none());
        assert!(store.peek_delayed().is_none());
        assert!(store.pop_ready().is_none());
        store.advance(ms(1_000));
        assert!(store.is_empty());
    }
}
