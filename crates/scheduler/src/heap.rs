//! Array-backed binary min-heap
//!
//! Entries are ordered by `(sort_key, id)`. Ids are unique, so the order is
//! total and two entries never compare equal. There is no arbitrary removal:
//! cancelled entries stay in place and are dropped when they reach the root.

use std::cmp::Ordering;
use std::time::Duration;

/// An entry that can be stored in a [`PriorityQueue`].
pub trait HeapEntry {
    /// Primary ordering key (ascending)
    fn sort_key(&self) -> Duration;

    /// Tie-break key (ascending); must be unique per entry
    fn id(&self) -> u64;
}

fn compare<T: HeapEntry>(a: &T, b: &T) -> Ordering {
    a.sort_key().cmp(&b.sort_key()).then_with(|| a.id().cmp(&b.id()))
}

/// Binary min-heap keyed by `(sort_key, id)`
#[derive(Debug, Clone)]
pub struct PriorityQueue<T> {
    heap: Vec<T>,
}

impl<T: HeapEntry> PriorityQueue<T> {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self { heap: Vec::new() }
    }

    /// Push an entry, sifting it up into place
    pub fn push(&mut self, entry: T) {
        let index = self.heap.len();
        self.heap.push(entry);
        self.sift_up(index);
    }

    /// Peek at the minimum entry
    ///
    /// Returns `None` if the queue is empty.
    pub fn peek(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Remove and return the minimum entry
    ///
    /// Returns `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let first = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(first)
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Check that every parent orders before its children.
    pub fn is_valid(&self) -> bool {
        (1..self.heap.len()).all(|index| {
            let parent = (index - 1) / 2;
            compare(&self.heap[parent], &self.heap[index]) != Ordering::Greater
        })
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if compare(&self.heap[index], &self.heap[parent]) == Ordering::Less {
                self.heap.swap(index, parent);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        let half = len / 2;
        while index < half {
            let left = 2 * index + 1;
            let right = left + 1;

            // Pick the smaller child; the right one may not exist.
            let child = if right < len
                && compare(&self.heap[right], &self.heap[left]) == Ordering::Less
            {
                right
            } else {
                left
            };

            if compare(&self.heap[child], &self.heap[index]) == Ordering::Less {
                self.heap.swap(index, child);
                index = child;
            } else {
                return;
            }
        }
    }
}

impl<T: HeapEntry> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        key: u64,
        id: u64,
    }

    impl HeapEntry for Entry {
        fn sort_key(&self) -> Duration {
            Duration::from_millis(self.key)
        }

        fn id(&self) -> u64 {
            self.id
        }
    }

    fn entry(key: u64, id: u64) -> Entry {
        Entry { key, id }
    }

    #[test]
    fn test_empty_queue() {
        let mut queue: PriorityQueue<Entry> = PriorityQueue::new();
        assert!(queue.is_empty());
        assert!(queue.peek().is_none());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_pop_in_key_order() {
        let mut queue = PriorityQueue::new();
        for (id, key) in [50, 10, 40, 20, 30].into_iter().enumerate() {
            queue.push(entry(key, id as u64));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.peek().map(|e| e.key), Some(10));

        let keys: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.key).collect();
        assert_eq!(keys, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_equal_keys_pop_by_id() {
        let mut queue = PriorityQueue::new();
        queue.push(entry(7, 3));
        queue.push(entry(7, 1));
        queue.push(entry(7, 2));

        assert_eq!(queue.pop().map(|e| e.id), Some(1));
        assert_eq!(queue.pop().map(|e| e.id), Some(2));
        assert_eq!(queue.pop().map(|e| e.id), Some(3));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut queue = PriorityQueue::new();
        queue.push(entry(1, 1));
        assert_eq!(queue.peek(), Some(&entry(1, 1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = PriorityQueue::new();
        queue.push(entry(1, 1));
        queue.push(entry(2, 2));
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_element_pop() {
        let mut queue = PriorityQueue::new();
        queue.push(entry(3, 9));
        assert_eq!(queue.pop(), Some(entry(3, 9)));
        assert!(queue.is_empty());
    }

    mod proptest_heap {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Push(u64),
            Pop,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![3 => (0..100u64).prop_map(Op::Push), 1 => Just(Op::Pop)]
        }

        proptest! {
            #[test]
            fn heap_invariant_holds_after_every_op(ops in prop::collection::vec(op(), 0..200)) {
                let mut queue = PriorityQueue::new();
                let mut next_id = 0;
                for op in ops {
                    match op {
                        Op::Push(key) => {
                            queue.push(entry(key, next_id));
                            next_id += 1;
                        }
                        Op::Pop => {
                            queue.pop();
                        }
                    }
                    prop_assert!(queue.is_valid(), "heap order violated");
                }
            }

            #[test]
            fn drains_in_total_order(keys in prop::collection::vec(0..20u64, 0..100)) {
                let mut queue = PriorityQueue::new();
                for (id, key) in keys.iter().enumerate() {
                    queue.push(entry(*key, id as u64));
                }

                let drained: Vec<_> =
                    std::iter::from_fn(|| queue.pop()).map(|e| (e.key, e.id)).collect();
                let mut expected: Vec<_> =
                    keys.iter().enumerate().map(|(id, key)| (*key, id as u64)).collect();
                expected.sort();
                prop_assert_eq!(drained, expected);
            }
        }
    }
}
