/// A binary min-heap ordered by `(sort_index, id)`.
///
/// The scheduler keeps two of these: the ready queue (keyed by expiration
/// time) and the delayed queue (keyed by start time). Ties on `sort_index` are
/// broken by the monotonically increasing task id, which gives FIFO order
/// among tasks of equal priority scheduled in the same tick.
use std::cmp::Ordering;
use std::rc::Rc;

use crate::platform::Time;

const INITIAL_CAPACITY: usize = 16;

/// Ordering key accessors for heap entries.
pub trait HeapNode {
    fn sort_index(&self) -> Time;
    fn id(&self) -> u64;
}

impl<T: HeapNode + ?Sized> HeapNode for Rc<T> {
    fn sort_index(&self) -> Time {
        (**self).sort_index()
    }

    fn id(&self) -> u64 {
        (**self).id()
    }
}

#[derive(Debug)]
pub struct MinHeap<T: HeapNode> {
    /// Invariant: values[i] <= values[2*i+1] && values[i] <= values[2*i+2]
    values: Vec<T>,
}

impl<T: HeapNode> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HeapNode> MinHeap<T> {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the minimum entry without removing it.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.values.first()
    }

    /// Time complexity: O(log N)
    pub fn push(&mut self, value: T) {
        self.values.push(value);
        let last = self.values.len() - 1;
        self.shift_up(last);
    }

    /// Removes and returns the minimum entry. Popping an empty heap yields `None`.
    ///
    /// Time complexity: O(log N)
    pub fn pop(&mut self) -> Option<T> {
        if self.values.is_empty() {
            return None;
        }
        let last = self.values.len() - 1;
        self.values.swap(0, last);
        let first = self.values.pop();
        self.shift_down(0);
        first
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn compare(a: &T, b: &T) -> Ordering {
        a.sort_index()
            .cmp(&b.sort_index())
            .then_with(|| a.id().cmp(&b.id()))
    }

    fn shift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if Self::compare(&self.values[parent], &self.values[i]) == Ordering::Greater {
                self.values.swap(parent, i);
                i = parent;
            } else {
                return;
            }
        }
    }

    fn shift_down(&mut self, mut i: usize) {
        let len = self.values.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                return;
            }
            let right = left + 1;
            let smaller = if right < len
                && Self::compare(&self.values[right], &self.values[left]) == Ordering::Less
            {
                right
            } else {
                left
            };
            if Self::compare(&self.values[smaller], &self.values[i]) == Ordering::Less {
                self.values.swap(smaller, i);
                i = smaller;
            } else {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Entry {
        id: u64,
        sort_index: Time,
    }

    impl HeapNode for Entry {
        fn sort_index(&self) -> Time {
            self.sort_index
        }

        fn id(&self) -> u64 {
            self.id
        }
    }

    fn entry(id: u64, sort_index: Time) -> Entry {
        Entry { id, sort_index }
    }

    fn verify_heap_invariant(heap: &MinHeap<Entry>) {
        for i in 0..heap.len() {
            for child in [2 * i + 1, 2 * i + 2] {
                if child < heap.len() {
                    assert_ne!(
                        MinHeap::compare(&heap.values[i], &heap.values[child]),
                        Ordering::Greater,
                        "parent {:?} > child {:?} at positions {}, {}",
                        heap.values[i],
                        heap.values[child],
                        i,
                        child
                    );
                }
            }
        }
    }

    #[test]
    fn empty_heap_peeks_and_pops_none() {
        let mut heap: MinHeap<Entry> = MinHeap::new();
        assert!(heap.peek().is_none());
        assert!(heap.pop().is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn pop_and_push_and_clear() {
        let mut heap = MinHeap::new();
        for (id, value) in [3, 7, 4, 10, 12, 9, 6, 15, 14].into_iter().enumerate() {
            heap.push(entry(id as u64, value));
        }
        verify_heap_invariant(&heap);
        assert_eq!(heap.peek().map(|e| e.sort_index), Some(3));

        heap.pop();
        assert_eq!(heap.peek().map(|e| e.sort_index), Some(4));

        heap.push(entry(100, 3));
        assert_eq!(heap.peek().map(|e| e.sort_index), Some(3));

        heap.clear();
        assert!(heap.pop().is_none());
    }

    #[test]
    fn equal_sort_index_pops_in_id_order() {
        let mut heap = MinHeap::new();
        heap.push(entry(3, 10));
        heap.push(entry(1, 10));
        heap.push(entry(2, 10));
        heap.push(entry(0, 20));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|e| e.id).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn pops_in_lexicographic_order_for_pseudo_random_input() {
        let mut heap = MinHeap::with_capacity(2);
        let mut expected = Vec::new();
        for i in 0..100u64 {
            let value = (i * 7 % 97) as Time % 13;
            heap.push(entry(i, value));
            expected.push((value, i));
            verify_heap_invariant(&heap);
        }
        expected.sort();

        let popped: Vec<(Time, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.sort_index, e.id))
            .collect();
        assert_eq!(popped, expected);
    }
}
