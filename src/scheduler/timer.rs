//! Virtual-time timer queue.
//!
//! Every delayed action of the scheduler goes through one `TimerQueue`. Due
//! times are offsets from scheduler start, so the queue never reads a clock;
//! the host decides what "now" is.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Opaque handle returned by [`TimerQueue::schedule`], used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Min-heap of pending tasks ordered by `(due, insertion order)`.
///
/// Cancelled entries are dropped from the task map immediately and skipped
/// lazily when they surface at the head of the heap.
#[derive(Debug)]
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<(Duration, u64)>>,
    tasks: HashMap<u64, (Duration, T)>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, due: Duration, task: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((due, id)));
        self.tasks.insert(id, (due, task));
        TimerHandle(id)
    }

    /// Returns `false` when the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.tasks.remove(&handle.0).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.tasks.contains_key(&handle.0)
    }

    pub fn due_of(&self, handle: TimerHandle) -> Option<Duration> {
        self.tasks.get(&handle.0).map(|(due, _)| *due)
    }

    /// Earliest due time among live timers.
    pub fn next_due(&mut self) -> Option<Duration> {
        self.prune_cancelled_head();
        self.heap.peek().map(|Reverse((due, _))| *due)
    }

    /// Pop the earliest live timer if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        self.prune_cancelled_head();
        let Reverse((due, id)) = *self.heap.peek()?;
        if due > now {
            return None;
        }
        self.heap.pop();
        self.tasks.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Live timers in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Duration, &T)> {
        self.tasks.values().map(|(due, task)| (*due, task))
    }

    fn prune_cancelled_head(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.tasks.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}
