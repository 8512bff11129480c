//! Clock abstraction and a queue of delayed continuations.
//!
//! Nothing in the engine waits. A delay is a task pushed onto [`TimerQueue`]
//! with a due time; the host (a browser timer, the replay CLI, or a test
//! advancing a [`ManualClock`]) calls back in when the time comes.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

pub trait Clock {
    /// Monotonic milliseconds, used for scheduling.
    fn now_ms(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch, used for timestamps.
    fn epoch_ms(&self) -> i64;
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
    epoch_base: i64,
}

impl ManualClock {
    pub fn new(epoch_base: i64) -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            epoch_base,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01T00:00:00Z
        Self::new(1_704_067_200_000)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn epoch_ms(&self) -> i64 {
        self.epoch_base + self.now.get() as i64
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: std::time::Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn epoch_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

struct Entry<T> {
    due: u64,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.seq) == (other.due, other.seq)
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed: BinaryHeap is a max-heap and we want the earliest task first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

/// Min-heap of tasks by due time. Tasks due at the same time run in
/// scheduling order.
pub struct TimerQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, due: u64, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { due, seq, task });
    }

    /// Remove and return the earliest task due at or before `now`, with its
    /// due time.
    pub fn pop_due(&mut self, now: u64) -> Option<(u64, T)> {
        if self.heap.peek()?.due > now {
            return None;
        }
        self.heap.pop().map(|e| (e.due, e.task))
    }

    pub fn next_due(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_then_schedule_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(600, "late");
        queue.schedule(100, "first");
        queue.schedule(100, "second");

        assert_eq!(queue.pop_due(50), None);
        assert_eq!(queue.pop_due(100), Some((100, "first")));
        assert_eq!(queue.pop_due(100), Some((100, "second")));
        assert_eq!(queue.next_due(), Some(600));
        assert_eq!(queue.pop_due(1_000), Some((600, "late")));
        assert!(queue.is_empty());
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now_ms(), 250);
        assert_eq!(other.epoch_ms(), 1_250);
        other.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
