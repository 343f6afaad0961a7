//! Bounded deadline-ordered timer queue.
//!
//! A binary heap over scheduled entries, keyed by wraparound-safe wake order
//! with a monotonic sequence number breaking ties in insertion order, so
//! pops are deterministic even among entries due at the same tick.
//!
//! The bound is fixed at construction. Exceeding it rejects the push with
//! [`QueueFull`] and leaves the queue untouched; the queue never grows and
//! never silently drops entries.

use crate::syscall::Value;
use crate::task::Work;
use crate::tick::Tick;
use core::fmt;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Default bound on pending entries.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// A single scheduled unit of work.
///
/// Entries are immutable once pushed and consumed exactly once by a pop.
/// Rescheduling always creates a new entry with a fresh sequence number.
pub struct Entry {
    wake: Tick,
    seq: u64,
    pub(crate) work: Work,
    pub(crate) args: Vec<Value>,
}

impl Entry {
    /// Tick at which this entry becomes due.
    #[must_use]
    pub fn wake(&self) -> Tick {
        self.wake
    }

    pub(crate) fn into_parts(self) -> (Work, Vec<Value>) {
        (self.work, self.args)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("wake", &self.wake)
            .field("seq", &self.seq)
            .field("work", &self.work)
            .field("args", &self.args.len())
            .finish()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        // Sequence numbers are unique per queue.
        self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest wake tick
        // (wraparound-safe), then the lowest sequence number, surfaces
        // first. Valid while all pending deadlines span less than half the
        // tick range.
        self.wake
            .diff(other.wake)
            .cmp(&0)
            .then_with(|| self.seq.cmp(&other.seq))
            .reverse()
    }
}

/// Error returned by a push that hits the queue bound.
///
/// The failed push has no effect on queue state.
#[derive(Debug, Clone, thiserror::Error)]
#[error("timer queue is full ({capacity} entries)")]
pub struct QueueFull {
    /// The configured capacity that was exceeded.
    pub capacity: usize,
}

/// Bounded priority container of scheduled entries, ordered by wake tick.
pub struct TimerQueue {
    heap: BinaryHeap<Entry>,
    capacity: usize,
    next_seq: u64,
}

impl TimerQueue {
    /// Creates an empty queue holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The fixed bound on pending entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts an entry waking at `wake`.
    pub fn push(&mut self, wake: Tick, work: Work, args: Vec<Value>) -> Result<(), QueueFull> {
        if self.heap.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            wake,
            seq,
            work,
            args,
        });
        Ok(())
    }

    /// Removes and returns the entry with the earliest wake tick, ties
    /// broken by insertion order.
    pub fn pop(&mut self) -> Option<Entry> {
        self.heap.pop()
    }

    /// Drops all pending entries.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("len", &self.heap.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
