//! Virtual-time scheduler: nothing runs until the clock is advanced.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{Scheduler, Task};

/// A queued task, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub label: &'static str,
    /// Delay requested at submission.
    pub delay: Duration,
    /// Virtual time the task becomes due.
    pub due: Duration,
}

struct Entry {
    due: Duration,
    seq: u64,
    label: &'static str,
    delay: Duration,
    task: Box<dyn Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap and we pop the earliest entry.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct Inner {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<Entry>,
}

/// Deterministic scheduler driven by an explicit virtual clock.
///
/// Tasks due at the same instant run in submission order. Tasks scheduled
/// while the clock is advancing run in the same advance if they fall due
/// before its end.
#[derive(Default)]
pub struct ManualScheduler {
    inner: Mutex<Inner>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// Queued tasks in the order they will run.
    pub fn pending(&self) -> Vec<Scheduled> {
        let inner = self.inner.lock();
        let mut entries: Vec<(Duration, u64, Scheduled)> = inner
            .queue
            .iter()
            .map(|e| {
                (
                    e.due,
                    e.seq,
                    Scheduled {
                        label: e.label,
                        delay: e.delay,
                        due: e.due,
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(due, seq, _)| (*due, *seq));
        entries.into_iter().map(|(_, _, s)| s).collect()
    }

    /// Advance the clock by `by`, running every task that falls due. Returns
    /// how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now().saturating_add(by);
        let mut ran = 0;
        while let Some(entry) = self.pop_due(Some(target)) {
            Self::run_entry(entry);
            ran += 1;
        }
        self.inner.lock().now = target;
        ran
    }

    /// Run queued tasks, jumping the clock forward, until the queue is empty.
    ///
    /// Does not return while tasks keep re-scheduling themselves.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(entry) = self.pop_due(None) {
            Self::run_entry(entry);
            ran += 1;
        }
        ran
    }

    fn pop_due(&self, until: Option<Duration>) -> Option<Entry> {
        let mut inner = self.inner.lock();
        let due = inner.queue.peek()?.due;
        if until.is_some_and(|limit| due > limit) {
            return None;
        }
        let entry = inner.queue.pop()?;
        inner.now = inner.now.max(entry.due);
        Some(entry)
    }

    fn run_entry(entry: Entry) {
        tracing::trace!(label = entry.label, due_ms = entry.due.as_millis() as u64, "running task");
        entry.task.run();
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Box<dyn Task>, label: &'static str, delay: Duration) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let due = inner.now.saturating_add(delay);
        tracing::trace!(label, delay_ms = delay.as_millis() as u64, "task scheduled");
        inner.queue.push(Entry {
            due,
            seq,
            label,
            delay,
            task,
        });
    }
}
