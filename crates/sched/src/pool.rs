//! Real-time scheduler: a timer thread feeding a fixed pool of workers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::{Scheduler, Task};

type Job = (&'static str, Box<dyn Task>);

/// Delays beyond this are clamped; the task then never comes due in practice.
const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct Timed {
    due: Instant,
    seq: u64,
    label: &'static str,
    task: Box<dyn Task>,
}

impl PartialEq for Timed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timed {}

impl PartialOrd for Timed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timed {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
struct TimerState {
    queue: BinaryHeap<Timed>,
    next_seq: u64,
    shutdown: bool,
}

struct Shared {
    timers: Mutex<TimerState>,
    wake: Condvar,
    /// Scheduled tasks that have not finished running.
    outstanding: AtomicUsize,
}

impl Shared {
    fn schedule(&self, task: Box<dyn Task>, label: &'static str, delay: Duration) {
        let mut timers = self.timers.lock();
        if timers.shutdown {
            tracing::debug!(label, "pool is shut down, dropping task");
            return;
        }
        let seq = timers.next_seq;
        timers.next_seq += 1;
        self.outstanding.fetch_add(1, AtomicOrdering::SeqCst);
        timers.queue.push(Timed {
            due: Instant::now() + delay.min(MAX_DELAY),
            seq,
            label,
            task,
        });
        drop(timers);
        self.wake.notify_one();
    }
}

/// Runs scheduled tasks on `workers` threads once they fall due.
///
/// A panicking task is logged and does not take its worker down. Tasks not
/// yet due when the pool shuts down are dropped without running.
///
/// The pool owns its threads and joins them on shutdown. Tasks that need to
/// schedule more work hold a [`PoolHandle`] instead, so dropping the last
/// reference a task holds never joins a worker from inside that worker.
pub struct WorkerPool {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            timers: Mutex::new(TimerState::default()),
            wake: Condvar::new(),
            outstanding: AtomicUsize::new(0),
        });
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let rx = rx.clone();
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("drydock-worker-{index}"))
                .spawn(move || worker_loop(rx, &worker_shared))?;
            handles.push(handle);
        }

        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("drydock-timer".into())
            .spawn(move || timer_loop(&timer_shared, tx))?;

        Ok(Self {
            shared,
            timer: Some(timer),
            workers: handles,
        })
    }

    /// A scheduling handle that does not keep the pool's threads alive.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Tasks waiting for their due time.
    pub fn pending(&self) -> usize {
        self.shared.timers.lock().queue.len()
    }

    /// Tasks scheduled but not yet finished, including ones running now.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(AtomicOrdering::SeqCst)
    }

    /// Block until every scheduled task, and everything those tasks scheduled
    /// in turn, has run. Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.outstanding() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Stop the timer, let workers finish dispatched tasks, and join every thread.
    pub fn shutdown(&mut self) {
        {
            let mut timers = self.shared.timers.lock();
            timers.shutdown = true;
            let dropped = timers.queue.len();
            timers.queue.clear();
            self.shared
                .outstanding
                .fetch_sub(dropped, AtomicOrdering::SeqCst);
            if dropped > 0 {
                tracing::debug!(dropped, "dropping tasks not yet due");
            }
        }
        self.shared.wake.notify_all();
        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                tracing::warn!("timer thread panicked");
            }
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }
    }
}

impl Scheduler for WorkerPool {
    fn schedule(&self, task: Box<dyn Task>, label: &'static str, delay: Duration) {
        self.shared.schedule(task, label, delay);
    }
}

/// Cloneable scheduler onto a [`WorkerPool`]. Once the pool has shut down,
/// tasks scheduled through a handle are dropped without running.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// See [`WorkerPool::outstanding`].
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(AtomicOrdering::SeqCst)
    }
}

impl Scheduler for PoolHandle {
    fn schedule(&self, task: Box<dyn Task>, label: &'static str, delay: Duration) {
        self.shared.schedule(task, label, delay);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(shared: &Shared, tx: Sender<Job>) {
    let mut timers = shared.timers.lock();
    loop {
        if timers.shutdown {
            break;
        }
        let Some(due) = timers.queue.peek().map(|t| t.due) else {
            shared.wake.wait(&mut timers);
            continue;
        };
        if due > Instant::now() {
            shared.wake.wait_until(&mut timers, due);
            continue;
        }
        if let Some(timed) = timers.queue.pop() {
            tracing::trace!(label = timed.label, "dispatching task");
            if tx.send((timed.label, timed.task)).is_err() {
                break;
            }
        }
    }
    // Dropping `tx` ends the worker loops once the channel drains.
}

fn worker_loop(rx: Receiver<Job>, shared: &Shared) {
    for (label, task) in rx.iter() {
        if panic::catch_unwind(AssertUnwindSafe(move || task.run())).is_err() {
            tracing::warn!(label, "task panicked");
        }
        shared.outstanding.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for(counter: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(AtomicOrdering::SeqCst) < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_every_task_once() {
        let pool = WorkerPool::new(4).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for i in 0..32 {
            let count = Arc::clone(&count);
            pool.schedule(
                Box::new(move || {
                    count.fetch_add(1, AtomicOrdering::SeqCst);
                }),
                "count",
                Duration::from_millis(i % 4),
            );
        }
        wait_for(&count, 32);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 32);
    }

    #[test]
    fn respects_delay() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let start = Instant::now();
        pool.schedule(
            Box::new(move || {
                let _ = tx.send(Instant::now());
            }),
            "delayed",
            Duration::from_millis(50),
        );
        let ran_at = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ran_at.duration_since(start) >= Duration::from_millis(50));
    }

    #[test]
    fn panicking_task_does_not_kill_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        fn boom() {
            panic!("boom");
        }
        pool.schedule(Box::new(boom), "panics", Duration::ZERO);
        let after = Arc::clone(&count);
        pool.schedule(
            Box::new(move || {
                after.fetch_add(1, AtomicOrdering::SeqCst);
            }),
            "after",
            Duration::from_millis(10),
        );
        wait_for(&count, 1);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn shutdown_drops_future_tasks() {
        let mut pool = WorkerPool::new(2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        pool.schedule(
            Box::new(move || {
                c.fetch_add(1, AtomicOrdering::SeqCst);
            }),
            "far",
            Duration::from_secs(60),
        );
        assert_eq!(pool.pending(), 1);
        pool.shutdown();
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn wait_idle_covers_tasks_scheduled_by_tasks() {
        let pool = WorkerPool::new(2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let inner_pool = pool.handle();
        let inner_count = Arc::clone(&count);
        pool.schedule(
            Box::new(move || {
                let c = Arc::clone(&inner_count);
                inner_pool.schedule(
                    Box::new(move || {
                        c.fetch_add(1, AtomicOrdering::SeqCst);
                    }),
                    "second",
                    Duration::from_millis(20),
                );
            }),
            "first",
            Duration::from_millis(10),
        );
        assert!(pool.wait_idle(Duration::from_secs(5)));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn handle_outlives_pool() {
        let mut pool = WorkerPool::new(1).unwrap();
        let handle = pool.handle();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        // Pending at shutdown and holding a handle of its own.
        let held = handle.clone();
        handle.schedule(
            Box::new(move || {
                let _held = held;
                c.fetch_add(1, AtomicOrdering::SeqCst);
            }),
            "pending",
            Duration::from_secs(60),
        );
        assert_eq!(handle.outstanding(), 1);
        pool.shutdown();
        drop(pool);

        let c = Arc::clone(&count);
        handle.schedule(
            Box::new(move || {
                c.fetch_add(1, AtomicOrdering::SeqCst);
            }),
            "late",
            Duration::ZERO,
        );
        assert_eq!(handle.outstanding(), 0);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn last_handle_dropped_on_a_worker() {
        let mut pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = pool.handle();
        pool.schedule(
            Box::new(move || {
                drop(handle);
                let _ = tx.send(());
            }),
            "drops-handle",
            Duration::ZERO,
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(5)));
        pool.shutdown();
    }

    #[test]
    fn huge_delay_is_clamped() {
        let mut pool = WorkerPool::new(1).unwrap();
        pool.schedule(Box::new(|| {}), "never", Duration::MAX);
        assert_eq!(pool.pending(), 1);
        pool.shutdown();
        assert_eq!(pool.outstanding(), 0);
    }
}
