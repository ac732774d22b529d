//! Delayed task scheduling.
//!
//! # Invariants
//! - A scheduled task runs exactly once, at or after its requested delay.
//! - No ordering is promised between tasks beyond their due times.
//! - Schedulers never hold internal locks while a task runs, so a task may
//!   schedule further work.

pub mod manual;
pub mod pool;

use std::time::Duration;

pub use manual::{ManualScheduler, Scheduled};
pub use pool::{PoolHandle, WorkerPool};

/// A one-shot unit of work.
pub trait Task: Send + 'static {
    fn run(self: Box<Self>);
}

impl<F> Task for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}

/// Accepts work to run once after `delay`, on an unspecified worker.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Box<dyn Task>, label: &'static str, delay: Duration);
}
