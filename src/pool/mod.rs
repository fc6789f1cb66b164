use crossbeam::channel::{self, Receiver};

use crate::{PoolError, Result};

/// A thread pool for executing jobs concurrently.
///
/// Implementors manage a pool of worker threads and distribute
/// incoming jobs across them.
pub trait ThreadPool {
    /// Creates a new thread pool with the given number of threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created (e.g., invalid size).
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool, fire-and-forget.
    ///
    /// The function will be executed by one of the threads in the pool.
    /// The caller cannot observe completion or panics; use the pool's
    /// `submit` method when a result is needed.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

/// A boxed, one-shot unit of work as it travels through a queue.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Completion handle for a submitted task.
///
/// Returned by the pools' `submit` methods. Dropping the handle
/// detaches the task; it still runs, its result is discarded.
pub struct TaskHandle<T> {
    result: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task's result arrives.
    ///
    /// # Errors
    ///
    /// [`PoolError::TaskCanceled`] when the task's closure was dropped
    /// without producing a value: it lost a race with pool shutdown, or
    /// it panicked.
    pub fn wait(self) -> Result<T> {
        self.result.recv().map_err(|_| PoolError::TaskCanceled)
    }
}

/// Wraps a result-producing closure into a fire-and-forget [`Job`] plus
/// the handle observing it. The channel holds exactly one slot, so the
/// worker's send never blocks.
pub(crate) fn package_task<F, T>(job: F) -> (Job, TaskHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = channel::bounded(1);
    let job: Job = Box::new(move || {
        let _ = tx.send(job());
    });
    (job, TaskHandle { result: rx })
}

mod naive;
mod rayon_pool;
mod sharded;
mod simple;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
pub use self::sharded::{PoolBuilder, ShardedThreadPool};
pub use self::simple::SimpleThreadPool;
