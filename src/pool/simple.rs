use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::{package_task, Job, TaskHandle, ThreadPool};
use crate::queue::BoundedQueue;
use crate::ring::{RingBuffer, DEFAULT_CAPACITY};
use crate::semaphore::BlockingSemaphore;
use crate::{PoolError, Result};

/// A thread pool with a single shared bounded queue.
///
/// Every worker blocks on the same queue, gated by the plain
/// mutex+condvar semaphores. Simpler than [`ShardedThreadPool`] and
/// fine at low producer counts; under heavy contention all traffic
/// funnels through two semaphores, which is exactly what sharding
/// exists to avoid.
///
/// [`ShardedThreadPool`]: crate::ShardedThreadPool
pub struct SimpleThreadPool {
    queue: Arc<BoundedQueue<RingBuffer<Job>, BlockingSemaphore>>,
    workers: Vec<JoinHandle<()>>,
}

impl SimpleThreadPool {
    /// Submits a result-producing task; identical contract to
    /// [`ShardedThreadPool::submit`](crate::ShardedThreadPool::submit).
    pub fn submit<F, T>(&self, job: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = package_task(job);
        let _ = self.queue.push(job);
        handle
    }
}

impl ThreadPool for SimpleThreadPool {
    fn new(threads: u32) -> Result<Self> {
        if threads == 0 {
            return Err(PoolError::InvalidArgument(
                "pool needs at least one worker".to_owned(),
            ));
        }
        let queue = Arc::new(BoundedQueue::new(RingBuffer::with_capacity(
            DEFAULT_CAPACITY,
        )?));

        let workers = (0..threads)
            .map(|id| {
                let queue = Arc::clone(&queue);
                thread::Builder::new()
                    .name(format!("pool-worker-{id}"))
                    .spawn(move || {
                        while let Some(job) = queue.pop() {
                            debug!("worker {id} executing job");
                            // Catch panics so the worker loop continues
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!("worker {id}: job panicked, continuing");
                            }
                        }
                        debug!("worker {id}: queue closed, shutting down");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Ok(SimpleThreadPool { queue, workers })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // A Closed refusal means the pool is being torn down; the job
        // is dropped, matching the fire-and-forget contract.
        let _ = self.queue.push(Box::new(job));
    }
}

impl Drop for SimpleThreadPool {
    fn drop(&mut self) {
        self.queue.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
