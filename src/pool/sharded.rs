use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::{package_task, Job, TaskHandle, ThreadPool};
use crate::queue::BoundedQueue;
use crate::registry;
use crate::ring::{Ring, RingBuffer, DEFAULT_CAPACITY};
use crate::{PoolError, Result};

/// Probe rounds over the shard array before a producer or worker gives
/// up scanning and blocks on a single queue.
const SCAN_FACTOR: usize = 2;

/// A thread pool that spreads work over multiple queue shards.
///
/// Producers round-robin across the shards, probing
/// `SCAN_FACTOR × shards` queues with a non-blocking push before
/// falling back to a blocking one, so under contention an enqueue
/// usually lands in whichever shard has room without anyone sleeping.
/// Each worker prefers its home shard (`worker_id % shards`) but scans
/// the others the same way before blocking, which lets it steal from a
/// backlogged neighbor.
///
/// Dropping the pool closes every shard and joins every worker; workers
/// drain their home shard before exiting, so jobs accepted prior to the
/// drop still run.
///
/// Generic over the shard's ring. The default commit-ordered
/// [`RingBuffer`] needs no setup; [`TrackedRing`](crate::TrackedRing)
/// shards additionally require every enqueueing thread to call
/// [`register_thread`](crate::register_thread) first (workers register
/// themselves).
pub struct ShardedThreadPool<R: Ring<Item = Job> + 'static = RingBuffer<Job>> {
    shards: Arc<Vec<BoundedQueue<R>>>,
    workers: Vec<JoinHandle<()>>,
    next_shard: AtomicUsize,
}

/// Configuration for a [`ShardedThreadPool`].
///
/// Defaults: one worker per logical CPU, one shard per worker, shard
/// capacity [`DEFAULT_CAPACITY`], and a producer-thread bound equal to
/// the worker count.
pub struct PoolBuilder {
    workers: usize,
    shards: usize,
    shard_capacity: usize,
    producers: Option<usize>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        PoolBuilder {
            workers: cpus,
            shards: cpus,
            shard_capacity: DEFAULT_CAPACITY,
            producers: None,
        }
    }
}

impl PoolBuilder {
    /// Number of worker threads. Must be at least the shard count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Number of queue shards.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Slot count per shard (nonzero power of two).
    pub fn shard_capacity(mut self, capacity: usize) -> Self {
        self.shard_capacity = capacity;
        self
    }

    /// Upper bound on distinct registered producer threads, for rings
    /// that size a per-thread table. Defaults to the worker count.
    pub fn producers(mut self, producers: usize) -> Self {
        self.producers = Some(producers);
        self
    }

    /// Builds a pool over the default commit-ordered ring.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] for zero workers, zero shards,
    /// fewer workers than shards, or a bad shard capacity.
    pub fn build(self) -> Result<ShardedThreadPool> {
        self.build_with_ring()
    }

    /// Builds a pool whose shards use the ring type `R`.
    ///
    /// # Errors
    ///
    /// As for [`build`](PoolBuilder::build), plus whatever `R`'s
    /// constructor rejects.
    pub fn build_with_ring<R: Ring<Item = Job> + 'static>(self) -> Result<ShardedThreadPool<R>> {
        ShardedThreadPool::from_builder(self)
    }
}

impl ShardedThreadPool {
    /// Starts configuring a pool.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Creates a pool with explicit worker and shard counts and the
    /// default shard capacity.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] unless
    /// `workers >= shards >= 1`.
    pub fn with_shards(workers: u32, shards: u32) -> Result<Self> {
        PoolBuilder::default()
            .workers(workers as usize)
            .shards(shards as usize)
            .build()
    }
}

impl<R: Ring<Item = Job> + 'static> ShardedThreadPool<R> {
    fn from_builder(builder: PoolBuilder) -> Result<Self> {
        let PoolBuilder {
            workers,
            shards,
            shard_capacity,
            producers,
        } = builder;
        if workers == 0 {
            return Err(PoolError::InvalidArgument(
                "pool needs at least one worker".to_owned(),
            ));
        }
        if shards == 0 {
            return Err(PoolError::InvalidArgument(
                "pool needs at least one shard".to_owned(),
            ));
        }
        if workers < shards {
            return Err(PoolError::InvalidArgument(format!(
                "pool needs a worker per shard, got {workers} workers for {shards} shards"
            )));
        }
        let producers = producers.unwrap_or(workers);

        let queues = (0..shards)
            .map(|_| R::new(shard_capacity, producers, workers).map(BoundedQueue::new))
            .collect::<Result<Vec<_>>>()?;
        let queues = Arc::new(queues);

        let handles = (0..workers)
            .map(|worker_id| {
                let shards = Arc::clone(&queues);
                thread::Builder::new()
                    .name(format!("shard-worker-{worker_id}"))
                    .spawn(move || run_worker(&shards, worker_id))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Ok(ShardedThreadPool {
            shards: queues,
            workers: handles,
            next_shard: AtomicUsize::new(0),
        })
    }

    /// Spawns a fire-and-forget job; see [`ThreadPool::spawn`].
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(job));
    }

    /// Submits a result-producing task and returns its completion
    /// handle. Dispatch is identical to [`spawn`](Self::spawn); the
    /// handle reports [`PoolError::TaskCanceled`] if the closure is
    /// dropped unexecuted.
    pub fn submit<F, T>(&self, job: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = package_task(job);
        self.enqueue(job);
        handle
    }

    fn enqueue(&self, mut job: Job) {
        let count = self.shards.len();
        let start = self.next_shard.fetch_add(1, Ordering::Relaxed);
        for n in 0..count * SCAN_FACTOR {
            match self.shards[(start + n) % count].try_push(job) {
                Ok(()) => return,
                Err(refused) => job = refused.into_inner(),
            }
        }
        // Every probe found a full shard; block on the round-robin
        // pick. A Closed refusal means the caller lost the race with
        // shutdown and the job is dropped.
        let _ = self.shards[start % count].push(job);
    }
}

/// Worker loop: scan for work starting at the home shard, block on the
/// home shard when the scan comes up empty, exit when the home shard is
/// closed and drained.
fn run_worker<R: Ring<Item = Job>>(shards: &[BoundedQueue<R>], worker_id: usize) {
    registry::register_thread(worker_id);
    let count = shards.len();
    let home = worker_id % count;

    loop {
        let mut job = None;
        for n in 0..count * SCAN_FACTOR {
            if let Some(found) = shards[(home + n) % count].try_pop() {
                job = Some(found);
                break;
            }
        }
        let job = match job {
            Some(job) => job,
            None => match shards[home].pop() {
                Some(job) => job,
                None => break,
            },
        };

        debug!("worker {worker_id} executing job");
        // Catch panics so the worker loop continues
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("worker {worker_id}: job panicked, continuing");
        }
    }
    debug!("worker {worker_id}: home shard closed, shutting down");
}

impl ThreadPool for ShardedThreadPool {
    fn new(threads: u32) -> Result<Self> {
        Self::with_shards(threads, threads)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(job));
    }
}

impl<R: Ring<Item = Job> + 'static> Drop for ShardedThreadPool<R> {
    fn drop(&mut self) {
        for shard in self.shards.iter() {
            shard.close();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::TrackedRing;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn rejects_invalid_configurations() {
        assert!(ShardedThreadPool::with_shards(0, 1).is_err());
        assert!(ShardedThreadPool::with_shards(1, 0).is_err());
        assert!(ShardedThreadPool::with_shards(1, 2).is_err());
        assert!(ShardedThreadPool::builder()
            .workers(2)
            .shards(2)
            .shard_capacity(0)
            .build()
            .is_err());
    }

    #[test]
    fn spawn_runs_every_job() {
        let counter = Arc::new(AtomicU64::new(0));
        {
            let pool = ShardedThreadPool::with_shards(4, 2).unwrap();
            for _ in 0..10_000 {
                let counter = Arc::clone(&counter);
                pool.spawn(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(counter.load(Ordering::Relaxed), 10_000);
    }

    #[test]
    fn submit_returns_the_result() {
        let pool = ShardedThreadPool::with_shards(2, 1).unwrap();
        let handle = pool.submit(|| 6 * 7);
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn submit_reports_panicked_tasks() {
        let pool = ShardedThreadPool::with_shards(1, 1).unwrap();
        let handle = pool.submit(|| -> u32 { panic!("boom") });
        assert!(matches!(handle.wait(), Err(PoolError::TaskCanceled)));
        // The worker survives the panic.
        assert_eq!(pool.submit(|| 1).wait().unwrap(), 1);
    }

    #[test]
    fn panicked_job_does_not_kill_the_worker() {
        let counter = Arc::new(AtomicU64::new(0));
        {
            let pool = ShardedThreadPool::with_shards(1, 1).unwrap();
            pool.spawn(|| panic!("boom"));
            for _ in 0..100 {
                let counter = Arc::clone(&counter);
                pool.spawn(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn tracked_ring_shards_work_end_to_end() {
        crate::register_thread(0);
        let counter = Arc::new(AtomicU64::new(0));
        {
            let pool = ShardedThreadPool::builder()
                .workers(4)
                .shards(2)
                .build_with_ring::<TrackedRing<Job>>()
                .unwrap();
            for _ in 0..5_000 {
                let counter = Arc::clone(&counter);
                pool.spawn(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        }
        assert_eq!(counter.load(Ordering::Relaxed), 5_000);
    }
}
