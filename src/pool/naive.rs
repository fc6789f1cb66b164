use super::ThreadPool;
use crate::Result;

/// A degenerate pool that starts a fresh thread per job.
///
/// No queues, no semaphores, no backpressure, and nothing to drain:
/// dropping the pool does not wait for outstanding jobs. It exists as
/// the lower bound in `benches/pool_bench.rs`, where the sharded and
/// simple pools are measured against paying full thread-creation cost
/// on every spawn.
pub struct NaiveThreadPool;

impl ThreadPool for NaiveThreadPool {
    fn new(_threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::spawn(job);
    }
}
