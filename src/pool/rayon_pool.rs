use super::ThreadPool;
use crate::{PoolError, Result};

/// A thread pool backed by the `rayon` library.
///
/// Uses rayon's work-stealing scheduler; the in-crate pools distribute
/// at enqueue time instead and never migrate a queued job. Kept for the
/// bench comparison.
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .build()
            .map_err(|e| PoolError::InvalidArgument(e.to_string()))?;
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}
