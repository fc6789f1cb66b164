#![deny(missing_docs)]

//! A sharded, semaphore-gated thread pool for fire-and-forget work.
//!
//! Producers enqueue closures; a fixed set of worker threads dequeues
//! and runs them. Instead of funneling everything through one locked
//! queue, the pool shards work across several bounded queues, each a
//! lock-free ring gated by a pair of fast counting semaphores.
//! Producers and workers probe the shards with non-blocking operations
//! before anyone sleeps.
//!
//! ```
//! use shardpool::ShardedThreadPool;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! let counter = Arc::new(AtomicU64::new(0));
//! {
//!     let pool = ShardedThreadPool::with_shards(4, 2).unwrap();
//!     for _ in 0..1000 {
//!         let counter = Arc::clone(&counter);
//!         pool.spawn(move || {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!         });
//!     }
//! } // dropping the pool drains and joins the workers
//! assert_eq!(counter.load(Ordering::Relaxed), 1000);
//! ```

mod error;
mod pool;
mod queue;
mod registry;
mod ring;
mod semaphore;

pub use error::{PoolError, Result};
pub use pool::{
    Job, NaiveThreadPool, PoolBuilder, RayonThreadPool, ShardedThreadPool, SimpleThreadPool,
    TaskHandle, ThreadPool,
};
pub use queue::{BoundedQueue, PushError};
pub use registry::{register_thread, registered_id};
pub use ring::{Ring, RingBuffer, TrackedRing, DEFAULT_CAPACITY};
pub use semaphore::{BlockingSemaphore, FastSemaphore, Semaphore};
