//! End-to-end pool scenarios.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shardpool::{
    register_thread, BoundedQueue, Job, PoolError, PushError, RingBuffer, ShardedThreadPool,
    SimpleThreadPool, ThreadPool, TrackedRing,
};

#[test]
fn drain_to_zero() {
    let counter = Arc::new(AtomicU64::new(0));
    {
        let pool = ShardedThreadPool::with_shards(4, 2).unwrap();
        for _ in 0..1_000_000 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
    }
    // Every job accepted before the drop ran exactly once.
    assert_eq!(counter.load(Ordering::Relaxed), 1_000_000);
}

fn is_prime(n: u32) -> bool {
    for i in 2..=n / 2 {
        if n % i == 0 {
            return false;
        }
    }
    true
}

#[test]
fn prime_count_fixture() {
    const ROUNDS: u32 = 1_000;
    let hits = Arc::new(AtomicU64::new(0));
    {
        let pool = ShardedThreadPool::builder()
            .workers(2)
            .shards(2)
            .producers(1)
            .build_with_ring::<TrackedRing<Job>>()
            .unwrap();
        register_thread(0);

        for _ in 0..ROUNDS {
            for candidate in (3u32..100).step_by(2) {
                let hits = Arc::clone(&hits);
                pool.spawn(move || {
                    if is_prime(candidate) {
                        hits.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        }
    }
    // 24 odd primes below 100, each checked once per round.
    assert_eq!(hits.load(Ordering::Relaxed), 24 * u64::from(ROUNDS));
}

#[test]
fn shutdown_race_loses_nothing_it_accepted() {
    let queue: Arc<BoundedQueue<RingBuffer<u64>>> =
        Arc::new(BoundedQueue::with_capacity(256).unwrap());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut accepted = 0u64;
            loop {
                match queue.push(1) {
                    Ok(()) => accepted += 1,
                    Err(PushError::Closed(_)) => break,
                    Err(PushError::Full(_)) => unreachable!("blocking push"),
                }
            }
            accepted
        })
    };
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut executed = 0u64;
            while queue.pop().is_some() {
                executed += 1;
            }
            executed
        })
    };

    thread::sleep(Duration::from_millis(100));
    queue.close();

    let accepted = producer.join().unwrap();
    let executed = consumer.join().unwrap();
    assert!(executed <= accepted);
}

#[test]
fn saturation_applies_backpressure() {
    const JOBS: u32 = 100;
    let done = Arc::new(AtomicU64::new(0));
    let start = Instant::now();
    {
        let pool = ShardedThreadPool::builder()
            .workers(1)
            .shards(1)
            .shard_capacity(8)
            .build()
            .unwrap();
        for _ in 0..JOBS {
            let done = Arc::clone(&done);
            pool.spawn(move || {
                thread::sleep(Duration::from_millis(1));
                done.fetch_add(1, Ordering::Relaxed);
            });
        }
    }
    // All jobs completed, and with eight slots in front of a 1ms worker
    // the producer had to wait for most of them.
    assert_eq!(done.load(Ordering::Relaxed), u64::from(JOBS));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn invalid_construction_matrix() {
    assert!(matches!(
        ShardedThreadPool::new(0),
        Err(PoolError::InvalidArgument(_))
    ));
    assert!(matches!(
        ShardedThreadPool::with_shards(1, 2),
        Err(PoolError::InvalidArgument(_))
    ));
    assert!(matches!(
        ShardedThreadPool::builder()
            .workers(2)
            .shards(1)
            .shard_capacity(0)
            .build(),
        Err(PoolError::InvalidArgument(_))
    ));
    assert!(matches!(
        BoundedQueue::<RingBuffer<u32>>::with_capacity(0),
        Err(PoolError::InvalidArgument(_))
    ));
}

#[test]
fn pool_variants_are_interchangeable() {
    fn run_through<P: ThreadPool>(pool: P) -> u64 {
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..1_000 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        drop(pool);
        counter.load(Ordering::Relaxed)
    }

    assert_eq!(run_through(SimpleThreadPool::new(2).unwrap()), 1_000);
    assert_eq!(run_through(ShardedThreadPool::new(2).unwrap()), 1_000);
}

#[test]
fn submitted_tasks_deliver_results_under_load() {
    let pool = ShardedThreadPool::with_shards(4, 2).unwrap();
    let handles: Vec<_> = (0..1_000u64).map(|i| pool.submit(move || i * i)).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let i = i as u64;
        assert_eq!(handle.wait().unwrap(), i * i);
    }
}
