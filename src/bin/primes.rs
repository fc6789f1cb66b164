use std::process::exit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{error, info};

use shardpool::{register_thread, Job, Result, ShardedThreadPool, TrackedRing};

#[derive(Parser)]
#[command(name = "primes", version, about = "Counts primes on a sharded thread pool")]
struct Cli {
    /// Number of times the fixed set of candidates is enqueued
    #[arg(default_value_t = 100_000)]
    rounds: u32,

    /// Worker threads
    #[arg(default_value_t = 2)]
    workers: u32,

    /// Queue shards (must not exceed the worker count)
    #[arg(default_value_t = 2)]
    shards: u32,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let primes = Arc::new(AtomicU64::new(0));

    {
        let pool = ShardedThreadPool::builder()
            .workers(cli.workers as usize)
            .shards(cli.shards as usize)
            .producers(1)
            .build_with_ring::<TrackedRing<Job>>()?;

        // The position-tracked ring needs the enqueueing thread to hold
        // a registered id; the workers register themselves.
        register_thread(0);

        for _ in 0..cli.rounds {
            for candidate in (3u32..100).step_by(2) {
                let primes = Arc::clone(&primes);
                pool.spawn(move || {
                    if is_prime(candidate) {
                        primes.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        }
        info!("enqueue finished, draining pool");
    }

    println!(
        "{} rounds: {} prime hits",
        cli.rounds,
        primes.load(Ordering::Relaxed)
    );
    println!("duration: {}ms", start.elapsed().as_millis());
    Ok(())
}

/// Trial-division primality check; deliberately unoptimized so each
/// unit of work costs something.
fn is_prime(n: u32) -> bool {
    for i in 2..=n / 2 {
        if n % i == 0 {
            return false;
        }
    }
    true
}
