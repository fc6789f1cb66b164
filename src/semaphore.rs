//! Counting semaphores with a terminal close signal.
//!
//! Two interchangeable variants guard the bounded queues: a plain
//! mutex+condvar semaphore and a fast variant that fronts it with an
//! atomic counter and a bounded spin. Closing a semaphore makes every
//! current and future `wait` return `false` once the permits run dry;
//! permits posted before the close remain consumable so queues can
//! drain on shutdown.

use std::hint;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Spin iterations before a failed fast-path wait commits to sleeping.
/// Lowering this pushes contended waiters into the kernel and costs an
/// order of magnitude under bursty arrival.
const SPIN_LIMIT: u32 = 10_000;

/// A counting semaphore that can be closed.
///
/// `wait` returns `true` when a permit was taken and `false` when the
/// semaphore is closed and empty. `try_wait` is the zero-duration poll
/// used by the queues' non-blocking paths; it never blocks beyond one
/// atomic operation or one uncontended lock.
pub trait Semaphore: Send + Sync {
    /// Creates a semaphore holding `permits` initial permits.
    fn with_permits(permits: usize) -> Self
    where
        Self: Sized;

    /// Releases one permit, waking a waiter if one is blocked.
    fn post(&self);

    /// Takes a permit, blocking until one is available or the
    /// semaphore is closed. Returns `false` only on closed-and-empty.
    fn wait(&self) -> bool;

    /// Takes a permit only if one is immediately available.
    fn try_wait(&self) -> bool;

    /// Closes the semaphore and wakes every blocked waiter.
    fn close(&self);
}

struct State {
    count: usize,
    closed: bool,
}

/// Mutex+condvar semaphore. The baseline variant: correct everywhere,
/// pays a lock round trip per operation.
pub struct BlockingSemaphore {
    state: Mutex<State>,
    ready: Condvar,
}

impl BlockingSemaphore {
    /// Takes a permit, giving up after `timeout` if none arrives.
    ///
    /// Returns `false` on timeout as well as on closed-and-empty.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.count == 0 && !s.closed)
            .unwrap();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }
}

impl Semaphore for BlockingSemaphore {
    fn with_permits(permits: usize) -> Self {
        BlockingSemaphore {
            state: Mutex::new(State {
                count: permits,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn post(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.count += 1;
        }
        self.ready.notify_one();
    }

    fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.count == 0 && !state.closed {
            state = self.ready.wait(state).unwrap();
        }
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    fn try_wait(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
        }
        self.ready.notify_all();
    }
}

/// Atomic-counter semaphore with a bounded spin before sleeping.
///
/// The signed counter encodes both available permits (positive) and
/// committed sleepers (negative) in one word, so the uncontended
/// post/wait pair is a single atomic RMW each. Sleepers park on a
/// nested [`BlockingSemaphore`] that starts at zero.
pub struct FastSemaphore {
    count: AtomicI64,
    inner: BlockingSemaphore,
}

impl FastSemaphore {
    /// Zero-duration poll; the `timeout` is ignored.
    ///
    /// The queues only ever pass a zero timeout, so this is a plain
    /// `try_wait`.
    // TODO: honor nonzero timeouts with a bounded sleep on the inner
    // semaphore if a caller ever needs one.
    pub fn wait_timeout(&self, _timeout: Duration) -> bool {
        self.try_wait()
    }

    /// One CAS attempt at the counter.
    fn try_take(&self) -> bool {
        let current = self.count.load(Ordering::Relaxed);
        current > 0
            && self
                .count
                .compare_exchange(current, current - 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }
}

impl Semaphore for FastSemaphore {
    fn with_permits(permits: usize) -> Self {
        FastSemaphore {
            count: AtomicI64::new(permits as i64),
            inner: BlockingSemaphore::with_permits(0),
        }
    }

    fn post(&self) {
        let previous = self.count.fetch_add(1, Ordering::Release);
        if previous < 0 {
            // A waiter already committed to sleeping; hand the permit
            // through the inner semaphore.
            self.inner.post();
        }
    }

    fn wait(&self) -> bool {
        if self.try_take() {
            return true;
        }
        for _ in 0..SPIN_LIMIT {
            if self.try_take() {
                return true;
            }
            hint::spin_loop();
        }
        let previous = self.count.fetch_sub(1, Ordering::Acquire);
        if previous <= 0 {
            self.inner.wait()
        } else {
            true
        }
    }

    fn try_wait(&self) -> bool {
        self.try_take()
    }

    fn close(&self) {
        self.inner.close();
    }
}
