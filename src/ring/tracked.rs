//! Position-tracked MPMC ring buffer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam::utils::CachePadded;

use super::{allocate_slots, Ring, Slot};
use crate::error::{PoolError, Result};
use crate::registry;

/// "No reservation outstanding" marker in the position table. Doubles
/// as the table entry's initial value, so an id that never touches the
/// ring never lowers anyone's horizon.
const IDLE: u64 = u64::MAX;

/// One registered thread's in-flight positions. Written only by the
/// owning thread, read by peers during horizon scans; a thread acting
/// as producer uses `head`, as consumer `tail`, so one id can play both
/// roles without contention.
struct ThreadPos {
    head: AtomicU64,
    tail: AtomicU64,
}

/// Bounded MPMC ring that tracks every thread's in-flight sequence in a
/// per-thread table instead of ordering publication through commit
/// counters.
///
/// A producer may not overwrite a slot until every consumer that could
/// still be reading it has finished, and a consumer may not read a slot
/// until every producer at or below that sequence has finished writing.
/// Both horizons are minima over the position table, cached in
/// `last_tail`/`last_head` and recomputed only when the cached value
/// blocks progress.
///
/// Every thread that calls [`push`](Ring::push) or [`pop`](Ring::pop)
/// must first identify itself via
/// [`register_thread`](crate::register_thread) with an id below
/// `max(producers, consumers)`.
pub struct TrackedRing<T> {
    /// Next sequence a producer may claim.
    head: CachePadded<AtomicU64>,
    /// Next sequence a consumer may claim.
    tail: CachePadded<AtomicU64>,
    /// Cached minimum over producer in-flight heads.
    last_head: CachePadded<AtomicU64>,
    /// Cached minimum over consumer in-flight tails.
    last_tail: CachePadded<AtomicU64>,
    positions: Box<[CachePadded<ThreadPos>]>,
    producers: usize,
    consumers: usize,
    slots: Box<[Slot<T>]>,
    mask: u64,
}

// SAFETY: slot handoff is governed by the horizon protocol; each slot
// is touched by one thread at a time, so only T: Send is required.
unsafe impl<T: Send> Send for TrackedRing<T> {}
unsafe impl<T: Send> Sync for TrackedRing<T> {}

impl<T> TrackedRing<T> {
    /// Creates a ring with `capacity` slots (nonzero power of two) and
    /// a position table sized for `max(producers, consumers)` threads.
    pub fn with_topology(capacity: usize, producers: usize, consumers: usize) -> Result<Self> {
        if producers == 0 || consumers == 0 {
            return Err(PoolError::InvalidArgument(format!(
                "tracked ring needs at least one producer and one consumer, \
                 got {producers}/{consumers}"
            )));
        }
        let slots = allocate_slots(capacity)?;
        let entries = producers.max(consumers);
        let positions = (0..entries)
            .map(|_| {
                CachePadded::new(ThreadPos {
                    head: AtomicU64::new(IDLE),
                    tail: AtomicU64::new(IDLE),
                })
            })
            .collect();
        Ok(TrackedRing {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            last_head: CachePadded::new(AtomicU64::new(0)),
            last_tail: CachePadded::new(AtomicU64::new(0)),
            positions,
            producers,
            consumers,
            slots,
            mask: capacity as u64 - 1,
        })
    }

    fn position(&self) -> &ThreadPos {
        let id = registry::raw_id();
        assert!(
            id < self.positions.len(),
            "calling thread is not registered for this ring"
        );
        &self.positions[id]
    }

    #[inline]
    fn slot(&self, seq: u64) -> &Slot<T> {
        &self.slots[(seq & self.mask) as usize]
    }
}

impl<T: Send> Ring for TrackedRing<T> {
    type Item = T;

    fn new(capacity: usize, producers: usize, consumers: usize) -> Result<Self> {
        Self::with_topology(capacity, producers, consumers)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    unsafe fn push(&self, item: T) {
        let pos = self.position();
        let capacity = self.mask + 1;

        // Two-step reservation: publish a conservative head first so a
        // concurrent horizon scan can never observe the incremented
        // global counter while this thread's entry still reads IDLE.
        // SeqCst keeps the entry store and the fetch_add in one total
        // order with the scanners' loads.
        pos.head.store(self.head.load(Ordering::SeqCst), Ordering::SeqCst);
        let seq = self.head.fetch_add(1, Ordering::SeqCst);
        pos.head.store(seq, Ordering::SeqCst);

        // The slot wraps onto one a consumer may still be reading; wait
        // for the consumer horizon to clear it.
        while seq >= self.last_tail.load(Ordering::Acquire) + capacity {
            let mut min = self.tail.load(Ordering::SeqCst);
            for peer in self.positions[..self.consumers].iter() {
                min = min.min(peer.tail.load(Ordering::SeqCst));
            }
            self.last_tail.store(min, Ordering::Release);
            if seq < min + capacity {
                break;
            }
            thread::yield_now();
        }

        // SAFETY: the sequence is exclusively ours and the horizon
        // check proves no consumer still holds the slot.
        unsafe { self.slot(seq).write(item) };

        // The release store orders the slot write before any scanner
        // that observes this entry as idle.
        pos.head.store(IDLE, Ordering::Release);
    }

    unsafe fn pop(&self) -> T {
        let pos = self.position();

        pos.tail.store(self.tail.load(Ordering::SeqCst), Ordering::SeqCst);
        let seq = self.tail.fetch_add(1, Ordering::SeqCst);
        pos.tail.store(seq, Ordering::SeqCst);

        // Wait until every producer at or below our sequence has
        // finished writing.
        while seq >= self.last_head.load(Ordering::Acquire) {
            let mut min = self.head.load(Ordering::SeqCst);
            for peer in self.positions[..self.producers].iter() {
                min = min.min(peer.head.load(Ordering::SeqCst));
            }
            self.last_head.store(min, Ordering::Release);
            if seq < min {
                break;
            }
            thread::yield_now();
        }

        // SAFETY: the sequence is exclusively ours and the horizon
        // check proves the producer finished the slot.
        let item = unsafe { self.slot(seq).take() };

        pos.tail.store(IDLE, Ordering::Release);
        item
    }
}

impl<T> Drop for TrackedRing<T> {
    fn drop(&mut self) {
        // &mut self means no reservation is in flight: live items are
        // exactly [tail, head).
        let mut seq = *self.tail.get_mut();
        let end = *self.head.get_mut();
        while seq < end {
            let idx = (seq & self.mask) as usize;
            // SAFETY: every sequence in the live window holds a
            // completed, not-yet-popped item.
            unsafe { self.slots[idx].drop_in_place() };
            seq += 1;
        }
    }
}
