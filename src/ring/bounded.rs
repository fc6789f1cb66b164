//! Commit-ordered MPMC ring buffer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam::utils::CachePadded;

use super::{allocate_slots, Ring, Slot};
use crate::error::Result;

/// Bounded MPMC ring using a two-phase reservation/publish protocol.
///
/// Producers race on `push_reserve` to claim a sequence number, build
/// the item in the slot that sequence maps to, then advance
/// `push_commit` strictly in sequence order. Consumers mirror the
/// protocol on `pop_reserve`/`pop_commit`. In-order publication means a
/// single monotonic counter tells every consumer the highest safe
/// sequence, at the cost of a short spin when reservations complete out
/// of order.
///
/// Counter invariants outside a reservation window:
/// `pop_commit <= push_commit`, `push_commit <= push_reserve`,
/// `pop_commit <= pop_reserve`, and occupancy never exceeds capacity
/// (enforced by the enclosing queue's semaphores, not here).
///
/// Each counter sits on its own cache line; producers and consumers
/// otherwise share nothing but the slots.
pub struct RingBuffer<T> {
    push_reserve: CachePadded<AtomicU64>,
    push_commit: CachePadded<AtomicU64>,
    pop_reserve: CachePadded<AtomicU64>,
    pop_commit: CachePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    mask: u64,
}

// SAFETY: slots are handed between threads by the reservation protocol;
// a slot is touched by exactly one thread at a time, so only T: Send is
// required.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Creates a ring with `capacity` slots (nonzero power of two).
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let slots = allocate_slots(capacity)?;
        Ok(RingBuffer {
            push_reserve: CachePadded::new(AtomicU64::new(0)),
            push_commit: CachePadded::new(AtomicU64::new(0)),
            pop_reserve: CachePadded::new(AtomicU64::new(0)),
            pop_commit: CachePadded::new(AtomicU64::new(0)),
            slots,
            mask: capacity as u64 - 1,
        })
    }

    #[inline]
    fn slot(&self, seq: u64) -> &Slot<T> {
        &self.slots[(seq & self.mask) as usize]
    }
}

impl<T: Send> Ring for RingBuffer<T> {
    type Item = T;

    fn new(capacity: usize, _producers: usize, _consumers: usize) -> Result<Self> {
        Self::with_capacity(capacity)
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    unsafe fn push(&self, item: T) {
        // Publication order comes from the commit counter below, so the
        // reservation itself needs no ordering.
        let seq = self.push_reserve.fetch_add(1, Ordering::Relaxed);
        // SAFETY: the sequence is exclusively ours and the caller
        // guarantees the slot it maps to is vacant.
        unsafe { self.slot(seq).write(item) };

        // Publish strictly in sequence order so consumers can trust a
        // single monotonic counter.
        while self.push_commit.load(Ordering::Acquire) != seq {
            thread::yield_now();
        }
        self.push_commit.store(seq + 1, Ordering::Release);
    }

    unsafe fn pop(&self) -> T {
        let seq = self.pop_reserve.fetch_add(1, Ordering::Relaxed);

        // The acquire load pairs with the producer's commit store: once
        // push_commit passes our sequence, the slot's contents are
        // visible on any architecture, not just TSO ones.
        while self.push_commit.load(Ordering::Acquire) <= seq {
            thread::yield_now();
        }
        // SAFETY: the sequence is exclusively ours and the commit
        // counter proves the slot holds a published item.
        let item = unsafe { self.slot(seq).take() };

        // Retire in sequence order; producers read pop_commit's
        // progress indirectly through the open-slot semaphore.
        while self.pop_commit.load(Ordering::Acquire) != seq {
            thread::yield_now();
        }
        self.pop_commit.store(seq + 1, Ordering::Release);
        item
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        // Live items occupy [pop_commit, push_commit); both windows are
        // quiescent once we hold &mut self.
        let mut seq = *self.pop_commit.get_mut();
        let end = *self.push_commit.get_mut();
        while seq < end {
            let idx = (seq & self.mask) as usize;
            // SAFETY: every sequence in the live window holds a
            // published, not-yet-popped item.
            unsafe { self.slots[idx].drop_in_place() };
            seq += 1;
        }
    }
}
