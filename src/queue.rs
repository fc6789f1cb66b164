//! Bounded blocking queue: a ring gated by a pair of semaphores.

use std::fmt;

use thiserror::Error;

use crate::ring::{Ring, RingBuffer};
use crate::semaphore::{FastSemaphore, Semaphore};
use crate::Result;

/// A failed push, handing the rejected item back to the caller.
#[derive(Error)]
pub enum PushError<T> {
    /// No slot was immediately available.
    #[error("queue is full")]
    Full(T),

    /// The queue was closed; the item will never be accepted.
    #[error("queue is closed")]
    Closed(T),
}

impl<T> PushError<T> {
    /// Recovers the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// A bounded MPMC queue with blocking and non-blocking endpoints.
///
/// Two counting semaphores gate the ring: `open_slots` starts at the
/// ring's capacity and admits producers, `full_slots` starts at zero
/// and admits consumers. A thread only ever touches the ring while
/// holding the matching permit, which is what upholds the ring's
/// occupancy contract; `open + full` can therefore never exceed the
/// capacity. A waiter woken by [`close`](BoundedQueue::close) without a
/// permit returns without touching the ring at all.
pub struct BoundedQueue<R: Ring, S: Semaphore = FastSemaphore> {
    ring: R,
    open_slots: S,
    full_slots: S,
}

impl<R: Ring, S: Semaphore> BoundedQueue<R, S> {
    /// Wraps a ring, granting producers one permit per slot.
    pub fn new(ring: R) -> Self {
        let capacity = ring.capacity();
        BoundedQueue {
            ring,
            open_slots: S::with_permits(capacity),
            full_slots: S::with_permits(0),
        }
    }

    /// Slot count of the underlying ring.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Blocks until the item is stored or the queue is closed.
    ///
    /// # Errors
    ///
    /// [`PushError::Closed`] hands the item back when the queue shut
    /// down before a slot opened.
    pub fn push(&self, item: R::Item) -> std::result::Result<(), PushError<R::Item>> {
        if !self.open_slots.wait() {
            return Err(PushError::Closed(item));
        }
        // SAFETY: the open-slot permit reserves a vacant slot and
        // sequences this push after the pop that freed it.
        unsafe { self.ring.push(item) };
        self.full_slots.post();
        Ok(())
    }

    /// Stores the item only if a slot is immediately available.
    ///
    /// # Errors
    ///
    /// [`PushError::Full`] hands the item back without blocking when
    /// every slot is taken (or the queue is closed and drained of
    /// open-slot permits).
    pub fn try_push(&self, item: R::Item) -> std::result::Result<(), PushError<R::Item>> {
        if !self.open_slots.try_wait() {
            return Err(PushError::Full(item));
        }
        // SAFETY: as in `push`.
        unsafe { self.ring.push(item) };
        self.full_slots.post();
        Ok(())
    }

    /// Blocks until an item arrives; `None` means closed and drained.
    pub fn pop(&self) -> Option<R::Item> {
        if !self.full_slots.wait() {
            return None;
        }
        // SAFETY: the full-slot permit corresponds to a completed push.
        let item = unsafe { self.ring.pop() };
        self.open_slots.post();
        Some(item)
    }

    /// Takes an item only if one is immediately available.
    pub fn try_pop(&self) -> Option<R::Item> {
        if !self.full_slots.try_wait() {
            return None;
        }
        // SAFETY: as in `pop`.
        let item = unsafe { self.ring.pop() };
        self.open_slots.post();
        Some(item)
    }

    /// Closes both semaphores, waking every blocked producer and
    /// consumer. Items already queued remain poppable, and a producer
    /// that still finds an open slot may complete its push; consumers
    /// see `None` once the queue drains.
    pub fn close(&self) {
        self.open_slots.close();
        self.full_slots.close();
    }
}

impl<T: Send> BoundedQueue<RingBuffer<T>> {
    /// Convenience constructor over the commit-ordered ring and fast
    /// semaphores.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self::new(RingBuffer::with_capacity(capacity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semaphore::BlockingSemaphore;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn try_ops_respect_bounds() {
        let queue = BoundedQueue::with_capacity(2).unwrap();
        assert!(queue.try_pop().is_none());

        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        match queue.try_push(3) {
            Err(PushError::Full(item)) => assert_eq!(item, 3),
            other => panic!("expected Full, got {other:?}"),
        }

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn push_blocks_until_a_slot_opens() {
        let queue = Arc::new(BoundedQueue::with_capacity(2).unwrap());
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(3))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.pop(), Some(1));
        producer.join().unwrap().unwrap();
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn close_drains_then_reports_none() {
        let queue = BoundedQueue::with_capacity(2).unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.close();

        // A closed queue with no open slots refuses new items.
        match queue.push(3) {
            Err(PushError::Closed(item)) => assert_eq!(item, 3),
            other => panic!("expected Closed, got {other:?}"),
        }

        // Queued items survive the close...
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        // ...then consumers see the terminal state.
        assert!(queue.pop().is_none());
    }

    #[test]
    fn close_wakes_blocked_consumers() {
        let queue: Arc<BoundedQueue<RingBuffer<u32>>> =
            Arc::new(BoundedQueue::with_capacity(4).unwrap());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();
        for consumer in consumers {
            assert!(consumer.join().unwrap().is_none());
        }
    }

    #[test]
    fn blocking_semaphore_variant_round_trips() {
        let ring = RingBuffer::with_capacity(4).unwrap();
        let queue: BoundedQueue<_, BlockingSemaphore> = BoundedQueue::new(ring);
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
    }
}
