//! Bounded lock-free MPMC rings.
//!
//! Two variants share the reservation/publish idea: claim a
//! monotonically increasing sequence number, touch the slot it maps to,
//! then make the effect visible in order. [`RingBuffer`] orders
//! publication through commit counters; [`TrackedRing`] instead tracks
//! every thread's in-flight sequence in a per-thread table so peers can
//! compute a safe horizon.
//!
//! Neither ring checks capacity on push: the surrounding
//! [`BoundedQueue`](crate::BoundedQueue) gates entry with semaphores so
//! overrun is impossible by construction. That contract is what makes
//! `push`/`pop` `unsafe` here.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crate::error::{PoolError, Result};

mod bounded;
mod tracked;

pub use self::bounded::RingBuffer;
pub use self::tracked::TrackedRing;

/// Default ring capacity, in slots.
pub const DEFAULT_CAPACITY: usize = 4096;

/// A fixed-capacity ring of uninitialized slots, indexed by sequence
/// number modulo the capacity.
///
/// # Safety
///
/// Implementations expose raw occupancy-unchecked operations. Callers
/// must keep the number of in-flight items within `capacity()` — see
/// the per-method contracts.
pub trait Ring: Send + Sync {
    /// The item type stored in the ring's slots.
    type Item: Send;

    /// Creates a ring with the given slot count.
    ///
    /// `capacity` must be a nonzero power of two. Rings that do not
    /// track per-thread positions ignore `producers` and `consumers`;
    /// rings that do use them to size their position table and bound
    /// registered thread ids.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidArgument`] for a zero or
    /// non-power-of-two capacity, or a zero thread count where one is
    /// required.
    fn new(capacity: usize, producers: usize, consumers: usize) -> Result<Self>
    where
        Self: Sized;

    /// The slot count the ring was built with.
    fn capacity(&self) -> usize;

    /// Stores one item into the next reserved slot.
    ///
    /// # Safety
    ///
    /// The caller must guarantee a free slot exists: the number of
    /// pushes that have begun, minus the number of pops that have
    /// completed, must not exceed `capacity()`. Each reuse of a slot
    /// must be externally ordered after the pop that freed it (the
    /// queue's open-slot semaphore provides both).
    unsafe fn push(&self, item: Self::Item);

    /// Moves the item out of the next reserved slot.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the slot holds an item: the number of
    /// pops that have begun must not exceed the number of pushes that
    /// will complete (the queue's full-slot semaphore provides this).
    unsafe fn pop(&self) -> Self::Item;
}

/// One storage cell. Items live only between a push and the matching
/// pop; the ring's destructor drains whatever remains.
pub(crate) struct Slot<T> {
    data: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    pub(crate) const fn new() -> Self {
        Slot {
            data: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// # Safety
    ///
    /// The slot must be vacant, and the caller must hold the exclusive
    /// reservation for it.
    pub(crate) unsafe fn write(&self, item: T) {
        unsafe { (*self.data.get()).write(item) };
    }

    /// # Safety
    ///
    /// The slot must hold an initialized item, and the caller must hold
    /// the exclusive reservation for it. The slot is vacant afterwards.
    pub(crate) unsafe fn take(&self) -> T {
        unsafe { (*self.data.get()).assume_init_read() }
    }

    /// # Safety
    ///
    /// The slot must hold an initialized item. Exclusive access is
    /// guaranteed by the `&mut self` of the calling destructor.
    pub(crate) unsafe fn drop_in_place(&mut self) {
        unsafe { self.data.get_mut().assume_init_drop() };
    }
}

/// Allocates `capacity` vacant slots after validating the count.
pub(crate) fn allocate_slots<T>(capacity: usize) -> Result<Box<[Slot<T>]>> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(PoolError::InvalidArgument(format!(
            "ring capacity must be a nonzero power of two, got {capacity}"
        )));
    }
    Ok((0..capacity).map(|_| Slot::new()).collect())
}
