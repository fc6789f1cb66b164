//! Process-wide registration of small, dense thread ids.
//!
//! Position-tracked rings index a flat per-thread table, so every thread
//! that touches one needs a contiguous id starting at 0. Ids live in a
//! thread-local: a thread registers itself once, before its first ring
//! call, and pool workers self-register their worker index at startup.

use std::cell::Cell;

/// Sentinel meaning "this thread never registered".
const UNREGISTERED: usize = usize::MAX;

thread_local! {
    static THREAD_ID: Cell<usize> = const { Cell::new(UNREGISTERED) };
}

/// Registers the calling thread under the given id.
///
/// The id must be less than the thread-count bound the ring was built
/// with (`max(producers, consumers)`). Registering again simply
/// overwrites the previous id. Single thread-local write, no atomics.
#[inline]
pub fn register_thread(id: usize) {
    THREAD_ID.with(|c| c.set(id));
}

/// Returns the calling thread's registered id, if any.
#[inline]
pub fn registered_id() -> Option<usize> {
    let id = THREAD_ID.with(Cell::get);
    if id == UNREGISTERED {
        None
    } else {
        Some(id)
    }
}

/// Raw id for table indexing; `usize::MAX` when unregistered, which
/// any bound check against a real table length rejects.
#[inline]
pub(crate) fn raw_id() -> usize {
    THREAD_ID.with(Cell::get)
}
