//! Client-side caches in front of the AURORA REST server.
//!
//! - [`TreeCache`] keeps the entity tree: a group index plus a bounded set
//!   of actively refreshed branches, reconciled into an immutable
//!   [`Snapshot`] after every fetch.
//! - [`RecordPageCache`] keeps one window of the sorted and filtered dataset
//!   listing and serves pages out of it.
//!
//! Both go through a [`SingleFlight`] guard, so concurrent callers asking for
//! the same branch or window share one request.

mod flight;
mod merge;
mod page;
mod snapshot;
mod tree;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use flight::SingleFlight;
pub use page::{Page, RecordPageCache, DEFAULT_SORT_BY, DEFAULT_WINDOW};
pub use snapshot::{Row, Snapshot};
pub use tree::{TreeCache, DEFAULT_TREE_CAPACITY, DEFAULT_TTL, MIN_TREE_CAPACITY};

/// Lock cache state, recovering it from a poisoned mutex. State is only
/// mutated between awaits and is consistent whenever the lock is released.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
