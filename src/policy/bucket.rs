//! Bucketed adapter over any lock policy.

use super::LockPolicy;
use crate::buckets::{self, bucket_index};
use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use core::fmt;
use core::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

/// Turns any lock policy into a bucketed one.
///
/// Holds a fixed array of `N` lock slots indexed by `hash % N`. The first key
/// that maps to an empty slot asks the inner policy for a lock and installs it
/// with a single compare-and-swap. A thread that loses that race hands its
/// lock straight back to the inner policy's [`reclaim`](LockPolicy::reclaim).
/// Once installed, a slot's lock is permanent and shared by every key that
/// hashes into it.
///
/// Reclaiming through the adapter is a no-op: the lock it handed out may
/// already belong to other slots.
///
/// Stores built on one shared instance (through `&P` or `Arc<P>`) share its
/// locks, so for re-entrancy they count as a single store: code holding a
/// guard on one of them must not call into another.
///
/// # Example
///
/// ```
/// use alertable_data::policy::{BucketLockPolicy, LockPolicy, MonitorLockPolicy};
/// use std::sync::Arc;
///
/// let policy = BucketLockPolicy::new(4, MonitorLockPolicy).unwrap();
///
/// // 2 and 6 both land in bucket 2
/// let a = policy.allocate("a", 2);
/// let b = policy.allocate("b", 6);
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct BucketLockPolicy<P: LockPolicy> {
    locks: Box<[ArcSwapOption<P::Lock>]>,
    inner: P,
}

impl<P: LockPolicy> BucketLockPolicy<P> {
    /// Creates an adapter managing `number_of_locks` shared locks.
    ///
    /// Fails with [`Error::NoLocks`] if `number_of_locks` is zero.
    pub fn new(number_of_locks: usize, inner: P) -> Result<Self> {
        let number_of_locks = NonZeroUsize::new(number_of_locks).ok_or(Error::NoLocks)?;
        Ok(Self::with_locks(number_of_locks, inner))
    }

    /// Creates an adapter managing `number_of_locks` shared locks.
    pub fn with_locks(number_of_locks: NonZeroUsize, inner: P) -> Self {
        let locks: Vec<_> = (0..number_of_locks.get())
            .map(|_| ArcSwapOption::empty())
            .collect();

        Self {
            locks: locks.into_boxed_slice(),
            inner,
        }
    }

    /// Creates an adapter sized by [`buckets::bucket_count()`].
    pub fn with_default_locks(inner: P) -> Self {
        Self::with_locks(buckets::bucket_count(), inner)
    }

    /// Returns the number of buckets.
    pub fn number_of_locks(&self) -> usize {
        self.locks.len()
    }

    /// Returns how many buckets have had a lock installed so far.
    pub fn installed_locks(&self) -> usize {
        self.locks.iter().filter(|slot| slot.load().is_some()).count()
    }

    /// Returns the wrapped policy.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: LockPolicy> LockPolicy for BucketLockPolicy<P> {
    type Lock = Arc<P::Lock>;

    fn allocate<K: ?Sized>(&self, key: &K, hash: u64) -> Arc<P::Lock> {
        let bucket = bucket_index(hash, self.locks.len());
        let slot = &self.locks[bucket];

        // Once every bucket is populated this is the only path taken
        if let Some(existing) = slot.load_full() {
            return existing;
        }

        let fresh = Arc::new(self.inner.allocate(key, hash));
        let previous = slot.compare_and_swap(&None::<Arc<P::Lock>>, Some(Arc::clone(&fresh)));

        let existing = match &*previous {
            None => {
                trace!(bucket, "installed bucket lock");
                return fresh;
            }
            Some(existing) => Arc::clone(existing),
        };
        drop(previous);

        // Another thread installed a lock between the load and the swap.
        // Ours was never published, so we hold the only reference.
        if let Ok(lock) = Arc::try_unwrap(fresh) {
            trace!(bucket, "lost bucket install race, reclaiming lock");
            self.inner.reclaim(key, lock);
        }

        existing
    }

    fn reclaim<K: ?Sized>(&self, _key: &K, _lock: Arc<P::Lock>) {}
}

impl<P: LockPolicy + fmt::Debug> fmt::Debug for BucketLockPolicy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bucket({:?})", self.inner)
    }
}
