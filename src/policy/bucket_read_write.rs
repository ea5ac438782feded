//! Bucketed reader-writer locks, allocated eagerly.

use super::LockPolicy;
use crate::buckets::{self, bucket_index};
use crate::error::{Error, Result};
use crate::lock::ReadWriteLock;
use core::fmt;
use core::num::NonZeroUsize;
use std::sync::Arc;

/// A fixed set of [`ReadWriteLock`]s shared between keys by `hash % N`.
///
/// Unlike [`BucketLockPolicy`](super::BucketLockPolicy) every lock exists from
/// construction, so allocation is a plain index and clone with no install
/// race and nothing to reclaim.
///
/// Stores built on one shared instance (through `&P` or `Arc<P>`) share its
/// locks, so for re-entrancy they count as a single store: code holding a
/// guard on one of them must not call into another.
pub struct BucketReadWriteLockPolicy {
    locks: Box<[Arc<ReadWriteLock>]>,
}

impl BucketReadWriteLockPolicy {
    /// Creates a policy with `number_of_locks` reader-writer locks.
    ///
    /// Fails with [`Error::NoLocks`] if `number_of_locks` is zero.
    pub fn new(number_of_locks: usize) -> Result<Self> {
        let number_of_locks = NonZeroUsize::new(number_of_locks).ok_or(Error::NoLocks)?;
        Ok(Self::with_locks(number_of_locks))
    }

    /// Creates a policy with `number_of_locks` reader-writer locks.
    pub fn with_locks(number_of_locks: NonZeroUsize) -> Self {
        let locks: Vec<_> = (0..number_of_locks.get())
            .map(|_| Arc::new(ReadWriteLock::new()))
            .collect();

        Self {
            locks: locks.into_boxed_slice(),
        }
    }

    /// Creates a policy sized by [`buckets::bucket_count()`].
    pub fn with_default_locks() -> Self {
        Self::with_locks(buckets::bucket_count())
    }

    /// Returns the number of locks.
    pub fn number_of_locks(&self) -> usize {
        self.locks.len()
    }
}

impl Default for BucketReadWriteLockPolicy {
    fn default() -> Self {
        Self::with_default_locks()
    }
}

impl LockPolicy for BucketReadWriteLockPolicy {
    type Lock = Arc<ReadWriteLock>;

    #[inline]
    fn allocate<K: ?Sized>(&self, _key: &K, hash: u64) -> Arc<ReadWriteLock> {
        Arc::clone(&self.locks[bucket_index(hash, self.locks.len())])
    }

    fn reclaim<K: ?Sized>(&self, _key: &K, _lock: Arc<ReadWriteLock>) {}
}

impl fmt::Debug for BucketReadWriteLockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketReadWriteLockPolicy")
            .field("number_of_locks", &self.locks.len())
            .finish()
    }
}
