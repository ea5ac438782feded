//! Lock Policies
//!
//! A [`LockPolicy`] decides which [`DataLock`] a newly subscribed key gets.
//! The store hashes each key once with its own hasher and passes that hash
//! along, so policies that share locks between keys can bucket without
//! hashing again.
//!
//! # Available Policies
//!
//! | Policy | Lock per | Readers | Reclaim |
//! |--------|----------|---------|---------|
//! | [`MonitorLockPolicy`] | key | exclusive | drops the lock |
//! | [`SpinLockPolicy`] | key | exclusive | drops the lock |
//! | [`ReadWriteLockPolicy`] | key | shared | drops the lock |
//! | [`BucketLockPolicy`] | bucket, installed lazily | as inner policy | no-op |
//! | [`BucketReadWriteLockPolicy`] | bucket, allocated up front | shared | no-op |
//!
//! # Allocate and Reclaim
//!
//! Every lock returned by [`allocate`](LockPolicy::allocate) either becomes
//! the installed lock of a live slot, or is handed back through
//! [`reclaim`](LockPolicy::reclaim). The second case happens when two threads
//! race to subscribe the same key: the loser's lock is never installed.
//! Installed locks are never reclaimed; they are dropped with their slot.
//!
//! # Bucketing
//!
//! The bucketed policies cap the number of distinct locks. Keys whose hashes
//! land in the same bucket share a lock and become as mutually exclusive as
//! if they were the same key.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                 BucketLockPolicy (N = 5)                  │
//! │                                                           │
//! │  hash(k) % 5  ──▶  bucket                                 │
//! │                                                           │
//! │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐   │
//! │  │ lock 0 │ │ empty  │ │ lock 2 │ │ empty  │ │ lock 4 │   │
//! │  └────────┘ └────────┘ └────────┘ └────────┘ └────────┘   │
//! │      ▲                  ▲      ▲                          │
//! │      k1                 k2     k7                         │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod bucket;
mod bucket_read_write;
mod mode;

use crate::lock::{DataLock, MonitorLock, ReadWriteLock, SpinLock};
use tracing::trace;

pub use self::bucket::BucketLockPolicy;
pub use self::bucket_read_write::BucketReadWriteLockPolicy;
pub use self::mode::{AnyLock, AnyLockPolicy, LockMode, ParseLockModeError};

/// Strategy for handing out per-key locks.
pub trait LockPolicy: Send + Sync {
    /// The lock type installed into slots.
    type Lock: DataLock;

    /// Returns a lock usable for `key`, either new or shared.
    ///
    /// `hash` is the store's hash of `key`.
    fn allocate<K: ?Sized>(&self, key: &K, hash: u64) -> Self::Lock;

    /// Takes back a lock returned by [`allocate`](Self::allocate) that was
    /// never installed into a slot.
    fn reclaim<K: ?Sized>(&self, key: &K, lock: Self::Lock);
}

/// One [`MonitorLock`] per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorLockPolicy;

impl LockPolicy for MonitorLockPolicy {
    type Lock = MonitorLock;

    fn allocate<K: ?Sized>(&self, _key: &K, _hash: u64) -> MonitorLock {
        MonitorLock::new()
    }

    fn reclaim<K: ?Sized>(&self, _key: &K, _lock: MonitorLock) {}
}

/// One [`SpinLock`] per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinLockPolicy;

impl LockPolicy for SpinLockPolicy {
    type Lock = SpinLock;

    fn allocate<K: ?Sized>(&self, _key: &K, _hash: u64) -> SpinLock {
        SpinLock::new()
    }

    fn reclaim<K: ?Sized>(&self, _key: &K, _lock: SpinLock) {}
}

/// One [`ReadWriteLock`] per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadWriteLockPolicy;

impl LockPolicy for ReadWriteLockPolicy {
    type Lock = ReadWriteLock;

    fn allocate<K: ?Sized>(&self, _key: &K, _hash: u64) -> ReadWriteLock {
        ReadWriteLock::new()
    }

    fn reclaim<K: ?Sized>(&self, _key: &K, _lock: ReadWriteLock) {
        trace!("reclaiming unused reader-writer lock");
    }
}

impl<P: LockPolicy> LockPolicy for &P {
    type Lock = P::Lock;

    fn allocate<K: ?Sized>(&self, key: &K, hash: u64) -> Self::Lock {
        (**self).allocate(key, hash)
    }

    fn reclaim<K: ?Sized>(&self, key: &K, lock: Self::Lock) {
        (**self).reclaim(key, lock);
    }
}

impl<P: LockPolicy> LockPolicy for std::sync::Arc<P> {
    type Lock = P::Lock;

    fn allocate<K: ?Sized>(&self, key: &K, hash: u64) -> Self::Lock {
        (**self).allocate(key, hash)
    }

    fn reclaim<K: ?Sized>(&self, key: &K, lock: Self::Lock) {
        (**self).reclaim(key, lock);
    }
}
