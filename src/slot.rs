//! Per-key slots and the guards that give access to their data.
//!
//! A [`StateData`] pairs one [`DataLock`] with the current value for one key.
//! The value is only ever reached through a guard that holds the lock:
//!
//! - [`ReadAccess`] / [`WriteAccess`]: crate-internal, used by the engine
//!   around callbacks.
//! - [`ReadLock`]: handed to callers of `read`, releases on drop.
//!
//! Guards release in `Drop`, so a panicking callback still unlocks.

use crate::lock::DataLock;
use crate::reentrancy::Reentrancy;
use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

#[cfg(test)]
use core::sync::atomic::{AtomicUsize, Ordering};

/// The lock and current data for one subscribed key.
///
/// A slot does not create its lock, it is given one by a
/// [`LockPolicy`](crate::policy::LockPolicy). The lock is dropped with the slot;
/// for shared locks that only releases this slot's reference.
pub struct StateData<L, D> {
    lock: L,
    data: UnsafeCell<Option<Arc<D>>>,
    #[cfg(test)]
    writes: AtomicUsize,
}

// SAFETY: `data` is only accessed while `lock` is held, shared references under
// read access and replacement under write access. `DataLock` guarantees the two
// exclude each other. `D: Send + Sync` because readers on other threads see
// `&D` and the last `Arc` may be dropped anywhere.
unsafe impl<L: DataLock, D: Send + Sync> Sync for StateData<L, D> {}

impl<L: DataLock, D> StateData<L, D> {
    /// Creates a slot guarded by `lock` holding `data`.
    pub fn new(lock: L, data: Option<Arc<D>>) -> Self {
        Self {
            lock,
            data: UnsafeCell::new(data),
            #[cfg(test)]
            writes: AtomicUsize::new(0),
        }
    }

    /// Returns the lock guarding this slot.
    pub fn lock(&self) -> &L {
        &self.lock
    }

    #[inline]
    pub(crate) fn read(&self) -> ReadAccess<'_, L, D> {
        self.lock.enter_read();
        ReadAccess { slot: self }
    }

    #[inline]
    pub(crate) fn write(&self) -> WriteAccess<'_, L, D> {
        self.lock.enter_write();
        WriteAccess { slot: self }
    }

    #[cfg(test)]
    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<L: fmt::Debug, D> fmt::Debug for StateData<L, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The data needs the lock, so only the lock is shown
        f.debug_struct("StateData")
            .field("lock", &self.lock)
            .finish_non_exhaustive()
    }
}

/// Read access to a slot, released on drop.
pub(crate) struct ReadAccess<'a, L: DataLock, D> {
    slot: &'a StateData<L, D>,
}

impl<L: DataLock, D> ReadAccess<'_, L, D> {
    #[inline]
    pub(crate) fn data(&self) -> Option<&Arc<D>> {
        // SAFETY: read access is held for as long as `self` lives, and the
        // returned reference cannot outlive `self`.
        unsafe { (*self.slot.data.get()).as_ref() }
    }
}

impl<L: DataLock, D> Drop for ReadAccess<'_, L, D> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: entered in `StateData::read`, released exactly once here.
        unsafe { self.slot.lock.exit_read() }
    }
}

/// Write access to a slot, released on drop.
pub(crate) struct WriteAccess<'a, L: DataLock, D> {
    slot: &'a StateData<L, D>,
}

impl<L: DataLock, D> WriteAccess<'_, L, D> {
    #[inline]
    pub(crate) fn current(&self) -> Option<&Arc<D>> {
        // SAFETY: exclusive access is held for as long as `self` lives.
        unsafe { (*self.slot.data.get()).as_ref() }
    }

    /// Stores `next`, returning the previous value so the caller can drop it
    /// after the lock is released.
    #[inline]
    pub(crate) fn replace(&mut self, next: Option<Arc<D>>) -> Option<Arc<D>> {
        #[cfg(test)]
        self.slot.writes.fetch_add(1, Ordering::SeqCst);

        // SAFETY: exclusive access is held, and `&mut self` rules out a
        // reference from `current` still being alive.
        unsafe { core::mem::replace(&mut *self.slot.data.get(), next) }
    }
}

impl<L: DataLock, D> Drop for WriteAccess<'_, L, D> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: entered in `StateData::write`, released exactly once here.
        unsafe { self.slot.lock.exit_write() }
    }
}

/// Guard returned by [`AlertableData::read`](crate::AlertableData::read).
///
/// Holds the key's read lock until dropped (or [`release`](Self::release)d).
/// Data borrowed from the guard cannot outlive it. Keep the guard's scope
/// short: writers to the key, and with bucketed policies to every key sharing
/// its lock, wait until it is released.
///
/// The guard is `!Send`; it must be released on the thread that took it.
///
/// # Re-entrancy
///
/// While the guard is alive the current thread must not call `read`,
/// `try_read`, `try_read_by_ref` or `publish` on the same store, nor on any
/// store sharing this key's lock through a bucketed policy. Debug builds panic
/// if it does.
pub struct ReadLock<'a, K, D, L: DataLock> {
    held: Option<(&'a K, ReadAccess<'a, L, D>)>,
    _reentrancy: Option<Reentrancy>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, K, D, L: DataLock> ReadLock<'a, K, D, L> {
    pub(crate) fn unsubscribed() -> Self {
        Self {
            held: None,
            _reentrancy: None,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn held(key: &'a K, access: ReadAccess<'a, L, D>, reentrancy: Reentrancy) -> Self {
        Self {
            held: Some((key, access)),
            _reentrancy: Some(reentrancy),
            _not_send: PhantomData,
        }
    }

    /// Returns `true` if the key is subscribed.
    #[inline]
    pub fn is_subscribed(&self) -> bool {
        self.held.is_some()
    }

    /// Returns the stored key, if subscribed.
    #[inline]
    pub fn key(&self) -> Option<&K> {
        self.held.as_ref().map(|(key, _)| *key)
    }

    /// Returns the current data. `None` if unsubscribed or never published.
    #[inline]
    pub fn data(&self) -> Option<&D> {
        self.data_arc().map(|data| &**data)
    }

    /// Returns the current data as the shared `Arc` the store holds.
    #[inline]
    pub fn data_arc(&self) -> Option<&Arc<D>> {
        self.held.as_ref().and_then(|(_, access)| access.data())
    }

    /// Returns a copyable view of the read.
    #[inline]
    pub fn result(&self) -> ReadResult<'_, D> {
        ReadResult {
            is_subscribed: self.is_subscribed(),
            data: self.data_arc(),
        }
    }

    /// Releases the lock. Equivalent to dropping the guard.
    #[inline]
    pub fn release(self) {}
}

impl<K: fmt::Debug, D: fmt::Debug, L: DataLock> fmt::Debug for ReadLock<'_, K, D, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadLock")
            .field("key", &self.key())
            .field("data", &self.data())
            .finish()
    }
}

/// The outcome of a [`ReadLock`]: whether the key is subscribed and its data.
///
/// Borrowed from the guard, so it is only valid until the guard is released.
#[derive(Debug)]
pub struct ReadResult<'r, D> {
    /// `true` if the key is subscribed.
    pub is_subscribed: bool,
    /// The current data, if subscribed and published.
    pub data: Option<&'r Arc<D>>,
}

impl<D> Clone for ReadResult<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for ReadResult<'_, D> {}
