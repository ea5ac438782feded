//! Data Locks
//!
//! A [`DataLock`] guards the data of one logical unit (one slot, or one bucket
//! of slots when a bucketed policy shares a lock between keys). The store
//! brackets every data access with `enter_*`/`exit_*`; callers never touch a
//! lock directly.
//!
//! | Lock | Readers | Waiting |
//! |------|---------|---------|
//! | [`MonitorLock`] | exclusive | parks the thread |
//! | [`SpinLock`] | exclusive | busy-waits |
//! | [`ReadWriteLock`] | shared | parks the thread |
//!
//! None of the locks is reentrant. Acquiring a lock the current thread
//! already holds may deadlock.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_utils::Backoff;
use parking_lot::lock_api::{RawMutex as _, RawRwLock as _};
use parking_lot::{RawMutex, RawRwLock};
use std::sync::Arc;

/// Read and write access to one unit of data.
///
/// # Safety
///
/// Implementations must provide mutual exclusion: while a write is held no
/// other read or write may be held, on any thread. Concurrent reads are
/// permitted. The store relies on this to hand out references into
/// unsynchronized slot storage.
pub unsafe trait DataLock: Send + Sync {
    /// Blocks until read access is granted.
    fn enter_read(&self);

    /// Releases read access.
    ///
    /// # Safety
    ///
    /// The calling thread must hold read access obtained from
    /// [`enter_read`](Self::enter_read) and not yet released.
    unsafe fn exit_read(&self);

    /// Blocks until exclusive write access is granted.
    fn enter_write(&self);

    /// Releases write access.
    ///
    /// # Safety
    ///
    /// The calling thread must hold write access obtained from
    /// [`enter_write`](Self::enter_write) and not yet released.
    unsafe fn exit_write(&self);

    /// Returns `true` if readers may hold the lock concurrently.
    fn allows_concurrent_reads(&self) -> bool {
        false
    }

    /// Address of the lock that is actually taken.
    ///
    /// Forwarding locks such as `Arc<L>` report the inner lock, so every
    /// handle to one shared lock has the same identity.
    fn identity(&self) -> *const () {
        (self as *const Self).cast()
    }
}

/// Exclusive lock that parks waiting threads.
///
/// Readers exclude each other as well as writers.
pub struct MonitorLock {
    raw: RawMutex,
}

impl MonitorLock {
    /// Creates an unlocked monitor.
    pub const fn new() -> Self {
        Self {
            raw: RawMutex::INIT,
        }
    }
}

impl Default for MonitorLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MonitorLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorLock")
            .field("locked", &self.raw.is_locked())
            .finish()
    }
}

// SAFETY: reads and writes both take the same exclusive mutex.
unsafe impl DataLock for MonitorLock {
    #[inline]
    fn enter_read(&self) {
        self.raw.lock();
    }

    #[inline]
    unsafe fn exit_read(&self) {
        // SAFETY: the caller holds the mutex.
        unsafe { self.raw.unlock() }
    }

    #[inline]
    fn enter_write(&self) {
        self.raw.lock();
    }

    #[inline]
    unsafe fn exit_write(&self) {
        // SAFETY: the caller holds the mutex.
        unsafe { self.raw.unlock() }
    }
}

/// Exclusive test-test-and-set lock that busy-waits.
///
/// Meant for critical sections that are a handful of instructions long, such
/// as swapping an `Arc` or copying a few fields out of the data. Waiters back
/// off exponentially and start yielding the thread if the wait drags on.
pub struct SpinLock {
    acquired: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spinlock.
    pub const fn new() -> Self {
        Self {
            acquired: AtomicBool::new(false),
        }
    }

    #[inline]
    fn lock(&self) {
        let backoff = Backoff::new();
        loop {
            // Spin on a relaxed load so the line stays shared until it is free
            while self.acquired.load(Ordering::Relaxed) {
                backoff.snooze();
            }
            if !self.acquired.swap(true, Ordering::Acquire) {
                return;
            }
        }
    }

    #[inline]
    fn unlock(&self) {
        self.acquired.store(false, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.acquired.load(Ordering::Relaxed))
            .finish()
    }
}

// SAFETY: reads and writes both take the same flag with acquire/release ordering.
unsafe impl DataLock for SpinLock {
    #[inline]
    fn enter_read(&self) {
        self.lock();
    }

    #[inline]
    unsafe fn exit_read(&self) {
        self.unlock();
    }

    #[inline]
    fn enter_write(&self) {
        self.lock();
    }

    #[inline]
    unsafe fn exit_write(&self) {
        self.unlock();
    }
}

/// Reader-writer lock: concurrent readers, exclusive writer.
pub struct ReadWriteLock {
    raw: RawRwLock,
}

impl ReadWriteLock {
    /// Creates an unlocked reader-writer lock.
    pub const fn new() -> Self {
        Self {
            raw: RawRwLock::INIT,
        }
    }
}

impl Default for ReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadWriteLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteLock")
            .field("locked", &self.raw.is_locked())
            .finish()
    }
}

// SAFETY: writes take the exclusive side of the rwlock, reads the shared side.
unsafe impl DataLock for ReadWriteLock {
    #[inline]
    fn enter_read(&self) {
        self.raw.lock_shared();
    }

    #[inline]
    unsafe fn exit_read(&self) {
        // SAFETY: the caller holds a shared lock.
        unsafe { self.raw.unlock_shared() }
    }

    #[inline]
    fn enter_write(&self) {
        self.raw.lock_exclusive();
    }

    #[inline]
    unsafe fn exit_write(&self) {
        // SAFETY: the caller holds the exclusive lock.
        unsafe { self.raw.unlock_exclusive() }
    }

    fn allows_concurrent_reads(&self) -> bool {
        true
    }
}

// SAFETY: every holder of the `Arc` goes through the same inner lock.
unsafe impl<L: DataLock> DataLock for Arc<L> {
    #[inline]
    fn enter_read(&self) {
        (**self).enter_read();
    }

    #[inline]
    unsafe fn exit_read(&self) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).exit_read() }
    }

    #[inline]
    fn enter_write(&self) {
        (**self).enter_write();
    }

    #[inline]
    unsafe fn exit_write(&self) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).exit_write() }
    }

    fn allows_concurrent_reads(&self) -> bool {
        (**self).allows_concurrent_reads()
    }

    fn identity(&self) -> *const () {
        (**self).identity()
    }
}

/// Lock type of stores that never hold data. It has no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullLock {}

// SAFETY: no value of this type exists, so none of these can be called.
unsafe impl DataLock for NullLock {
    fn enter_read(&self) {
        match *self {}
    }

    unsafe fn exit_read(&self) {
        match *self {}
    }

    fn enter_write(&self) {
        match *self {}
    }

    unsafe fn exit_write(&self) {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn exercise_exclusive_writes<L: DataLock + Default>() {
        let lock = L::default();
        let counter = AtomicUsize::new(0);
        let inside = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1_000 {
                        lock.enter_write();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        counter.fetch_add(1, Ordering::Relaxed);
                        inside.store(false, Ordering::SeqCst);
                        // SAFETY: entered above.
                        unsafe { lock.exit_write() };
                    }
                });
            }
        });

        assert_eq!(counter.load(Ordering::Relaxed), 8_000);
    }

    #[test]
    fn test_monitor_exclusive_writes() {
        exercise_exclusive_writes::<MonitorLock>();
    }

    #[test]
    fn test_spinlock_exclusive_writes() {
        exercise_exclusive_writes::<SpinLock>();
    }

    #[test]
    fn test_read_write_exclusive_writes() {
        exercise_exclusive_writes::<ReadWriteLock>();
    }

    #[test]
    fn test_arc_exclusive_writes() {
        exercise_exclusive_writes::<Arc<MonitorLock>>();
    }

    #[test]
    fn test_read_write_allows_concurrent_readers() {
        let lock = ReadWriteLock::new();
        let barrier = Barrier::new(2);

        // Both threads must be inside the read lock at the same time to pass the barrier
        thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    lock.enter_read();
                    barrier.wait();
                    // SAFETY: entered above.
                    unsafe { lock.exit_read() };
                });
            }
        });

        assert!(lock.allows_concurrent_reads());
    }

    fn exercise_readers_exclude_each_other<L: DataLock + Default>() {
        let lock = L::default();
        let second_entered = AtomicBool::new(false);

        lock.enter_read();
        thread::scope(|scope| {
            scope.spawn(|| {
                lock.enter_read();
                second_entered.store(true, Ordering::SeqCst);
                // SAFETY: entered above.
                unsafe { lock.exit_read() };
            });

            thread::sleep(Duration::from_millis(50));
            assert!(!second_entered.load(Ordering::SeqCst));
            // SAFETY: entered before the scope.
            unsafe { lock.exit_read() };
        });

        assert!(second_entered.load(Ordering::SeqCst));
        assert!(!lock.allows_concurrent_reads());
    }

    #[test]
    fn test_monitor_readers_exclude_each_other() {
        exercise_readers_exclude_each_other::<MonitorLock>();
    }

    #[test]
    fn test_spinlock_readers_exclude_each_other() {
        exercise_readers_exclude_each_other::<SpinLock>();
    }

    #[test]
    fn test_shared_lock_identity() {
        let lock = Arc::new(MonitorLock::new());
        let other = Arc::clone(&lock);

        assert_eq!(lock.identity(), other.identity());
        assert_eq!(lock.identity(), (*lock).identity());
        assert_ne!(lock.identity(), Arc::new(MonitorLock::new()).identity());
    }

    #[test]
    fn test_spinlock_debug_reports_state() {
        let lock = SpinLock::new();
        assert_eq!(format!("{:?}", lock), "SpinLock { locked: false }");
        lock.enter_write();
        assert_eq!(format!("{:?}", lock), "SpinLock { locked: true }");
        // SAFETY: entered above.
        unsafe { lock.exit_write() };
    }
}
