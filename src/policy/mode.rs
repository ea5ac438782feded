//! Runtime selection of a lock policy.

use super::{
    BucketLockPolicy, BucketReadWriteLockPolicy, LockPolicy, MonitorLockPolicy,
    ReadWriteLockPolicy, SpinLockPolicy,
};
use crate::lock::{DataLock, MonitorLock, ReadWriteLock, SpinLock};
use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

/// The built-in lock policies, for choosing one from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// [`MonitorLockPolicy`]
    Monitor,
    /// [`SpinLockPolicy`]
    SpinLock,
    /// [`ReadWriteLockPolicy`]
    ReadWrite,
    /// [`BucketLockPolicy`] over [`MonitorLockPolicy`]
    BucketMonitor,
    /// [`BucketReadWriteLockPolicy`]
    BucketReadWrite,
}

impl LockMode {
    /// Every mode, in declaration order.
    pub const ALL: [LockMode; 5] = [
        LockMode::Monitor,
        LockMode::SpinLock,
        LockMode::ReadWrite,
        LockMode::BucketMonitor,
        LockMode::BucketReadWrite,
    ];

    /// Builds the policy for this mode. Bucketed modes use the default
    /// bucket count.
    pub fn policy(self) -> AnyLockPolicy {
        match self {
            LockMode::Monitor => AnyLockPolicy::Monitor(MonitorLockPolicy),
            LockMode::SpinLock => AnyLockPolicy::SpinLock(SpinLockPolicy),
            LockMode::ReadWrite => AnyLockPolicy::ReadWrite(ReadWriteLockPolicy),
            LockMode::BucketMonitor => AnyLockPolicy::BucketMonitor(
                BucketLockPolicy::with_default_locks(MonitorLockPolicy),
            ),
            LockMode::BucketReadWrite => {
                AnyLockPolicy::BucketReadWrite(BucketReadWriteLockPolicy::with_default_locks())
            }
        }
    }

    /// Returns `true` for the modes that share locks between keys.
    pub fn is_bucketed(self) -> bool {
        matches!(self, LockMode::BucketMonitor | LockMode::BucketReadWrite)
    }

    fn name(self) -> &'static str {
        match self {
            LockMode::Monitor => "monitor",
            LockMode::SpinLock => "spinlock",
            LockMode::ReadWrite => "read-write",
            LockMode::BucketMonitor => "bucket-monitor",
            LockMode::BucketReadWrite => "bucket-read-write",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown [`LockMode`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lock mode: {0}")]
pub struct ParseLockModeError(String);

impl FromStr for LockMode {
    type Err = ParseLockModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LockMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseLockModeError(s.to_owned()))
    }
}

/// A lock policy picked at runtime through [`LockMode`].
#[derive(Debug)]
pub enum AnyLockPolicy {
    /// See [`MonitorLockPolicy`].
    Monitor(MonitorLockPolicy),
    /// See [`SpinLockPolicy`].
    SpinLock(SpinLockPolicy),
    /// See [`ReadWriteLockPolicy`].
    ReadWrite(ReadWriteLockPolicy),
    /// See [`BucketLockPolicy`].
    BucketMonitor(BucketLockPolicy<MonitorLockPolicy>),
    /// See [`BucketReadWriteLockPolicy`].
    BucketReadWrite(BucketReadWriteLockPolicy),
}

impl AnyLockPolicy {
    /// Returns the mode this policy was built for.
    pub fn mode(&self) -> LockMode {
        match self {
            AnyLockPolicy::Monitor(_) => LockMode::Monitor,
            AnyLockPolicy::SpinLock(_) => LockMode::SpinLock,
            AnyLockPolicy::ReadWrite(_) => LockMode::ReadWrite,
            AnyLockPolicy::BucketMonitor(_) => LockMode::BucketMonitor,
            AnyLockPolicy::BucketReadWrite(_) => LockMode::BucketReadWrite,
        }
    }
}

impl From<LockMode> for AnyLockPolicy {
    fn from(mode: LockMode) -> Self {
        mode.policy()
    }
}

impl LockPolicy for AnyLockPolicy {
    type Lock = AnyLock;

    fn allocate<K: ?Sized>(&self, key: &K, hash: u64) -> AnyLock {
        match self {
            AnyLockPolicy::Monitor(p) => AnyLock::Monitor(p.allocate(key, hash)),
            AnyLockPolicy::SpinLock(p) => AnyLock::SpinLock(p.allocate(key, hash)),
            AnyLockPolicy::ReadWrite(p) => AnyLock::ReadWrite(p.allocate(key, hash)),
            AnyLockPolicy::BucketMonitor(p) => AnyLock::SharedMonitor(p.allocate(key, hash)),
            AnyLockPolicy::BucketReadWrite(p) => AnyLock::SharedReadWrite(p.allocate(key, hash)),
        }
    }

    fn reclaim<K: ?Sized>(&self, key: &K, lock: AnyLock) {
        match (self, lock) {
            (AnyLockPolicy::Monitor(p), AnyLock::Monitor(lock)) => p.reclaim(key, lock),
            (AnyLockPolicy::SpinLock(p), AnyLock::SpinLock(lock)) => p.reclaim(key, lock),
            (AnyLockPolicy::ReadWrite(p), AnyLock::ReadWrite(lock)) => p.reclaim(key, lock),
            (AnyLockPolicy::BucketMonitor(p), AnyLock::SharedMonitor(lock)) => {
                p.reclaim(key, lock)
            }
            (AnyLockPolicy::BucketReadWrite(p), AnyLock::SharedReadWrite(lock)) => {
                p.reclaim(key, lock)
            }
            // A lock from another policy was never ours to reclaim
            (_, lock) => drop(lock),
        }
    }
}

/// The lock handed out by an [`AnyLockPolicy`].
#[derive(Debug)]
pub enum AnyLock {
    /// Per-key monitor.
    Monitor(MonitorLock),
    /// Per-key spinlock.
    SpinLock(SpinLock),
    /// Per-key reader-writer lock.
    ReadWrite(ReadWriteLock),
    /// Monitor shared by a bucket of keys.
    SharedMonitor(Arc<MonitorLock>),
    /// Reader-writer lock shared by a bucket of keys.
    SharedReadWrite(Arc<ReadWriteLock>),
}

macro_rules! dispatch {
    ($lock:expr, $inner:ident => $body:expr) => {
        match $lock {
            AnyLock::Monitor($inner) => $body,
            AnyLock::SpinLock($inner) => $body,
            AnyLock::ReadWrite($inner) => $body,
            AnyLock::SharedMonitor($inner) => $body,
            AnyLock::SharedReadWrite($inner) => $body,
        }
    };
}

// SAFETY: every variant forwards to a lock that upholds the contract itself.
unsafe impl DataLock for AnyLock {
    #[inline]
    fn enter_read(&self) {
        dispatch!(self, lock => lock.enter_read())
    }

    #[inline]
    unsafe fn exit_read(&self) {
        // SAFETY: forwarded from the caller.
        dispatch!(self, lock => unsafe { lock.exit_read() })
    }

    #[inline]
    fn enter_write(&self) {
        dispatch!(self, lock => lock.enter_write())
    }

    #[inline]
    unsafe fn exit_write(&self) {
        // SAFETY: forwarded from the caller.
        dispatch!(self, lock => unsafe { lock.exit_write() })
    }

    fn allows_concurrent_reads(&self) -> bool {
        dispatch!(self, lock => lock.allows_concurrent_reads())
    }

    fn identity(&self) -> *const () {
        dispatch!(self, lock => lock.identity())
    }
}
