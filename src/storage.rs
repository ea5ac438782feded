//! Storage Strategies
//!
//! A storage strategy decides where slots live and how a key finds its slot.
//! The [`AlertableData`](crate::AlertableData) engine only needs the
//! [`SlotStorage`] lookups; everything about locking the data is shared.
//!
//! | Strategy | Keys added | Lookup |
//! |----------|------------|--------|
//! | [`OnDemandStorage`] | any time, via `subscribe` | bucket read lock, then table probe |
//! | [`UpFrontStorage`] | once, at construction | table probe, no locking |
//! | [`NullStorage`] | never | nothing |
//!
//! Both real strategies partition keys into a prime number of buckets by the
//! store's hash, the same hash the lock policy receives.

mod null;
mod on_demand;
mod up_front;

use crate::lock::DataLock;
use crate::slot::StateData;
use core::borrow::Borrow;
use crossbeam_utils::CachePadded;

pub use self::null::{NullAlertableData, NullStorage};
pub use self::on_demand::{OnDemandAlertableData, OnDemandStorage};
pub use self::up_front::{UpFrontAlertableData, UpFrontStorage};

/// Locates the slot for a key.
///
/// Implementations never remove a slot once it is visible: a reference
/// returned by [`find`](Self::find) stays valid for as long as the storage is
/// borrowed.
pub trait SlotStorage {
    /// The key type.
    type Key;
    /// The data type stored per key.
    type Data;
    /// The lock guarding each slot.
    type Lock: DataLock;

    /// Returns the stored key and slot for `key`, whose hash is `hash`.
    fn find<Q>(
        &self,
        hash: u64,
        key: &Q,
    ) -> Option<(&Self::Key, &StateData<Self::Lock, Self::Data>)>
    where
        Self::Key: Borrow<Q>,
        Q: ?Sized + Eq;

    /// Returns the number of subscribed keys.
    fn len(&self) -> usize;

    /// Returns `true` if no key is subscribed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` for every subscribed key and its slot.
    fn for_each_slot<F>(&self, f: F)
    where
        F: FnMut(&Self::Key, &StateData<Self::Lock, Self::Data>);
}

/// A slot together with the key it belongs to and that key's hash.
///
/// The slot sits on cache lines of its own, so taking one key's lock never
/// invalidates the line holding a neighbouring key's lock.
pub(crate) struct SlotEntry<K, L, D> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) slot: CachePadded<StateData<L, D>>,
}

impl<K, L: DataLock, D> SlotEntry<K, L, D> {
    pub(crate) fn new(hash: u64, key: K, lock: L, data: Option<std::sync::Arc<D>>) -> Self {
        Self {
            hash,
            key,
            slot: CachePadded::new(StateData::new(lock, data)),
        }
    }

    #[inline]
    pub(crate) fn matches<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.key.borrow() == key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::SpinLock;
    use crate::policy::{ReadWriteLockPolicy, SpinLockPolicy};
    use crate::{AlertableDataConfig, OnDemandAlertableData, UpFrontAlertableData};
    use std::sync::Arc;

    // Index of the cache line holding each slot's lock
    fn lock_lines<T: SlotStorage>(storage: &T) -> Vec<usize> {
        let line = core::mem::align_of::<CachePadded<u8>>();
        let mut lines = Vec::new();
        storage.for_each_slot(|_, slot| {
            lines.push(slot.lock() as *const T::Lock as usize / line);
        });
        lines
    }

    fn assert_distinct(mut lines: Vec<usize>) {
        let count = lines.len();
        lines.sort_unstable();
        lines.dedup();
        assert_eq!(lines.len(), count, "two slot locks share a cache line");
    }

    #[test]
    fn test_slot_entries_are_cache_padded() {
        assert!(core::mem::align_of::<SlotEntry<u8, SpinLock, u8>>() >= 32);
        assert!(core::mem::size_of::<SlotEntry<u8, SpinLock, u8>>() >= 64);
    }

    #[test]
    fn test_up_front_locks_do_not_share_lines() {
        let config = AlertableDataConfig::new(ReadWriteLockPolicy).with_buckets(1);
        let data = UpFrontAlertableData::init(
            config,
            (0..8_u32).map(|key| (key, Some(Arc::new(key)))),
            None,
        )
        .unwrap();

        let lines = lock_lines(data.storage());
        assert_eq!(lines.len(), 8);
        assert_distinct(lines);
    }

    #[test]
    fn test_on_demand_locks_do_not_share_lines() {
        let config = AlertableDataConfig::new(SpinLockPolicy).with_buckets(1);
        let data: OnDemandAlertableData<u32, u32, _> =
            OnDemandAlertableData::init(config, None).unwrap();
        for key in 0..8 {
            data.subscribe(key, None);
        }

        let lines = lock_lines(data.storage());
        assert_eq!(lines.len(), 8);
        assert_distinct(lines);
    }
}
