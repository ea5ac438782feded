//! Storage that holds nothing.

use super::SlotStorage;
use crate::engine::AlertableData;
use crate::lock::NullLock;
use crate::slot::StateData;
use core::borrow::Borrow;
use core::fmt;
use core::marker::PhantomData;
use hashbrown::DefaultHashBuilder;

/// A store where no key is ever subscribed.
///
/// Every read reports the key as unsubscribed and every publish is refused.
/// Useful wherever a store is required but no data should flow.
pub type NullAlertableData<K, D> = AlertableData<NullStorage<K, D>, DefaultHashBuilder>;

/// Storage that never finds a slot.
pub struct NullStorage<K, D> {
    _marker: PhantomData<fn() -> (K, D)>,
}

impl<K, D> NullStorage<K, D> {
    /// Creates the storage.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, D> Default for NullStorage<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D> fmt::Debug for NullStorage<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NullStorage")
    }
}

impl<K, D> SlotStorage for NullStorage<K, D> {
    type Key = K;
    type Data = D;
    type Lock = NullLock;

    #[inline]
    fn find<Q>(&self, _hash: u64, _key: &Q) -> Option<(&K, &StateData<NullLock, D>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        None
    }

    fn len(&self) -> usize {
        0
    }

    fn for_each_slot<F>(&self, _f: F)
    where
        F: FnMut(&K, &StateData<NullLock, D>),
    {
    }
}

impl<K, D> NullAlertableData<K, D> {
    /// Creates an empty store.
    pub fn new() -> Self {
        AlertableData::from_parts(NullStorage::new(), DefaultHashBuilder::default())
    }
}

impl<K, D> Default for NullAlertableData<K, D> {
    fn default() -> Self {
        Self::new()
    }
}
