//! Read-side and write-side views of a store.
//!
//! Code that only reads can take an [`AlertableDataConsumer`], code that only
//! publishes an [`AlertableDataProducer`]. Every [`AlertableData`] is both.

use crate::engine::AlertableData;
use crate::lock::DataLock;
use crate::slot::ReadLock;
use crate::storage::SlotStorage;
use core::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// The read operations of a store keyed by `K` holding `D`.
pub trait AlertableDataConsumer<K, D> {
    /// The lock a [`ReadLock`] holds.
    type Lock: DataLock;

    /// See [`AlertableData::is_subscribed`].
    fn is_subscribed(&self, key: &K) -> bool;

    /// See [`AlertableData::read`].
    fn read(&self, key: &K) -> ReadLock<'_, K, D, Self::Lock>;

    /// See [`AlertableData::try_read`].
    fn try_read<A, R, F>(&self, key: &K, arg: A, project: F) -> Option<R>
    where
        F: FnOnce(&K, A, &D) -> R;

    /// See [`AlertableData::try_read_by_ref`].
    fn try_read_by_ref<A, R, F>(&self, key: &K, arg: A, result: &mut R, project: F) -> bool
    where
        F: FnOnce(&K, A, &D, &mut R);
}

/// The write operation of a store keyed by `K` holding `D`.
pub trait AlertableDataProducer<K, D> {
    /// See [`AlertableData::publish`].
    fn publish<A, F>(&self, key: &K, arg: A, transform: F) -> bool
    where
        F: FnOnce(&K, A, Option<&Arc<D>>) -> Option<Arc<D>>;
}

impl<T, S> AlertableDataConsumer<T::Key, T::Data> for AlertableData<T, S>
where
    T: SlotStorage,
    T::Key: Hash + Eq,
    S: BuildHasher,
{
    type Lock = T::Lock;

    fn is_subscribed(&self, key: &T::Key) -> bool {
        AlertableData::is_subscribed(self, key)
    }

    fn read(&self, key: &T::Key) -> ReadLock<'_, T::Key, T::Data, T::Lock> {
        AlertableData::read(self, key)
    }

    fn try_read<A, R, F>(&self, key: &T::Key, arg: A, project: F) -> Option<R>
    where
        F: FnOnce(&T::Key, A, &T::Data) -> R,
    {
        AlertableData::try_read(self, key, arg, project)
    }

    fn try_read_by_ref<A, R, F>(&self, key: &T::Key, arg: A, result: &mut R, project: F) -> bool
    where
        F: FnOnce(&T::Key, A, &T::Data, &mut R),
    {
        AlertableData::try_read_by_ref(self, key, arg, result, project)
    }
}

impl<T, S> AlertableDataProducer<T::Key, T::Data> for AlertableData<T, S>
where
    T: SlotStorage,
    T::Key: Hash + Eq,
    S: BuildHasher,
{
    fn publish<A, F>(&self, key: &T::Key, arg: A, transform: F) -> bool
    where
        F: FnOnce(&T::Key, A, Option<&Arc<T::Data>>) -> Option<Arc<T::Data>>,
    {
        AlertableData::publish(self, key, arg, transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SpinLockPolicy;
    use crate::OnDemandAlertableData;

    fn feed<P: AlertableDataProducer<String, u64>>(producer: &P, key: &String, px: u64) -> bool {
        producer.publish(key, px, |_, px, _| Some(Arc::new(px)))
    }

    fn last<C: AlertableDataConsumer<String, u64>>(consumer: &C, key: &String) -> Option<u64> {
        consumer.try_read(key, (), |_, _, px| *px)
    }

    #[test]
    fn test_store_through_traits() {
        let data: OnDemandAlertableData<String, u64, _> =
            OnDemandAlertableData::new(SpinLockPolicy);
        let key = "VOD.L".to_string();

        assert!(!feed(&data, &key, 1));
        data.subscribe(key.clone(), None);
        assert!(feed(&data, &key, 101));

        assert_eq!(last(&data, &key), Some(101));
        assert!(AlertableDataConsumer::is_subscribed(&data, &key));

        let guard = AlertableDataConsumer::read(&data, &key);
        assert_eq!(guard.data(), Some(&101));
        drop(guard);

        let mut out = 0;
        assert!(AlertableDataConsumer::try_read_by_ref(&data, &key, 2, &mut out, |_, two, px, out| {
            *out = *px * two;
        }));
        assert_eq!(out, 202);
    }
}
