//! Storage fixed at construction.

use super::{SlotEntry, SlotStorage};
use crate::buckets::bucket_index;
use crate::config::AlertableDataConfig;
use crate::engine::AlertableData;
use crate::error::{Error, Result};
use crate::policy::LockPolicy;
use crate::slot::StateData;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::num::NonZeroUsize;
use hashbrown::{DefaultHashBuilder, HashTable};
use std::sync::Arc;
use tracing::debug;

/// A store whose keys are all given at construction.
pub type UpFrontAlertableData<K, D, P, S = DefaultHashBuilder> =
    AlertableData<UpFrontStorage<K, D, P>, S>;

/// Slots in read-only bucket tables built once.
///
/// Lookups take no lock of any kind; only the slot's own lock guards its
/// data.
pub struct UpFrontStorage<K, D, P: LockPolicy> {
    buckets: Box<[HashTable<SlotEntry<K, P::Lock, D>>]>,
    len: usize,
    policy: P,
}

impl<K: Eq, D, P: LockPolicy> UpFrontStorage<K, D, P> {
    /// Builds the tables from `(hash, key, data)` triples.
    ///
    /// Fails on the first key seen twice, reporting its position in the input.
    pub(crate) fn build<I>(policy: P, buckets: NonZeroUsize, subscriptions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, K, Option<Arc<D>>)>,
    {
        let mut tables: Vec<HashTable<SlotEntry<K, P::Lock, D>>> =
            (0..buckets.get()).map(|_| HashTable::new()).collect();
        let mut len = 0;

        for (index, (hash, key, data)) in subscriptions.into_iter().enumerate() {
            let table = &mut tables[bucket_index(hash, buckets.get())];
            if table.find(hash, |entry| entry.matches(&key)).is_some() {
                return Err(Error::DuplicateKey { index });
            }

            let lock = policy.allocate(&key, hash);
            table.insert_unique(hash, SlotEntry::new(hash, key, lock, data), |entry| {
                entry.hash
            });
            len += 1;
        }

        Ok(Self {
            buckets: tables.into_boxed_slice(),
            len,
            policy,
        })
    }
}

impl<K, D, P: LockPolicy> UpFrontStorage<K, D, P> {
    /// Returns the policy the slots' locks came from.
    pub fn lock_policy(&self) -> &P {
        &self.policy
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl<K, D, P: LockPolicy> SlotStorage for UpFrontStorage<K, D, P> {
    type Key = K;
    type Data = D;
    type Lock = P::Lock;

    #[inline]
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<(&K, &StateData<P::Lock, D>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.buckets[bucket_index(hash, self.buckets.len())]
            .find(hash, |entry| entry.matches(key))
            .map(|entry| (&entry.key, &*entry.slot))
    }

    fn len(&self) -> usize {
        self.len
    }

    fn for_each_slot<F>(&self, mut f: F)
    where
        F: FnMut(&K, &StateData<P::Lock, D>),
    {
        for entry in self.buckets.iter().flat_map(HashTable::iter) {
            f(&entry.key, &*entry.slot);
        }
    }
}

impl<K, D, P: LockPolicy + fmt::Debug> fmt::Debug for UpFrontStorage<K, D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpFrontStorage")
            .field("len", &self.len)
            .field("buckets", &self.buckets.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<K: Hash + Eq, D, P: LockPolicy> UpFrontAlertableData<K, D, P> {
    /// Creates a store holding exactly `subscriptions`, with the default
    /// bucket count and hasher.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] if a key appears more than once.
    pub fn new<I>(lock_policy: P, subscriptions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Option<Arc<D>>)>,
    {
        Self::init(AlertableDataConfig::new(lock_policy), subscriptions, None)
    }

    /// Creates a store holding exactly `subscriptions`, configured by `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Lock policy and optional bucket count
    /// * `subscriptions` - Every key with its initial data
    /// * `hasher` - Optional custom hash builder. If `None`, uses `DefaultHashBuilder`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBucketCount`] for a zero bucket count,
    /// [`Error::DuplicateKey`] if a key appears more than once.
    pub fn init<I>(
        config: AlertableDataConfig<P>,
        subscriptions: I,
        hasher: Option<DefaultHashBuilder>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Option<Arc<D>>)>,
    {
        Self::init_with_hasher(config, subscriptions, hasher.unwrap_or_default())
    }
}

impl<K: Hash + Eq, D, P: LockPolicy, S: BuildHasher> UpFrontAlertableData<K, D, P, S> {
    /// Creates a store holding exactly `subscriptions`, hashing keys with
    /// `hash_builder`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBucketCount`] for a zero bucket count,
    /// [`Error::DuplicateKey`] if a key appears more than once.
    pub fn init_with_hasher<I>(
        config: AlertableDataConfig<P>,
        subscriptions: I,
        hash_builder: S,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Option<Arc<D>>)>,
    {
        let buckets = config.resolve_buckets()?;
        let storage = UpFrontStorage::build(
            config.lock_policy,
            buckets,
            subscriptions
                .into_iter()
                .map(|(key, data)| (hash_builder.hash_one(&key), key, data)),
        )?;

        debug!(
            subscriptions = storage.len(),
            buckets = buckets.get(),
            "created up-front alertable data"
        );
        Ok(AlertableData::from_parts(storage, hash_builder))
    }

    /// Returns the policy the slots' locks came from.
    pub fn lock_policy(&self) -> &P {
        self.storage().lock_policy()
    }

    /// Returns the number of buckets keys are partitioned into.
    pub fn bucket_count(&self) -> usize {
        self.storage().bucket_count()
    }
}
