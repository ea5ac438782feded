//! Storage that grows as keys are subscribed.

use super::{SlotEntry, SlotStorage};
use crate::buckets::bucket_index;
use crate::config::AlertableDataConfig;
use crate::engine::AlertableData;
use crate::error::Result;
use crate::policy::LockPolicy;
use crate::slot::StateData;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::num::NonZeroUsize;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};
use hashbrown::hash_table::{Entry, HashTable};
use hashbrown::DefaultHashBuilder;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

type EntryPtr<K, D, P> = NonNull<SlotEntry<K, <P as LockPolicy>::Lock, D>>;

/// A store whose keys are added at runtime with
/// [`subscribe`](AlertableData::subscribe).
pub type OnDemandAlertableData<K, D, P, S = DefaultHashBuilder> =
    AlertableData<OnDemandStorage<K, D, P>, S>;

/// Slots in a bucketed hash table that accepts new keys at any time.
///
/// Each bucket is a `RwLock` around a table of heap-allocated entries. The
/// bucket lock is only held while probing or inserting; entries never move
/// and are never removed, so a slot found under the bucket's read lock stays
/// valid after it is released.
pub struct OnDemandStorage<K, D, P: LockPolicy> {
    buckets: Box<[RwLock<HashTable<EntryPtr<K, D, P>>>]>,
    len: AtomicUsize,
    policy: P,
}

// SAFETY: the entries behind the raw pointers are owned by the storage and
// freed only in `Drop`. Keys are shared with every thread that looks them up,
// and data crosses threads through `Arc`.
unsafe impl<K: Send + Sync, D: Send + Sync, P: LockPolicy> Send for OnDemandStorage<K, D, P> {}

// SAFETY: see above. Bucket tables are only mutated under their write lock.
unsafe impl<K: Send + Sync, D: Send + Sync, P: LockPolicy> Sync for OnDemandStorage<K, D, P> {}

impl<K, D, P: LockPolicy> OnDemandStorage<K, D, P> {
    pub(crate) fn new(policy: P, buckets: NonZeroUsize) -> Self {
        let buckets: Vec<_> = (0..buckets.get())
            .map(|_| RwLock::new(HashTable::new()))
            .collect();

        Self {
            buckets: buckets.into_boxed_slice(),
            len: AtomicUsize::new(0),
            policy,
        }
    }

    fn bucket(&self, hash: u64) -> &RwLock<HashTable<EntryPtr<K, D, P>>> {
        &self.buckets[bucket_index(hash, self.buckets.len())]
    }

    /// Returns the policy that allocates locks for new keys.
    pub fn lock_policy(&self) -> &P {
        &self.policy
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Adds `key` with `data`, returning `false` if it is already present.
    ///
    /// The lock is allocated before the bucket's write lock is taken. If
    /// another thread inserts the same key in between, the unused lock goes
    /// back to the policy.
    pub(crate) fn subscribe(&self, hash: u64, key: K, data: Option<Arc<D>>) -> bool
    where
        K: Eq,
    {
        let bucket = self.bucket(hash);

        // SAFETY (closures below): every pointer in a table is a live entry.
        if bucket
            .read()
            .find(hash, |entry| unsafe { entry.as_ref() }.matches(&key))
            .is_some()
        {
            return false;
        }

        let lock = self.policy.allocate(&key, hash);

        let mut table = bucket.write();
        if let Entry::Vacant(vacant) = table.entry(
            hash,
            |entry| unsafe { entry.as_ref() }.matches(&key),
            |entry| unsafe { entry.as_ref() }.hash,
        ) {
            let entry = Box::new(SlotEntry::new(hash, key, lock, data));
            vacant.insert(NonNull::from(Box::leak(entry)));
            self.len.fetch_add(1, Ordering::Relaxed);
            trace!(hash, "subscribed key");
            return true;
        }
        drop(table);

        trace!(hash, "lost subscribe race, reclaiming lock");
        self.policy.reclaim(&key, lock);
        false
    }
}

impl<K, D, P: LockPolicy> SlotStorage for OnDemandStorage<K, D, P> {
    type Key = K;
    type Data = D;
    type Lock = P::Lock;

    fn find<Q>(&self, hash: u64, key: &Q) -> Option<(&K, &StateData<P::Lock, D>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let entry = {
            let table = self.bucket(hash).read();
            // SAFETY: every pointer in a table is a live entry.
            *table.find(hash, |entry| unsafe { entry.as_ref() }.matches(key))?
        };

        // SAFETY: entries are never removed or moved and are freed only when
        // the storage drops, which the `&self` borrow rules out.
        let entry = unsafe { entry.as_ref() };
        Some((&entry.key, &*entry.slot))
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    fn for_each_slot<F>(&self, mut f: F)
    where
        F: FnMut(&K, &StateData<P::Lock, D>),
    {
        for bucket in self.buckets.iter() {
            // Snapshot so `f` runs without the bucket lock and may subscribe
            let entries: Vec<_> = bucket.read().iter().copied().collect();
            for entry in entries {
                // SAFETY: as in `find`.
                let entry = unsafe { entry.as_ref() };
                f(&entry.key, &*entry.slot);
            }
        }
    }
}

impl<K, D, P: LockPolicy> Drop for OnDemandStorage<K, D, P> {
    fn drop(&mut self) {
        debug!(
            subscriptions = *self.len.get_mut(),
            buckets = self.buckets.len(),
            "releasing on-demand slots"
        );

        for bucket in self.buckets.iter_mut() {
            for entry in bucket.get_mut().drain() {
                // SAFETY: each entry was leaked from a `Box` in `subscribe` and
                // is removed from its table here, so it is freed exactly once.
                drop(unsafe { Box::from_raw(entry.as_ptr()) });
            }
        }
    }
}

impl<K, D, P: LockPolicy + fmt::Debug> fmt::Debug for OnDemandStorage<K, D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandStorage")
            .field("len", &self.len())
            .field("buckets", &self.buckets.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<K: Hash + Eq, D, P: LockPolicy> OnDemandAlertableData<K, D, P> {
    /// Creates an empty store with the default bucket count and hasher.
    pub fn new(lock_policy: P) -> Self {
        Self::with_buckets(
            lock_policy,
            crate::buckets::bucket_count(),
            DefaultHashBuilder::default(),
        )
    }

    /// Creates an empty store from `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Lock policy and optional bucket count
    /// * `hasher` - Optional custom hash builder. If `None`, uses `DefaultHashBuilder`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBucketCount`](crate::Error::InvalidBucketCount) if the
    /// configured bucket count is zero.
    pub fn init(
        config: AlertableDataConfig<P>,
        hasher: Option<DefaultHashBuilder>,
    ) -> Result<Self> {
        Self::init_with_hasher(config, hasher.unwrap_or_default())
    }
}

impl<K: Hash + Eq, D, P: LockPolicy, S: BuildHasher> OnDemandAlertableData<K, D, P, S> {
    /// Creates an empty store from `config` using `hash_builder` for keys.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidBucketCount`](crate::Error::InvalidBucketCount) if the
    /// configured bucket count is zero.
    pub fn init_with_hasher(config: AlertableDataConfig<P>, hash_builder: S) -> Result<Self> {
        let buckets = config.resolve_buckets()?;
        Ok(Self::with_buckets(config.lock_policy, buckets, hash_builder))
    }

    fn with_buckets(lock_policy: P, buckets: NonZeroUsize, hash_builder: S) -> Self {
        debug!(buckets = buckets.get(), "creating on-demand alertable data");
        AlertableData::from_parts(OnDemandStorage::new(lock_policy, buckets), hash_builder)
    }

    /// Subscribes `key`, optionally with initial data.
    ///
    /// Returns `false` if the key was already subscribed, in which case its
    /// data is left untouched.
    pub fn subscribe(&self, key: K, data: Option<Arc<D>>) -> bool {
        let hash = self.hasher().hash_one(&key);
        self.storage().subscribe(hash, key, data)
    }

    /// Returns the policy that allocates locks for new keys.
    pub fn lock_policy(&self) -> &P {
        self.storage().lock_policy()
    }

    /// Returns the number of buckets keys are partitioned into.
    pub fn bucket_count(&self) -> usize {
        self.storage().bucket_count()
    }
}
