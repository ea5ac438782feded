//! The read/publish engine shared by every storage strategy.
//!
//! [`AlertableData`] hashes a key once, asks its [`SlotStorage`] for the slot,
//! then does all locking through the slot's [`DataLock`](crate::DataLock).
//!
//! # Callbacks
//!
//! `publish`, `try_read` and `try_read_by_ref` run a caller-supplied function
//! while the key's lock is held. Each takes an extra argument `A` that is
//! passed through untouched, so hot paths can supply state without capturing
//! it.
//!
//! A callback, or code holding a [`ReadLock`], must not call back into the
//! same store, for any key: data locks are not reentrant. Stores built on one
//! shared bucketed policy share locks, so they count as one store here. Debug
//! builds panic when this happens.

use crate::reentrancy::Reentrancy;
use crate::lock::DataLock;
use crate::slot::{ReadLock, StateData};
use crate::storage::SlotStorage;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use hashbrown::DefaultHashBuilder;
use std::sync::Arc;

/// A per-key latest-value store.
///
/// `T` is the storage strategy and `S` hashes keys for both slot lookup and
/// the lock policy. Use the aliases
/// [`OnDemandAlertableData`](crate::OnDemandAlertableData),
/// [`UpFrontAlertableData`](crate::UpFrontAlertableData) and
/// [`NullAlertableData`](crate::NullAlertableData) to build one.
///
/// Lookups accept any borrowed form of the key, as with `HashMap`.
///
/// # Examples
///
/// ```
/// use alertable_data::policy::ReadWriteLockPolicy;
/// use alertable_data::OnDemandAlertableData;
/// use std::sync::Arc;
///
/// let prices: OnDemandAlertableData<String, f64, _> =
///     OnDemandAlertableData::new(ReadWriteLockPolicy);
///
/// assert!(prices.subscribe("VOD.L".to_string(), None));
/// assert!(prices.publish("VOD.L", 1.5, |_, bid, _| Some(Arc::new(bid))));
///
/// assert_eq!(prices.try_read("VOD.L", (), |_, _, px| *px), Some(1.5));
/// assert_eq!(prices.try_read("BP.L", (), |_, _, px| *px), None);
/// ```
pub struct AlertableData<T, S = DefaultHashBuilder> {
    storage: T,
    hash_builder: S,
}

impl<T, S> AlertableData<T, S> {
    pub(crate) fn from_parts(storage: T, hash_builder: S) -> Self {
        Self {
            storage,
            hash_builder,
        }
    }

    /// Returns the storage strategy.
    pub fn storage(&self) -> &T {
        &self.storage
    }

    /// Returns the key hasher.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    #[inline]
    fn owner(&self) -> usize {
        self as *const Self as usize
    }
}

impl<T: SlotStorage, S: BuildHasher> AlertableData<T, S> {
    #[inline]
    fn locate<Q>(&self, key: &Q) -> Option<(&T::Key, &StateData<T::Lock, T::Data>)>
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.storage.find(self.hash_builder.hash_one(key), key)
    }

    #[inline]
    fn enter(&self, slot: &StateData<T::Lock, T::Data>) -> Reentrancy {
        Reentrancy::enter(self.owner(), slot.lock().identity() as usize)
    }

    /// Returns `true` if `key` is subscribed.
    pub fn is_subscribed<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.locate(key).is_some()
    }

    /// Replaces the data for `key` with the result of `transform`.
    ///
    /// `transform` receives the stored key, `arg` and the current data under
    /// the key's write lock. Returning the current `Arc` (or `None` when there
    /// is no data) leaves the slot untouched.
    ///
    /// Returns `false` if `key` is not subscribed, in which case `transform`
    /// is not called.
    pub fn publish<Q, A, F>(&self, key: &Q, arg: A, transform: F) -> bool
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&T::Key, A, Option<&Arc<T::Data>>) -> Option<Arc<T::Data>>,
    {
        let Some((key, slot)) = self.locate(key) else {
            return false;
        };

        let _reentrancy = self.enter(slot);
        let mut access = slot.write();

        let next = transform(key, arg, access.current());
        if same_data(access.current(), next.as_ref()) {
            return true;
        }

        let previous = access.replace(next);
        drop(access);
        // The old value may be the last reference; free it outside the lock
        drop(previous);
        true
    }

    /// Takes the read lock for `key` and returns it as a guard.
    ///
    /// If `key` is not subscribed the guard holds nothing and reports
    /// [`is_subscribed`](ReadLock::is_subscribed) as `false`.
    pub fn read<Q>(&self, key: &Q) -> ReadLock<'_, T::Key, T::Data, T::Lock>
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.locate(key) {
            None => ReadLock::unsubscribed(),
            Some((key, slot)) => {
                let reentrancy = self.enter(slot);
                ReadLock::held(key, slot.read(), reentrancy)
            }
        }
    }

    /// Projects the data for `key` through `project` under the read lock.
    ///
    /// Returns `None` if `key` is not subscribed or has no data yet.
    pub fn try_read<Q, A, R, F>(&self, key: &Q, arg: A, project: F) -> Option<R>
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&T::Key, A, &T::Data) -> R,
    {
        let (key, slot) = self.locate(key)?;

        let _reentrancy = self.enter(slot);
        let access = slot.read();
        let data = access.data()?;
        Some(project(key, arg, data))
    }

    /// Like [`try_read`](Self::try_read), but `project` writes into `result`
    /// instead of returning a value.
    ///
    /// Returns `false`, leaving `result` untouched, if `key` is not subscribed
    /// or has no data yet.
    pub fn try_read_by_ref<Q, A, R, F>(&self, key: &Q, arg: A, result: &mut R, project: F) -> bool
    where
        T::Key: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&T::Key, A, &T::Data, &mut R),
    {
        let Some((key, slot)) = self.locate(key) else {
            return false;
        };

        let _reentrancy = self.enter(slot);
        let access = slot.read();
        match access.data() {
            Some(data) => {
                project(key, arg, data, result);
                true
            }
            None => false,
        }
    }

    /// Returns the number of subscribed keys.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if no key is subscribed.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Calls `f` with every subscribed key. No data lock is taken.
    pub fn for_each_key<F>(&self, mut f: F)
    where
        F: FnMut(&T::Key),
    {
        self.storage.for_each_slot(|key, _| f(key));
    }
}

/// Two absent values count as the same data.
#[inline]
fn same_data<D>(current: Option<&Arc<D>>, next: Option<&Arc<D>>) -> bool {
    match (current, next) {
        (Some(current), Some(next)) => Arc::ptr_eq(current, next),
        (None, None) => true,
        _ => false,
    }
}

impl<T: SlotStorage + fmt::Debug, S> fmt::Debug for AlertableData<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertableData")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{BucketLockPolicy, MonitorLockPolicy, ReadWriteLockPolicy};
    use crate::{OnDemandAlertableData, UpFrontAlertableData};

    fn store() -> OnDemandAlertableData<String, i32, ReadWriteLockPolicy> {
        OnDemandAlertableData::new(ReadWriteLockPolicy)
    }

    #[test]
    fn test_subscribe_without_data_then_publish() {
        let data = store();
        assert!(data.subscribe("X".to_string(), None));

        {
            let guard = data.read("X");
            let result = guard.result();
            assert!(result.is_subscribed);
            assert!(result.data.is_none());
        }

        assert!(data.publish("X", (), |_, _, _| Some(Arc::new(42))));

        let guard = data.read("X");
        assert!(guard.is_subscribed());
        assert_eq!(guard.key().map(String::as_str), Some("X"));
        assert_eq!(guard.data(), Some(&42));
    }

    #[test]
    fn test_unsubscribed_key() {
        let data = store();

        assert!(!data.is_subscribed("nope"));
        assert!(!data.publish("nope", (), |_, _, _| panic!("not subscribed")));
        assert!(!data.read("nope").is_subscribed());
        assert_eq!(data.try_read("nope", (), |_, _, d| *d), None);

        let mut out = -1;
        assert!(!data.try_read_by_ref("nope", (), &mut out, |_, _, d, out| *out = *d));
        assert_eq!(out, -1);
    }

    #[test]
    fn test_try_read_needs_data() {
        let data = store();
        data.subscribe("a".to_string(), None);

        assert!(data.is_subscribed("a"));
        assert_eq!(data.try_read("a", (), |_, _, d| *d), None);

        data.publish("a", 7, |_, seven, _| Some(Arc::new(seven)));
        assert_eq!(data.try_read("a", 3, |_, three, d| *d * three), Some(21));
    }

    #[test]
    fn test_try_read_by_ref_writes_result() {
        let data = store();
        data.subscribe("a".to_string(), Some(Arc::new(5)));

        let mut out = String::new();
        assert!(data.try_read_by_ref("a", "=", &mut out, |key, sep, d, out| {
            out.push_str(key);
            out.push_str(sep);
            out.push_str(&d.to_string());
        }));
        assert_eq!(out, "a=5");
    }

    #[test]
    fn test_publish_sees_current_value() {
        let data = store();
        data.subscribe("n".to_string(), Some(Arc::new(1)));

        for _ in 0..10 {
            assert!(data.publish("n", (), |_, _, current| {
                Some(Arc::new(current.map_or(0, |c| **c) + 1))
            }));
        }
        assert_eq!(data.try_read("n", (), |_, _, d| *d), Some(11));
    }

    #[test]
    fn test_publish_same_reference_does_not_write() {
        let data = store();
        data.subscribe("a".to_string(), Some(Arc::new(1)));
        data.subscribe("b".to_string(), None);

        assert!(data.publish("a", (), |_, _, current| current.cloned()));
        assert!(data.publish("b", (), |_, _, current| current.cloned()));

        let writes = |key: &str| {
            let hash = data.hasher().hash_one(key);
            data.storage().find(hash, key).unwrap().1.writes()
        };
        assert_eq!(writes("a"), 0);
        assert_eq!(writes("b"), 0);

        // An equal value in a new allocation is a change
        assert!(data.publish("a", (), |_, _, _| Some(Arc::new(1))));
        assert_eq!(writes("a"), 1);

        assert!(data.publish("a", (), |_, _, _| None));
        assert_eq!(writes("a"), 2);
        assert_eq!(data.try_read("a", (), |_, _, d| *d), None);
    }

    #[test]
    fn test_publish_releases_previous_value() {
        let data = store();
        let first = Arc::new(1);
        data.subscribe("a".to_string(), Some(Arc::clone(&first)));
        assert_eq!(Arc::strong_count(&first), 2);

        data.publish("a", (), |_, _, _| Some(Arc::new(2)));
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[test]
    fn test_rejected_subscribe_keeps_value() {
        let data = store();
        assert!(data.subscribe("k".to_string(), Some(Arc::new(1))));
        assert!(!data.subscribe("k".to_string(), Some(Arc::new(2))));
        assert_eq!(data.try_read("k", (), |_, _, d| *d), Some(1));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_bucketed_policy_store() {
        let policy = BucketLockPolicy::new(4, MonitorLockPolicy).unwrap();
        let data: OnDemandAlertableData<u32, u32, _> = OnDemandAlertableData::new(policy);

        for key in 0..32 {
            data.subscribe(key, Some(Arc::new(key)));
        }
        for key in 0..32 {
            assert_eq!(data.try_read(&key, (), |_, _, d| *d), Some(key));
        }
        assert!(data.lock_policy().installed_locks() <= 4);
    }

    #[test]
    fn test_for_each_key_and_len() {
        let data = UpFrontAlertableData::new(
            MonitorLockPolicy,
            (0..10_u32).map(|key| (key, None::<Arc<()>>)),
        )
        .unwrap();

        assert_eq!(data.len(), 10);
        assert!(!data.is_empty());

        let mut sum = 0;
        data.for_each_key(|key| sum += key);
        assert_eq!(sum, 45);
    }

    #[test]
    fn test_panicking_transform_releases_lock() {
        let data = store();
        data.subscribe("a".to_string(), Some(Arc::new(1)));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            data.publish("a", (), |_, _, _| panic!("transform failed"));
        }));
        assert!(result.is_err());

        assert!(data.publish("a", (), |_, _, _| Some(Arc::new(2))));
        assert_eq!(data.try_read("a", (), |_, _, d| *d), Some(2));
    }

    // Per-key locks: the two stores share nothing
    #[test]
    fn test_distinct_stores_may_nest() {
        let a = store();
        let b = store();
        a.subscribe("k".to_string(), Some(Arc::new(1)));
        b.subscribe("k".to_string(), None);

        let guard = a.read("k");
        let value = guard.data().copied();
        assert!(b.publish("k", value, |_, v, _| v.map(Arc::new)));
        guard.release();

        assert_eq!(b.try_read("k", (), |_, _, d| *d), Some(1));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "re-entrant access to a data lock")]
    fn test_stores_sharing_bucket_locks_do_not_nest() {
        let policy = Arc::new(BucketLockPolicy::new(1, MonitorLockPolicy).unwrap());
        let a: OnDemandAlertableData<&str, i32, _> =
            OnDemandAlertableData::new(Arc::clone(&policy));
        let b: OnDemandAlertableData<&str, i32, _> =
            OnDemandAlertableData::new(Arc::clone(&policy));
        a.subscribe("k", Some(Arc::new(1)));
        b.subscribe("k", None);

        // Both keys hold the single bucket lock; publishing would self-deadlock
        let _guard = a.read(&"k");
        b.publish(&"k", (), |_, _, _| Some(Arc::new(2)));
    }

    #[test]
    fn test_stores_sharing_bucket_locks_run_in_sequence() {
        let policy = Arc::new(BucketLockPolicy::new(1, MonitorLockPolicy).unwrap());
        let a: OnDemandAlertableData<&str, i32, _> =
            OnDemandAlertableData::new(Arc::clone(&policy));
        let b: OnDemandAlertableData<&str, i32, _> =
            OnDemandAlertableData::new(Arc::clone(&policy));
        a.subscribe("k", Some(Arc::new(1)));
        b.subscribe("k", None);

        let value = a.try_read(&"k", (), |_, _, d| *d);
        assert!(b.publish(&"k", value, |_, v, _| v.map(Arc::new)));
        assert_eq!(b.try_read(&"k", (), |_, _, d| *d), Some(1));
        assert_eq!(policy.installed_locks(), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "re-entrant access")]
    fn test_reentrant_read_panics_in_debug() {
        let data = store();
        data.subscribe("a".to_string(), Some(Arc::new(1)));
        data.subscribe("b".to_string(), Some(Arc::new(2)));

        data.try_read("a", &data, |_, data, _| data.try_read("b", (), |_, _, d| *d));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "re-entrant access")]
    fn test_publish_while_holding_guard_panics_in_debug() {
        let data = store();
        data.subscribe("a".to_string(), Some(Arc::new(1)));

        let _guard = data.read("a");
        data.publish("a", (), |_, _, _| None);
    }
}
