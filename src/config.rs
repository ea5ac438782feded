//! Store Configuration
//!
//! Both real storage strategies are built from an [`AlertableDataConfig`]: a
//! lock policy plus an optional bucket count. The hasher is supplied
//! separately, as an `Option<S>` to `init` or directly to `init_with_hasher`.
//!
//! # Examples
//!
//! ```
//! use alertable_data::config::AlertableDataConfig;
//! use alertable_data::policy::ReadWriteLockPolicy;
//! use alertable_data::OnDemandAlertableData;
//!
//! // Default bucket count, derived from the number of CPUs
//! let config = AlertableDataConfig::new(ReadWriteLockPolicy);
//! let data: OnDemandAlertableData<String, u64, _> =
//!     OnDemandAlertableData::init(config, None).unwrap();
//!
//! // Explicit bucket count
//! let config = AlertableDataConfig::new(ReadWriteLockPolicy).with_buckets(7);
//! let data: OnDemandAlertableData<String, u64, _> =
//!     OnDemandAlertableData::init(config, None).unwrap();
//! assert_eq!(data.bucket_count(), 7);
//! ```

use crate::buckets;
use crate::error::{Error, Result};
use core::fmt;
use core::num::NonZeroUsize;

/// Construction-time configuration for a store.
///
/// # Fields
///
/// - `lock_policy`: allocates the per-key [`DataLock`](crate::DataLock)s.
/// - `buckets`: number of buckets the key space is partitioned into.
///   `None` selects [`buckets::bucket_count()`]. Zero is rejected at
///   construction with [`Error::InvalidBucketCount`].
#[derive(Clone, Copy, Default)]
pub struct AlertableDataConfig<P> {
    /// Policy that hands out a lock for every subscribed key.
    pub lock_policy: P,
    /// Bucket count override.
    pub buckets: Option<usize>,
}

impl<P> AlertableDataConfig<P> {
    /// Creates a configuration with the default bucket count.
    pub fn new(lock_policy: P) -> Self {
        Self {
            lock_policy,
            buckets: None,
        }
    }

    /// Overrides the bucket count.
    #[must_use]
    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Returns the bucket count this configuration resolves to.
    pub fn resolve_buckets(&self) -> Result<NonZeroUsize> {
        match self.buckets {
            None => Ok(buckets::bucket_count()),
            Some(buckets) => NonZeroUsize::new(buckets).ok_or(Error::InvalidBucketCount),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for AlertableDataConfig<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertableDataConfig")
            .field("lock_policy", &self.lock_policy)
            .field("buckets", &self.buckets)
            .finish()
    }
}
