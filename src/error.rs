//! Construction-time errors.
//!
//! Only constructors fail. Every steady-state operation (publish, read,
//! subscribe, ...) reports "not subscribed" or "no data" through its return
//! value, so nothing on a hot path ever builds an [`Error`].

use thiserror::Error;

/// Result alias used by every fallible constructor in this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while building a store or a lock policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A bucket count of zero was requested.
    #[error("bucket count must be at least 1")]
    InvalidBucketCount,

    /// A bucketed lock policy was asked to manage zero locks.
    #[error("need at least one lock")]
    NoLocks,

    /// The same key appeared twice in an up-front subscription set.
    #[error("duplicate key at position {index} of the subscription set")]
    DuplicateKey {
        /// Zero-based position of the second occurrence.
        index: usize,
    },
}
