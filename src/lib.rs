#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Choosing a Storage Strategy
//!
//! | Store | Keys | Lookup cost |
//! |-------|------|-------------|
//! | [`OnDemandAlertableData`] | added at runtime with `subscribe` | hash, bucket read lock, probe |
//! | [`UpFrontAlertableData`] | fixed at construction | hash, probe |
//! | [`NullAlertableData`] | none | nothing |
//!
//! ## Choosing a Lock Policy
//!
//! | Policy | Reads of one key | Locks held |
//! |--------|------------------|------------|
//! | [`MonitorLockPolicy`](policy::MonitorLockPolicy) | exclusive | one per key |
//! | [`SpinLockPolicy`](policy::SpinLockPolicy) | exclusive, busy-waits | one per key |
//! | [`ReadWriteLockPolicy`](policy::ReadWriteLockPolicy) | shared | one per key |
//! | [`BucketLockPolicy`](policy::BucketLockPolicy) | as the inner policy | at most `N` |
//! | [`BucketReadWriteLockPolicy`](policy::BucketReadWriteLockPolicy) | shared | exactly `N` |
//!
//! Bucketed policies bound the number of locks. Keys that share a bucket
//! share a lock, so a writer on one blocks readers of the other.
//!
//! ## Reading and Publishing
//!
//! ```rust
//! use alertable_data::policy::ReadWriteLockPolicy;
//! use alertable_data::OnDemandAlertableData;
//! use std::sync::Arc;
//!
//! let quotes: OnDemandAlertableData<&str, (f64, f64), _> =
//!     OnDemandAlertableData::new(ReadWriteLockPolicy);
//! quotes.subscribe("EURUSD", None);
//!
//! // Producer: derive the next value from the current one
//! quotes.publish(&"EURUSD", 1.0850, |_, bid, current| {
//!     let ask = current.map_or(bid, |quote| quote.1.max(bid));
//!     Some(Arc::new((bid, ask)))
//! });
//!
//! // Consumer: project under the read lock
//! let spread = quotes.try_read(&"EURUSD", (), |_, _, (bid, ask)| ask - bid);
//! assert_eq!(spread, Some(0.0));
//!
//! // Consumer: hold the read lock through a guard
//! let guard = quotes.read(&"EURUSD");
//! assert!(guard.is_subscribed());
//! assert_eq!(guard.data().map(|quote| quote.0), Some(1.0850));
//! guard.release();
//! ```
//!
//! ## Modules
//!
//! - [`lock`]: the [`DataLock`] trait and its implementations
//! - [`policy`]: lock policies
//! - [`storage`]: storage strategies
//! - [`engine`]: the [`AlertableData`] store
//! - [`access`]: consumer and producer traits
//! - [`slot`]: per-key slots and read guards
//! - [`buckets`]: bucket count selection
//! - [`config`]: store configuration

/// Data locks.
///
/// Provides the [`DataLock`] trait plus monitor, spin and reader-writer
/// implementations.
pub mod lock;

/// Lock policies.
///
/// Decide which lock each subscribed key gets, either a fresh one or one
/// shared by a bucket of keys.
pub mod policy;

/// Per-key slots and the guards over them.
pub mod slot;

/// Storage strategies.
///
/// Decide where slots live: added on demand, fixed up front, or nowhere.
pub mod storage;

/// The store itself.
pub mod engine;

/// Consumer and producer traits.
pub mod access;

/// Bucket count selection.
///
/// Scales with the number of CPUs and rounds up to a prime.
pub mod buckets;

/// Store configuration.
pub mod config;

/// Error types.
pub mod error;

mod reentrancy;

pub use access::{AlertableDataConsumer, AlertableDataProducer};
pub use config::AlertableDataConfig;
pub use engine::AlertableData;
pub use error::{Error, Result};
pub use lock::DataLock;
pub use policy::{LockMode, LockPolicy};
pub use slot::{ReadLock, ReadResult, StateData};
pub use storage::{NullAlertableData, OnDemandAlertableData, UpFrontAlertableData};
