//! Allocation Tests
//!
//! Reads and unchanged publishes must not touch the heap. The global
//! allocator is instrumented, so this file holds a single test to keep other
//! test threads from being counted.

use alertable_data::{LockMode, OnDemandAlertableData, UpFrontAlertableData};
use stats_alloc::{Region, StatsAlloc, INSTRUMENTED_SYSTEM};
use std::alloc::System;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: &StatsAlloc<System> = &INSTRUMENTED_SYSTEM;

#[derive(Debug, Default)]
struct Quote {
    bid: u64,
    ask: u64,
}

#[test]
fn test_hot_paths_do_not_allocate() {
    for mode in LockMode::ALL {
        let on_demand: OnDemandAlertableData<u64, Quote, _> =
            OnDemandAlertableData::new(mode.policy());
        let up_front = UpFrontAlertableData::new(
            mode.policy(),
            (0..64_u64).map(|key| (key, Some(Arc::new(Quote { bid: key, ask: key + 1 })))),
        )
        .unwrap();

        for key in 0..64_u64 {
            on_demand.subscribe(key, Some(Arc::new(Quote { bid: key, ask: key + 1 })));
        }

        // Warm up any lazily installed bucket locks
        for key in 0..64_u64 {
            on_demand.read(&key).release();
            up_front.read(&key).release();
        }

        let region = Region::new(GLOBAL);
        let mut spread = 0;

        for key in 0..64_u64 {
            for store_spread in [
                on_demand.try_read(&key, (), |_, _, q| q.ask - q.bid),
                up_front.try_read(&key, (), |_, _, q| q.ask - q.bid),
            ] {
                spread += store_spread.unwrap_or(0);
            }

            assert!(on_demand.try_read_by_ref(&key, 2, &mut spread, |_, n, q, out| {
                *out += (q.ask - q.bid) * n;
            }));

            let guard = up_front.read(&key);
            assert_eq!(guard.data().map(|q| q.bid), Some(key));
            guard.release();

            assert!(on_demand.publish(&key, (), |_, _, current| current.cloned()));
            assert!(up_front.publish(&key, (), |_, _, current| current.cloned()));

            assert!(!on_demand.is_subscribed(&(key + 1_000)));
            assert!(on_demand.try_read(&(key + 1_000), (), |_, _, q| q.bid).is_none());
        }

        let change = region.change();
        assert_eq!(change.allocations, 0, "{mode}: {change:?}");
        assert_eq!(change.reallocations, 0, "{mode}: {change:?}");
        assert_eq!(spread, 64 * 4, "{mode}");
    }
}
