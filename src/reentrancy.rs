//! Debug-build detection of re-entrant store access.
//!
//! Callbacks passed to `publish`/`try_read`, and code holding a
//! [`ReadLock`](crate::ReadLock), must not call back into the same store.
//! Data locks are not reentrant, so that can deadlock. Debug builds record, per
//! thread, which stores and which data locks are currently held, and panic on
//! re-entry instead. Release builds compile the check away.
//!
//! Locks are tracked as well as stores because a bucketed policy shared
//! between stores hands the same lock to keys of different stores.

#[cfg(debug_assertions)]
mod imp {
    use std::cell::RefCell;

    thread_local! {
        static HELD: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
    }

    /// Marks the current thread as inside `owner` and holding `lock` until
    /// dropped.
    pub(crate) struct Reentrancy {
        owner: usize,
        lock: usize,
    }

    impl Reentrancy {
        pub(crate) fn enter(owner: usize, lock: usize) -> Self {
            HELD.with(|held| {
                let mut held = held.borrow_mut();
                assert!(
                    !held.iter().any(|&(held_owner, _)| held_owner == owner),
                    "re-entrant access to an alertable data store: \
                     callbacks and read guards must not call back into the store holding them"
                );
                assert!(
                    !held.iter().any(|&(_, held_lock)| held_lock == lock),
                    "re-entrant access to a data lock this thread already holds: \
                     stores sharing a bucketed lock policy count as one store"
                );
                held.push((owner, lock));
            });

            Self { owner, lock }
        }
    }

    impl Drop for Reentrancy {
        fn drop(&mut self) {
            HELD.with(|held| {
                let mut held = held.borrow_mut();
                let entry = (self.owner, self.lock);
                if let Some(pos) = held.iter().rposition(|&held| held == entry) {
                    held.swap_remove(pos);
                }
            });
        }
    }
}

#[cfg(not(debug_assertions))]
mod imp {
    pub(crate) struct Reentrancy;

    impl Reentrancy {
        #[inline(always)]
        pub(crate) fn enter(_owner: usize, _lock: usize) -> Self {
            Self
        }
    }
}

pub(crate) use imp::Reentrancy;

#[cfg(all(test, debug_assertions))]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_owners_nest() {
        let _a = Reentrancy::enter(1, 10);
        let _b = Reentrancy::enter(2, 20);
    }

    #[test]
    fn test_owner_released_on_drop() {
        drop(Reentrancy::enter(1, 10));
        let _again = Reentrancy::enter(1, 10);
    }

    #[test]
    #[should_panic(expected = "re-entrant access to an alertable data store")]
    fn test_same_owner_panics() {
        let _a = Reentrancy::enter(1, 10);
        let _b = Reentrancy::enter(1, 20);
    }

    #[test]
    #[should_panic(expected = "re-entrant access to a data lock")]
    fn test_same_lock_from_other_owner_panics() {
        let _a = Reentrancy::enter(1, 10);
        let _b = Reentrancy::enter(2, 10);
    }
}
