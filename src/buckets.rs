//! Bucket sizing.
//!
//! Striped structures in this crate (the on-demand map, the up-front bucket
//! array and the default bucketed lock policies) size themselves from the
//! number of logical CPUs. Most producers feeding a store are I/O bound, so the
//! target is scaled to twice the CPU count and then pushed up to the next prime
//! so that hashes sharing a common factor do not pile into the same bucket.

use core::num::NonZeroUsize;
use tracing::debug;

/// The first 100 primes, ascending.
pub const PRIMES: [usize; 100] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191,
    193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293,
    307, 311, 313, 317, 331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419,
    421, 431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503, 509, 521, 523, 541,
];

/// Returns the smallest prime in [`PRIMES`] strictly greater than `value`.
///
/// Returns `None` once `value` reaches the end of the table.
pub fn first_prime_after(value: usize) -> Option<usize> {
    let idx = PRIMES.partition_point(|&prime| prime <= value);
    PRIMES.get(idx).copied()
}

/// Returns the bucket count for a machine with `cpus` logical CPUs.
///
/// Past the end of the prime table the scaled value is used as is.
pub fn bucket_count_for(cpus: usize) -> NonZeroUsize {
    let scaled = cpus.max(1).saturating_mul(2);

    let buckets = match first_prime_after(scaled) {
        Some(prime) => prime,
        None => {
            debug!(scaled, "scaled cpu count is past the prime table, using it directly");
            scaled
        }
    };

    NonZeroUsize::new(buckets).unwrap_or(NonZeroUsize::MIN)
}

/// Returns the bucket count for this machine.
pub fn bucket_count() -> NonZeroUsize {
    let cpus = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);

    bucket_count_for(cpus)
}

/// Maps a key hash onto one of `buckets` buckets.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn bucket_index(hash: u64, buckets: usize) -> usize {
    // The remainder is below `buckets`, which is a usize.
    (hash % buckets as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_ascending() {
        assert_eq!(PRIMES[0], 2);
        for pair in PRIMES.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[1] % 2, 1);
        }
    }

    #[test]
    fn test_first_prime_after() {
        assert_eq!(first_prime_after(0), Some(2));
        assert_eq!(first_prime_after(2), Some(3));
        assert_eq!(first_prime_after(7), Some(11));
        assert_eq!(first_prime_after(32), Some(37));
    }

    #[test]
    fn test_first_prime_after_past_table() {
        assert_eq!(first_prime_after(541), None);
        assert_eq!(first_prime_after(10_000), None);
    }

    #[test]
    fn test_bucket_count_for() {
        assert_eq!(bucket_count_for(1).get(), 3);
        assert_eq!(bucket_count_for(4).get(), 11);
        assert_eq!(bucket_count_for(16).get(), 37);

        // Zero cpus is treated as one
        assert_eq!(bucket_count_for(0).get(), 3);
    }

    #[test]
    fn test_bucket_count_falls_back_past_table() {
        assert_eq!(bucket_count_for(1_000).get(), 2_000);
    }

    #[test]
    fn test_bucket_count_is_prime_on_this_machine() {
        let buckets = bucket_count().get();
        assert!(buckets >= 3);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0, 7), 0);
        assert_eq!(bucket_index(15, 7), 1);
        assert_eq!(bucket_index(u64::MAX, 1), 0);
    }
}
