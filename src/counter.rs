//! # Monotonic id generator.
//!
//! [`Counter`] hands out strictly increasing, never repeating integers starting
//! from a fixed seed. It is used for job ids, execution-context ids and the ids
//! of synchronous message commands.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe monotonically increasing integer generator.
///
/// `next()` is a single atomic `fetch_add`, so any number of concurrent callers
/// receive distinct values. Wrap-around is not handled.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Creates a counter whose first `next()` returns `seed`.
    pub const fn new(seed: u64) -> Self {
        Self {
            value: AtomicU64::new(seed),
        }
    }

    /// Returns a fresh value, greater than every value returned before.
    #[inline]
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the value the next call to `next()` would produce.
    #[inline]
    pub fn peek(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_starts_at_seed() {
        let c = Counter::new(0);
        assert_eq!(c.next(), 0);
        assert_eq!(c.next(), 1);
        assert_eq!(c.peek(), 2);
    }

    #[test]
    fn test_concurrent_callers_get_distinct_values() {
        let counter = Arc::new(Counter::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..1000).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate value {v}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn test_values_increase_per_caller() {
        let c = Counter::new(10);
        let mut last = c.next();
        for _ in 0..100 {
            let v = c.next();
            assert!(v > last);
            last = v;
        }
    }
}
