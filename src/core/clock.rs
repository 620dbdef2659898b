//! # Logical clock.
//!
//! Every execution context carries its own [`VirtualTime`]. It starts at the
//! real time of the root context's creation and only moves when the context
//! sleeps (or adopts a rendezvous partner's time in `wait`).
//!
//! Sleeping is drift tolerant: the context sleeps until `virtual + d` measured
//! on the real clock, so jitter in earlier steps is absorbed instead of
//! accumulated. When the target is already in the past the context does not
//! sleep at all; it reports [`Advance::Behind`] and still moves its virtual
//! time by exactly `d`.
//!
//! ```text
//!  virtual:  t0 ──────d────── t0+d ──────d────── t0+2d
//!  real:     t0 ──work──┐sleep┘     ──work (too long)──┐ no sleep, "behind"
//! ```
//!
//! Times are offsets from the [`Clock`]'s origin (the moment the scheduler was
//! built) and are read from `tokio::time`, so tests can pause and advance them.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Logical time of an execution context.
///
/// Serialized as whole nanoseconds so it survives a trip through a JSON
/// payload unchanged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "u64", into = "u64")]
pub struct VirtualTime(Duration);

impl VirtualTime {
    /// The clock origin.
    pub const ZERO: VirtualTime = VirtualTime(Duration::ZERO);

    /// Offset from the clock origin.
    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Offset from the clock origin in seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }
}

impl From<Duration> for VirtualTime {
    fn from(d: Duration) -> Self {
        VirtualTime(d)
    }
}

impl From<u64> for VirtualTime {
    fn from(nanos: u64) -> Self {
        VirtualTime(Duration::from_nanos(nanos))
    }
}

impl From<VirtualTime> for u64 {
    fn from(t: VirtualTime) -> Self {
        t.0.as_nanos().min(u128::from(u64::MAX)) as u64
    }
}

impl Add<Duration> for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: Duration) -> VirtualTime {
        VirtualTime(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// Result of [`Clock::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Zero duration: nothing happened.
    Immediate,
    /// Slept until the target.
    Slept,
    /// The target was already in the past by `lag`; no sleep happened.
    Behind { lag: Duration },
}

/// Shared real-time reference for all virtual times of one scheduler.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Starts a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current real time expressed on the virtual time axis.
    pub fn now(&self) -> VirtualTime {
        VirtualTime(self.origin.elapsed())
    }

    fn instant_of(&self, t: VirtualTime) -> Instant {
        self.origin + t.0
    }

    /// Moves `time` forward by exactly `d`, sleeping only if the target lies
    /// in the future.
    ///
    /// If the calling task is aborted while sleeping, `time` is left as it was.
    pub async fn advance(&self, time: &mut VirtualTime, d: Duration) -> Advance {
        if d.is_zero() {
            return Advance::Immediate;
        }

        let target = *time + d;
        let now = self.now();
        let outcome = if now > target {
            Advance::Behind {
                lag: now.0 - target.0,
            }
        } else {
            tokio::time::sleep_until(self.instant_of(target)).await;
            Advance::Slept
        };

        *time = target;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_zero_advance_is_a_no_op() {
        let clock = Clock::new();
        tokio::time::advance(Duration::from_secs(5)).await;
        let mut t = VirtualTime::ZERO;

        let before = Instant::now();
        assert_eq!(clock.advance(&mut t, Duration::ZERO).await, Advance::Immediate);
        assert_eq!(t, VirtualTime::ZERO);
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_time_advance_sleeps_until_target() {
        let clock = Clock::new();
        let mut t = clock.now();
        let start = t;

        let outcome = clock.advance(&mut t, Duration::from_millis(250)).await;

        assert_eq!(outcome, Advance::Slept);
        assert_eq!(t, start + Duration::from_millis(250));
        assert!(clock.now() >= t);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_absorbs_jitter() {
        let clock = Clock::new();
        let mut t = clock.now();
        let start = t;

        // Work that takes 100ms out of a 250ms step.
        tokio::time::advance(Duration::from_millis(100)).await;
        clock.advance(&mut t, Duration::from_millis(250)).await;

        let now = clock.now();
        assert!(now >= start + Duration::from_millis(250));
        assert!(now < start + Duration::from_millis(260));
    }

    #[tokio::test(start_paused = true)]
    async fn test_behind_advances_exactly_without_sleeping() {
        let clock = Clock::new();
        let mut t = clock.now();
        let start = t;

        tokio::time::advance(Duration::from_secs(3)).await;
        let before = Instant::now();
        let outcome = clock.advance(&mut t, Duration::from_secs(1)).await;

        assert_eq!(
            outcome,
            Advance::Behind {
                lag: Duration::from_secs(2)
            }
        );
        assert_eq!(t, start + Duration::from_secs(1));
        assert_eq!(Instant::now(), before);
    }

    #[test]
    fn test_nanosecond_conversion() {
        let t = VirtualTime::from(Duration::new(1, 5));
        assert_eq!(u64::from(t), 1_000_000_005);
        assert_eq!(VirtualTime::from(1_000_000_005u64), t);
    }
}
