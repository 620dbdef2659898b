//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the scheduler runtime.
//!
//! ## Sentinel values
//! - `kill_grace = 0s` → wait indefinitely for killed contexts to stop

use std::borrow::Cow;
use std::time::Duration;

/// Global configuration for the scheduler runtime.
///
/// ## Field semantics
/// - `rng_seed`: seed of the generator behind `Ctx::rand`
/// - `warn_on_drift`: publish a message when a context falls behind real time
/// - `drift_message`: text of that message
/// - `kill_grace`: how long a kill waits for each terminated context (`0s` = forever)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Seed of the shared random generator exposed to job bodies.
    ///
    /// A fixed seed makes `rand` sequences reproducible across restarts.
    pub rng_seed: u64,

    /// Whether `Ctx::sleep` reports falling behind on the message channel.
    ///
    /// Virtual time advances by the requested amount either way.
    pub warn_on_drift: bool,

    /// Message published when a context cannot keep up with real time.
    pub drift_message: Cow<'static, str>,

    /// Upper bound on waiting for a single killed context to stop.
    ///
    /// - `Duration::ZERO` = wait until it stops
    /// - `> 0` = give up waiting (the abort is still pending) and log a warning
    pub kill_grace: Duration,
}

impl Config {
    /// Returns the kill grace as an `Option`.
    ///
    /// - `None` → wait indefinitely
    /// - `Some(d)` → bounded wait per context
    #[inline]
    pub fn kill_grace(&self) -> Option<Duration> {
        if self.kill_grace == Duration::ZERO {
            None
        } else {
            Some(self.kill_grace)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `rng_seed = 0`
    /// - `warn_on_drift = true`
    /// - `drift_message = "Can't keep up..."`
    /// - `kill_grace = 0s` (wait for every killed context)
    fn default() -> Self {
        Self {
            rng_seed: 0,
            warn_on_drift: true,
            drift_message: Cow::Borrowed("Can't keep up..."),
            kill_grace: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_grace_is_unbounded() {
        let cfg = Config::default();
        assert_eq!(cfg.kill_grace(), None);
    }

    #[test]
    fn test_positive_grace() {
        let cfg = Config {
            kill_grace: Duration::from_millis(250),
            ..Config::default()
        };
        assert_eq!(cfg.kill_grace(), Some(Duration::from_millis(250)));
    }
}
