//! Time types for VERITY.
//!
//! Log timestamps are milliseconds since the Unix epoch. Wall clock reads go
//! through [`Clock`] so sequencing and tree-head timestamps can be driven
//! deterministically in tests.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch itself
    pub const EPOCH: Self = Self(0);

    /// Create from milliseconds since the epoch
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the epoch
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Add milliseconds, saturating at `u64::MAX`
    #[must_use]
    pub const fn saturating_add(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Subtract milliseconds, saturating at the epoch
    #[must_use]
    pub const fn saturating_sub(&self, millis: u64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future
    #[must_use]
    pub const fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

/// Source of wall clock time
pub trait Clock: Send + Sync {
    /// Current wall clock time
    fn now(&self) -> Timestamp;
}

/// The operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // A clock set before 1970 reads as the epoch.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Timestamp(millis)
    }
}

/// A manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicU64::new(start.as_millis()),
        }
    }

    /// Set the current time
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_millis(), Ordering::SeqCst);
    }

    /// Move the clock forward
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(1_000);
        assert_eq!(t.saturating_add(500).as_millis(), 1_500);
        assert_eq!(t.saturating_sub(5_000), Timestamp::EPOCH);
        assert_eq!(Timestamp::from_millis(1_500).millis_since(t), 500);
        assert_eq!(t.millis_since(Timestamp::from_millis(2_000)), 0);
    }

    #[test]
    fn test_timestamp_ord() {
        assert!(Timestamp::from_millis(1) < Timestamp::from_millis(2));
        assert_eq!(
            Timestamp::from_millis(3).max(Timestamp::from_millis(2)),
            Timestamp::from_millis(3)
        );
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        let now = SystemClock.now();
        assert!(now.as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Timestamp::from_millis(10));
        assert_eq!(clock.now().as_millis(), 10);
        clock.advance(5);
        assert_eq!(clock.now().as_millis(), 15);
        clock.set(Timestamp::from_millis(3));
        assert_eq!(clock.now().as_millis(), 3);
    }

    #[test]
    fn test_shared_clock() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(7)));
        let shared: Arc<ManualClock> = Arc::clone(&clock);
        clock.advance(1);
        assert_eq!(shared.now().as_millis(), 8);
    }

    #[test]
    fn test_timestamp_serde_transparent() {
        let json = serde_json::to_string(&Timestamp::from_millis(42)).unwrap();
        assert_eq!(json, "42");
    }

    proptest! {
        #[test]
        fn prop_millis_since_inverts_add(start in 0u64..u64::MAX / 2, delta in 0u64..u64::MAX / 2) {
            let t = Timestamp::from_millis(start);
            prop_assert_eq!(t.saturating_add(delta).millis_since(t), delta);
            prop_assert_eq!(t.millis_since(t.saturating_add(delta)), 0);
        }
    }
}
