//! # Carelane Testing
//!
//! Testing utilities for Carelane reducers and engine functions.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - The Given-When-Then [`ReducerTest`] harness
//! - Effect assertion helpers
//! - proptest strategies for timestamps
//!
//! ## Example
//!
//! ```ignore
//! use carelane_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(LifecycleReducer)
//!     .with_env(environment(test_clock()))
//!     .given_state(LifecycleState::default())
//!     .when_action(LifecycleAction::RegisterActor { actor })
//!     .then_state(|state| assert_eq!(state.actors.len(), 1))
//!     .run();
//! ```

use carelane_core::environment::Clock;
use chrono::{DateTime, Utc};


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use carelane_testing::mocks::FixedClock;
    /// use carelane_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Lifecycle tests walk a request through several milestones; advancing
    /// the clock between steps makes the stamped timestamps distinguishable.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock starting at `start`
        #[must_use]
        pub const fn new(start: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(start),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }

        /// Set the clock to an absolute time (may move backwards)
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.lock() {
                *time = to;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.lock().map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// The instant every default test clock starts at (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(1_735_689_600)
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }
}

/// Property-based testing utilities using proptest
pub mod properties {
    use super::mocks::test_epoch;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    /// Timestamps within one year after the test epoch, at minute resolution
    pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (0_i64..525_600).prop_map(|minutes| test_epoch() + Duration::minutes(minutes))
    }

    /// A non-empty run of clock steps in minutes, used to walk a lifecycle
    pub fn clock_steps(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(-120_i64..240, 1..=max_len.max(1))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};
