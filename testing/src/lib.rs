//! # Bookclub Testing
//!
//! Testing utilities and helpers for the bookclub client.
//!
//! This crate provides:
//! - Deterministic clocks for the `Clock` environment trait
//! - A Given-When-Then builder for reducer tests
//! - Assertion helpers for returned effects
//! - A tracing initialiser for test output
//!
//! ## Example
//!
//! ```ignore
//! use bookclub_testing::{ReducerTest, assertions, test_clock};
//!
//! #[test]
//! fn callback_with_token_sets_session() {
//!     ReducerTest::new(AuthReducer::new())
//!         .with_env(test_environment())
//!         .given_state(AuthState::default())
//!         .when_action(AuthAction::CallbackReceived { query })
//!         .then_state(|state| assert!(state.flow.callback_consumed))
//!         .then_effects(assertions::assert_no_effects)
//!         .run();
//! }
//! ```

use bookclub_core::environment::Clock;
use chrono::{DateTime, Utc};

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
    /// use bookclub_testing::mocks::FixedClock;
    /// use bookclub_core::environment::Clock;
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

    /// A clock tests can move forward
    ///
    /// Used to let a session expire between two reads.
    #[derive(Debug)]
    pub struct MockClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl MockClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// 2025-01-01 00:00:00 UTC, the instant every test clock starts at
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        // 1_735_689_600 is always in range
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Tracing setup for tests
pub mod tracing_support {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();

    /// Install a fmt subscriber honouring `RUST_LOG` (default `warn`)
    ///
    /// Safe to call from every test; only the first call installs anything.
    pub fn init_test_tracing() {
        INIT.call_once(|| {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .try_init();
        });
    }
}


// Re-export commonly used items
pub use mocks::{FixedClock, MockClock, epoch, test_clock};
pub use reducer_test::{ReducerTest, assertions};
pub use tracing_support::init_test_tracing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn mock_clock_advances() {
        let clock = MockClock::new(epoch());
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(clock.now() - epoch(), chrono::Duration::hours(2));

        clock.set(epoch());
        assert_eq!(clock.now(), epoch());
    }

    #[test]
    fn tracing_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
    }
}
