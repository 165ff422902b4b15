//! # Azurea Testing
//!
//! Testing utilities and helpers for the Azurea booking client.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - A Given-When-Then harness for reducers (`ReducerTest`)
//! - Inline effect execution (`drain_effects`, `run_to_idle`)
//! - Tracing setup for tests (`init_test_tracing`)
//!
//! ## Example
//!
//! ```ignore
//! use azurea_testing::{ManualClock, run_to_idle};
//!
//! #[tokio::test]
//! async fn test_resend_cooldown() {
//!     let clock = ManualClock::at(test_clock().now());
//!     let env = test_environment(clock.clone());
//!     let mut state = FlowState::default();
//!
//!     run_to_idle(&reducer, &mut state, &env, BookingAction::ResendOtp).await;
//!     clock.advance(chrono::Duration::seconds(121));
//! }
//! ```

use chrono::{DateTime, Utc};
use azurea_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions, drain_effects, run_to_idle};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use azurea_testing::mocks::FixedClock;
    /// use azurea_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
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

    /// Clock that only moves when a test advances it
    ///
    /// Clones share the same instant, so a test can keep one handle while the
    /// environment owns another.
    ///
    /// ```
    /// use azurea_testing::mocks::ManualClock;
    /// use azurea_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::at(Utc::now());
    /// let start = clock.now();
    /// clock.advance(Duration::seconds(50));
    /// assert_eq!(clock.now() - start, Duration::seconds(50));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub fn at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump the clock to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-06-01 09:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_instant())
    }

    /// The instant used by [`test_clock`]
    #[must_use]
    pub fn test_instant() -> DateTime<Utc> {
        DateTime::from_timestamp(1_748_768_400, 0).unwrap_or_default()
    }
}

/// Install a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`; safe to call from every test since only the first call
/// installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock, test_instant};
