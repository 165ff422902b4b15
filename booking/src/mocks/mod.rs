//! Mock provider implementations for testing.
//!
//! In-memory, scriptable implementations of every provider trait. Each mock
//! is cheap to clone and clones share state, so a test can keep a handle to
//! inspect calls after handing one to the environment.

pub mod auth_api;
pub mod booking_api;
pub mod navigator;
pub mod storage;

pub use auth_api::{AuthCall, MockAuthApi};
pub use booking_api::MockBookingApi;
pub use navigator::{NavEvent, RecordingNavigator};
pub use storage::MockStorage;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mock's state; a panicking test must not poison the others.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
