//! Booking workflow environment.
//!
//! All external dependencies of the reducers, injected so tests can swap in
//! mocks and a controllable clock.

use crate::config::FlowConfig;
use crate::draft::DurableDraftStore;
use crate::limit::BookingLimitGuard;
use crate::providers::{AuthApi, BookingApi, DurableStorage, Navigator};
use crate::submitter::BookingSubmitter;
use azurea_core::Clock;

/// Booking workflow environment.
///
/// # Type Parameters
///
/// - `A`: Authentication API
/// - `B`: Booking API
/// - `S`: Durable storage
/// - `N`: Navigator
/// - `C`: Clock
#[derive(Debug, Clone)]
pub struct BookingEnvironment<A, B, S, N, C>
where
    A: AuthApi + Clone,
    B: BookingApi + Clone,
    S: DurableStorage + Clone,
    N: Navigator + Clone,
    C: Clock + Clone,
{
    /// Authentication endpoints.
    pub auth: A,

    /// Booking endpoints.
    pub bookings: B,

    /// Reload-durable key/value storage.
    pub storage: S,

    /// Page navigation.
    pub navigator: N,

    /// Time source.
    pub clock: C,

    /// Policy settings.
    pub config: FlowConfig,
}

impl<A, B, S, N, C> BookingEnvironment<A, B, S, N, C>
where
    A: AuthApi + Clone,
    B: BookingApi + Clone,
    S: DurableStorage + Clone,
    N: Navigator + Clone,
    C: Clock + Clone,
{
    /// Create a new booking environment.
    #[must_use]
    pub const fn new(auth: A, bookings: B, storage: S, navigator: N, clock: C, config: FlowConfig) -> Self {
        Self {
            auth,
            bookings,
            storage,
            navigator,
            clock,
            config,
        }
    }

    /// Limit guard over the booking API.
    #[must_use]
    pub fn limit_guard(&self) -> BookingLimitGuard<B> {
        BookingLimitGuard::new(self.bookings.clone(), self.config.max_daily_bookings)
    }

    /// Submitter over the booking API.
    #[must_use]
    pub fn submitter(&self) -> BookingSubmitter<B> {
        BookingSubmitter::new(self.bookings.clone())
    }

    /// Durable draft store over the storage.
    #[must_use]
    pub fn durable_drafts(&self) -> DurableDraftStore<S> {
        DurableDraftStore::new(self.storage.clone(), self.config.pending_draft_ttl)
    }
}
