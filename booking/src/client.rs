//! Booking client facade.
//!
//! [`BookingClient`] owns a [`Store`] running the [`BookingFlowReducer`] and
//! exposes the workflow as plain methods, so a host application never builds
//! actions by hand.
//!
//! # Example
//!
//! ```ignore
//! let client = BookingClient::new(env);
//! client.boot().await?;
//!
//! match client.submit_or_defer(draft).await? {
//!     DeferredOutcome::Pending(pending) => match pending.wait(Duration::from_secs(30)).await {
//!         Ok(receipt) => show_confirmation(receipt.id),
//!         Err(error) => show(error),
//!     },
//!     DeferredOutcome::Deferred { draft_id } => {
//!         // The login surface is open; watch before the guest signs in
//!         let pending = client.watch_booking(draft_id);
//!     },
//!     DeferredOutcome::Rejected(error) => show(error),
//! }
//! ```

use crate::actions::BookingAction;
use crate::draft::{BookingDraft, DraftId};
use crate::environment::BookingEnvironment;
use crate::error::FlowError;
use crate::otp::{Password, RegistrationRequest};
use crate::providers::{AuthApi, BookingApi, BookingReceipt, Credentials, DurableStorage, Navigator};
use crate::reducers::BookingFlowReducer;
use crate::state::{FlowState, SubmitDecision};
use azurea_core::Clock;
use azurea_runtime::{EffectHandle, Store, StoreConfig, StoreError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// What happened to a draft handed to [`BookingClient::submit_or_defer`].
#[derive(Debug)]
pub enum DeferredOutcome {
    /// Signed in: the limit check and submission are running.
    Pending(PendingBooking),
    /// Signed out: the draft is held until the guest authenticates.
    Deferred {
        /// The held draft
        draft_id: DraftId,
    },
    /// Refused without a network call.
    Rejected(FlowError),
}

/// Why a [`PendingBooking`] produced no receipt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PendingBookingError {
    /// The booking was blocked or refused.
    #[error(transparent)]
    Failed(#[from] FlowError),

    /// No outcome arrived: timeout, or the store went away.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A draft on its way to the server.
///
/// Resolves on the `BookingSubmitted` or `BookingFailed` action for its
/// draft. The subscription is taken before the draft is sent, so the outcome
/// cannot be missed.
#[derive(Debug)]
pub struct PendingBooking {
    draft_id: DraftId,
    actions: broadcast::Receiver<BookingAction>,
}

impl PendingBooking {
    /// The draft being tracked.
    #[must_use]
    pub const fn draft_id(&self) -> DraftId {
        self.draft_id
    }

    /// Wait for the server's receipt.
    ///
    /// State is already updated when this returns, so the confirmation can
    /// be read straight away.
    ///
    /// # Errors
    ///
    /// - [`PendingBookingError::Failed`] if the limit check or the server refused it
    /// - [`PendingBookingError::Store`] with [`StoreError::Timeout`] if nothing settles in time
    pub async fn wait(mut self, timeout: Duration) -> Result<BookingReceipt, PendingBookingError> {
        let draft_id = self.draft_id;
        tokio::time::timeout(timeout, async move {
            loop {
                match self.actions.recv().await {
                    Ok(BookingAction::BookingSubmitted { draft_id: id, receipt }) if id == draft_id => {
                        return Ok(receipt);
                    },
                    Ok(BookingAction::BookingFailed { draft_id: id, error }) if id == draft_id => {
                        return Err(PendingBookingError::Failed(error));
                    },
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%draft_id, skipped, "Booking observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(PendingBookingError::Store(StoreError::ChannelClosed));
                    },
                }
            }
        })
        .await
        .map_err(|_| PendingBookingError::Store(StoreError::Timeout))?
    }
}

type FlowStore<A, B, S, N, C> =
    Store<FlowState, BookingAction, BookingEnvironment<A, B, S, N, C>, BookingFlowReducer<A, B, S, N, C>>;

/// Booking workflow client.
#[derive(Clone)]
pub struct BookingClient<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    store: FlowStore<A, B, S, N, C>,
    clock: C,
}

impl<A, B, S, N, C> BookingClient<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    /// Client with the default store configuration.
    #[must_use]
    pub fn new(env: BookingEnvironment<A, B, S, N, C>) -> Self {
        Self::with_config(env, StoreConfig::default())
    }

    /// Client with a custom store configuration.
    #[must_use]
    pub fn with_config(env: BookingEnvironment<A, B, S, N, C>, config: StoreConfig) -> Self {
        let clock = env.clock.clone();
        let state = FlowState::new(env.config.max_daily_bookings);
        Self {
            store: Store::with_config(state, BookingFlowReducer::new(), env, config),
            clock,
        }
    }

    /// Send any action.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn send(&self, action: BookingAction) -> Result<EffectHandle, StoreError> {
        self.store.send(action).await
    }

    /// Send an action and wait for a matching follow-up action.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if nothing matches in time.
    pub async fn send_and_wait_for<F>(
        &self,
        action: BookingAction,
        predicate: F,
        timeout: Duration,
    ) -> Result<BookingAction, StoreError>
    where
        F: Fn(&BookingAction) -> bool,
    {
        self.store.send_and_wait_for(action, predicate, timeout).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════════

    /// Restore any draft carried across a reload and probe the session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn boot(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::Boot).await
    }

    /// Re-probe the session after the window regains focus.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn window_focused(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::WindowFocused).await
    }

    /// Sign in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn login(&self, email: &str, password: &str) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::Login {
            credentials: Credentials {
                email: email.to_string(),
                password: Password::new(password),
            },
        })
        .await
    }

    /// Sign out, discarding any held draft.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn logout(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::Logout).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // AuthGate
    // ═══════════════════════════════════════════════════════════════════════

    /// Submit a booking now, or hold it until the guest signs in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn submit_or_defer(&self, draft: BookingDraft) -> Result<DeferredOutcome, StoreError> {
        let draft_id = draft.id();
        let pending = self.watch_booking(draft_id);
        self.send(BookingAction::submit(draft)).await?;
        let decision = self
            .store
            .state(|state| state.gate.decision_for(draft_id).cloned())
            .await;

        Ok(match decision {
            Some(SubmitDecision::Deferred) => DeferredOutcome::Deferred { draft_id },
            Some(SubmitDecision::Rejected(error)) => DeferredOutcome::Rejected(error),
            Some(SubmitDecision::Forwarded) | None => DeferredOutcome::Pending(pending),
        })
    }

    /// Track a draft's outcome from now on.
    ///
    /// For a deferred draft, call this before the guest signs in.
    #[must_use]
    pub fn watch_booking(&self, draft_id: DraftId) -> PendingBooking {
        PendingBooking {
            draft_id,
            actions: self.store.subscribe_actions(),
        }
    }

    /// Open the registration route.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn open_registration(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::OpenRegistration).await
    }

    /// Open the forgot-password flow.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn open_password_reset(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::OpenPasswordReset).await
    }

    /// Close the auth surface, discarding any held draft.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn close_auth_surface(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::CloseAuthSurface).await
    }

    /// Re-read today's booking count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn refresh_limit(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::RefreshLimit).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // OTP
    // ═══════════════════════════════════════════════════════════════════════

    /// Start registration by sending a code to `request.email`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn send_registration_otp(&self, request: RegistrationRequest) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::SendRegistrationOtp { request }).await
    }

    /// Start a password reset for `email`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn request_password_reset(&self, email: &str) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::RequestPasswordReset {
            email: email.to_string(),
        })
        .await
    }

    /// Ask for a new code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn resend_otp(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::ResendOtp).await
    }

    /// Type into one code slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn enter_otp_digit(&self, index: usize, text: &str) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::OtpDigitEntered {
            index,
            text: text.to_string(),
        })
        .await
    }

    /// Enter a whole code, one slot at a time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn enter_otp(&self, code: &str) -> Result<(), StoreError> {
        for (index, digit) in code.chars().enumerate() {
            self.enter_otp_digit(index, &digit.to_string()).await?;
        }
        Ok(())
    }

    /// Press backspace in one code slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn otp_backspace(&self, index: usize) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::OtpBackspace { index }).await
    }

    /// Submit the entered code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn verify_otp(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::VerifyOtp).await
    }

    /// Submit the new password after a verified reset code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn submit_new_password(
        &self,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::SubmitNewPassword {
            new_password: Password::new(new_password),
            confirm_password: Password::new(confirm_password),
        })
        .await
    }

    /// Go back to the email step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
    pub async fn return_to_identity_step(&self) -> Result<EffectHandle, StoreError> {
        self.send(BookingAction::ReturnToIdentityStep).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Views
    // ═══════════════════════════════════════════════════════════════════════

    /// Read state through a projection.
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&FlowState) -> T,
    {
        self.store.state(f).await
    }

    /// Copy of the whole state.
    pub async fn snapshot(&self) -> FlowState {
        self.store.state(Clone::clone).await
    }

    /// Whether the processing indicator should show.
    pub async fn is_processing(&self) -> bool {
        self.store.state(FlowState::is_processing).await
    }

    /// Whether the booking submit button should be disabled.
    pub async fn submit_disabled(&self) -> bool {
        self.store.state(FlowState::submit_disabled).await
    }

    /// Seconds until a resend is accepted, or `None` without an outstanding code.
    pub async fn resend_countdown_secs(&self) -> Option<i64> {
        let now = self.clock.now();
        self.store
            .state(|state| {
                state
                    .otp
                    .as_ref()
                    .filter(|otp| otp.resend_available_at().is_some())
                    .map(|otp| otp.countdown_secs(now))
            })
            .await
    }

    /// Observe actions produced by effects.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<BookingAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting actions and wait for running effects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::draft::fixtures::room_draft;
    use crate::mocks::{MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator};
    use crate::providers::BookingId;
    use azurea_testing::{FixedClock, test_clock};

    type TestClient = BookingClient<MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator, FixedClock>;

    fn client(auth: MockAuthApi, bookings: MockBookingApi) -> TestClient {
        BookingClient::new(BookingEnvironment::new(
            auth,
            bookings,
            MockStorage::new(),
            RecordingNavigator::new("/rooms/12"),
            test_clock(),
            FlowConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_signed_out_submission_is_deferred() {
        let client = client(MockAuthApi::new(), MockBookingApi::new());
        let draft = room_draft(12);
        let draft_id = draft.id();

        let outcome = client.submit_or_defer(draft).await.unwrap();

        assert!(matches!(outcome, DeferredOutcome::Deferred { draft_id: id } if id == draft_id));
        assert!(client.state(|state| state.gate.slot.draft_id() == Some(draft_id)).await);
    }

    #[tokio::test]
    async fn test_invalid_draft_is_rejected() {
        let client = client(MockAuthApi::new(), MockBookingApi::new());
        // Drafts restored from storage skip the constructor's validation
        let mut value = serde_json::to_value(room_draft(12)).unwrap();
        value["request"]["contact"]["first_name"] = serde_json::Value::from("");
        let draft: BookingDraft = serde_json::from_value(value).unwrap();

        let outcome = client.submit_or_defer(draft).await.unwrap();

        let DeferredOutcome::Rejected(error) = outcome else {
            panic!("expected rejection");
        };
        assert!(error.is_local());
    }

    #[tokio::test]
    async fn test_login_resumes_deferred_submission() {
        let auth = MockAuthApi::new();
        auth.add_account("a@b.com", "hunter22");
        let bookings = MockBookingApi::new();
        bookings.set_next_booking_id(BookingId(41));
        let client = client(auth, bookings.clone());

        let DeferredOutcome::Deferred { draft_id } = client.submit_or_defer(room_draft(12)).await.unwrap() else {
            panic!("expected deferral");
        };
        let pending = client.watch_booking(draft_id);
        client.login("a@b.com", "hunter22").await.unwrap();
        let receipt = pending.wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(receipt.id, BookingId(41));
        assert_eq!(bookings.submissions().len(), 1);
        let confirmation = client.state(|state| state.confirmation.clone()).await.unwrap();
        assert_eq!(confirmation.route, "/booking-accepted?bookingId=41&isVenue=false");
    }

    #[tokio::test]
    async fn test_pending_waits_for_slow_submission() {
        let auth = MockAuthApi::new();
        auth.set_session(Some(auth.add_account("a@b.com", "hunter22")));
        let bookings = MockBookingApi::new();
        bookings.set_submission_latency(Duration::from_millis(100));
        bookings.set_next_booking_id(BookingId(7));
        let client = client(auth, bookings.clone());
        client
            .send_and_wait_for(
                BookingAction::Boot,
                |action| matches!(action, BookingAction::LimitRefreshed { .. }),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let DeferredOutcome::Pending(pending) = client.submit_or_defer(room_draft(12)).await.unwrap() else {
            panic!("expected a forwarded booking");
        };
        let receipt = pending.wait(Duration::from_secs(5)).await.unwrap();

        assert_eq!(receipt.id, BookingId(7));
        assert_eq!(
            client.state(|state| state.confirmation.as_ref().map(|c| c.booking_id)).await,
            Some(BookingId(7))
        );
        assert!(!client.is_processing().await);
    }

    #[tokio::test]
    async fn test_pending_reports_limit_block() {
        let auth = MockAuthApi::new();
        auth.set_session(Some(auth.add_account("a@b.com", "hunter22")));
        let bookings = MockBookingApi::new();
        let client = client(auth, bookings.clone());
        client
            .send_and_wait_for(
                BookingAction::Boot,
                |action| matches!(action, BookingAction::LimitRefreshed { .. }),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        // The cached count still allows booking, so only the fresh check blocks
        bookings.set_booking_count(3);

        let DeferredOutcome::Pending(pending) = client.submit_or_defer(room_draft(12)).await.unwrap() else {
            panic!("expected a forwarded booking");
        };
        let error = pending.wait(Duration::from_secs(5)).await.unwrap_err();

        let PendingBookingError::Failed(error) = error else {
            panic!("expected a booking failure");
        };
        assert!(error.is_policy());
        assert!(bookings.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_actions() {
        let client = client(MockAuthApi::new(), MockBookingApi::new());
        client.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(client.boot().await.unwrap_err(), StoreError::ShutdownInProgress);
    }
}
