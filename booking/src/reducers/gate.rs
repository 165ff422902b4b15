//! AuthGate reducer.
//!
//! Decides what happens to a submitted draft: forward it when the guest is
//! signed in, otherwise hold it in the single [`DraftSlot`] and open the login
//! surface.
//!
//! # Single use
//!
//! Every route to the submitter goes through [`GateReducer::start_limit_check`],
//! which takes the draft out of the slot and records its id as consumed in the
//! same reducer call. Because the Store runs reducers one at a time, two
//! sign-in events can never both find the draft, and a consumed id is refused
//! if it shows up again.
//!
//! ```text
//! Idle ──submit (signed out)──▶ AwaitingAuth ──signed in──▶ CheckingLimit ──allowed──▶ Submitting ──▶ Idle
//!  │                               │                            │
//!  └──submit (signed in)───────────┼───────────────────────────▶┘ blocked ──▶ Idle
//!                                  └──close surface──▶ Idle (draft discarded)
//! ```

use crate::actions::BookingAction;
use crate::constants::routes;
use crate::draft::{BookingDraft, DraftId, DraftSlot, RESTORE_FAILED_MESSAGE};
use crate::environment::BookingEnvironment;
use crate::error::FlowError;
use crate::otp::{OtpChallenge, OtpPurpose};
use crate::providers::{AuthApi, BookingApi, DurableStorage, Navigator};
use crate::reducers::Effects;
use crate::reducers::limit::LimitReducer;
use crate::state::{AuthSurface, Confirmation, FlowState, GatePhase, SubmitDecision};
use crate::submitter::confirmation_route;
use azurea_core::effect::Effect;
use azurea_core::reducer::Reducer;
use azurea_core::{Clock, async_effect, smallvec};
use metrics::counter;

/// Drop whatever waits in the slot and close the auth surface.
///
/// Returns `true` if a draft was dropped.
pub(crate) fn discard_draft(state: &mut FlowState) -> bool {
    let discarded = state.gate.slot.discard();
    if discarded {
        counter!("booking.drafts.discarded").increment(1);
        tracing::info!("Discarded deferred booking");
    }
    if state.gate.phase == GatePhase::AwaitingAuth {
        state.gate.phase = GatePhase::Idle;
    }
    state.gate.surface = AuthSurface::Closed;
    state.gate.return_url = None;
    discarded
}

fn reject_duplicate(draft_id: DraftId, phase: &GatePhase) {
    counter!("booking.duplicates_rejected").increment(1);
    tracing::warn!(%draft_id, ?phase, "Rejected duplicate booking submission");
}

/// AuthGate reducer.
#[derive(Debug, Clone)]
pub struct GateReducer<A, B, S, N, C> {
    _phantom: std::marker::PhantomData<(A, B, S, N, C)>,
}

impl<A, B, S, N, C> GateReducer<A, B, S, N, C> {
    /// Create a new gate reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<A, B, S, N, C> Default for GateReducer<A, B, S, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, B, S, N, C> GateReducer<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    /// Consume `draft` and check the daily limit before submitting it.
    pub(crate) fn start_limit_check(
        state: &mut FlowState,
        env: &BookingEnvironment<A, B, S, N, C>,
        draft: BookingDraft,
        deferred: bool,
    ) -> Effects {
        let draft_id = draft.id();
        if state.gate.was_consumed(draft_id) {
            reject_duplicate(draft_id, &state.gate.phase);
            return smallvec![Effect::None];
        }

        state.gate.mark_consumed(draft_id);
        state.gate.phase = GatePhase::CheckingLimit { draft_id, deferred };
        state.gate.error = None;

        let identity = state.session.identity().cloned();
        let user = identity.as_ref().map(|identity| identity.id);
        let guard = env.limit_guard();
        tracing::debug!(%draft_id, deferred, "Checking booking limit");

        smallvec![async_effect! {
            let check = guard.check(identity.as_ref()).await;
            Some(BookingAction::LimitChecked {
                draft: Box::new(draft),
                user,
                check,
            })
        }]
    }

    /// React to a `false → true` session transition.
    ///
    /// A draft held in memory is taken and resumed; a parked draft is read
    /// back from durable storage unless a reload is already on its way.
    pub(crate) fn on_authenticated(state: &mut FlowState, env: &BookingEnvironment<A, B, S, N, C>) -> Effects {
        match state.gate.slot {
            DraftSlot::Held(_) => {
                let Some(draft) = state.gate.slot.take() else {
                    return smallvec![Effect::None];
                };
                counter!("booking.drafts.resumed").increment(1);
                tracing::info!(draft_id = %draft.id(), "Resuming deferred booking");
                state.gate.surface = AuthSurface::Closed;
                Self::start_limit_check(state, env, draft, true)
            },
            DraftSlot::Parked { .. } if state.gate.phase != GatePhase::ReloadPending => {
                state.gate.slot.take_parked();
                state.gate.surface = AuthSurface::Closed;
                let drafts = env.durable_drafts();
                let now = env.clock.now();

                smallvec![async_effect! {
                    // A parked draft was expected, so finding nothing counts as lost
                    let record = match drafts.take(now).await {
                        Ok(restored) => restored.into_record().map(Box::new),
                        Err(error) => {
                            tracing::error!(%error, "Failed to read parked draft");
                            None
                        },
                    };
                    Some(BookingAction::ParkedDraftTaken { record })
                }]
            },
            DraftSlot::Parked { .. } => smallvec![Effect::None],
            DraftSlot::Empty => smallvec![LimitReducer::refresh(state, env)],
        }
    }

    /// Settle an in-flight draft as failed without reaching the submitter.
    ///
    /// Every forwarded draft ends in `BookingSubmitted` or `BookingFailed`.
    fn fail_in_flight(draft_id: DraftId, error: FlowError) -> Effect<BookingAction> {
        async_effect! {
            Some(BookingAction::BookingFailed { draft_id, error })
        }
    }

    fn clear_durable(env: &BookingEnvironment<A, B, S, N, C>) -> Effect<BookingAction> {
        let drafts = env.durable_drafts();
        async_effect! {
            if let Err(error) = drafts.clear().await {
                tracing::error!(%error, "Failed to clear pending draft");
            }
            None
        }
    }
}

impl<A, B, S, N, C> Reducer for GateReducer<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    type State = FlowState;
    type Action = BookingAction;
    type Environment = BookingEnvironment<A, B, S, N, C>;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // SubmitBooking: forward or defer
            // ═══════════════════════════════════════════════════════════════
            BookingAction::SubmitBooking { draft } => {
                let draft = *draft;
                let draft_id = draft.id();

                if state.gate.is_busy() || state.gate.was_consumed(draft_id) {
                    reject_duplicate(draft_id, &state.gate.phase);
                    state.gate.last_decision = Some((
                        draft_id,
                        SubmitDecision::Rejected(FlowError::general(
                            "This booking is already being processed.",
                        )),
                    ));
                    return smallvec![Effect::None];
                }

                if let Err(error) = draft.request().validate() {
                    state.gate.error = Some(error.clone());
                    state.gate.last_decision = Some((draft_id, SubmitDecision::Rejected(error)));
                    return smallvec![Effect::None];
                }

                if let Some(identity) = state.session.identity() {
                    let today = env.clock.now().date_naive();
                    if state.limit.is_fresh_for(identity.id, today) {
                        if let Some(error) = state.limit.to_error() {
                            counter!("booking.limit.blocked").increment(1);
                            tracing::info!(user_id = %identity.id, "Booking blocked by daily limit");
                            state.gate.error = Some(error.clone());
                            state.gate.last_decision = Some((draft_id, SubmitDecision::Rejected(error)));
                            return smallvec![Effect::None];
                        }
                    }
                    state.gate.last_decision = Some((draft_id, SubmitDecision::Forwarded));
                    return Self::start_limit_check(state, env, draft, false);
                }

                // Signed out: hold the draft and ask the guest to sign in
                let was_parked = state.gate.slot.is_parked();
                if let Some(replaced) = state.gate.slot.hold(draft) {
                    counter!("booking.drafts.overwritten").increment(1);
                    tracing::debug!(%replaced, "Replaced held draft");
                }
                counter!("booking.drafts.held").increment(1);
                tracing::info!(%draft_id, "Deferred booking until sign-in");

                state.gate.phase = GatePhase::AwaitingAuth;
                state.gate.error = None;
                state.gate.last_decision = Some((draft_id, SubmitDecision::Deferred));
                if state.gate.surface == AuthSurface::Closed {
                    state.gate.surface = AuthSurface::Login;
                }

                if was_parked {
                    smallvec![Self::clear_durable(env)]
                } else {
                    smallvec![Effect::None]
                }
            },

            // ═══════════════════════════════════════════════════════════════
            // Auth surfaces
            // ═══════════════════════════════════════════════════════════════
            BookingAction::OpenRegistration => {
                if state.session.is_authenticated() || state.gate.is_busy() {
                    tracing::warn!("Registration not available right now");
                    return smallvec![Effect::None];
                }
                state.gate.surface = AuthSurface::Registration;
                state.otp = Some(OtpChallenge::new(OtpPurpose::Registration));

                let navigator = env.navigator.clone();
                smallvec![async_effect! {
                    let return_url = navigator.current_url();
                    navigator.navigate(routes::REGISTRATION);
                    Some(BookingAction::RegistrationOpened { return_url })
                }]
            },

            BookingAction::RegistrationOpened { return_url } => {
                if state.gate.surface == AuthSurface::Registration && return_url != routes::REGISTRATION {
                    state.gate.return_url = Some(return_url);
                }
                smallvec![Effect::None]
            },

            BookingAction::OpenPasswordReset => {
                if state.session.is_authenticated() || state.gate.is_busy() {
                    tracing::warn!("Password reset not available right now");
                    return smallvec![Effect::None];
                }
                state.gate.surface = AuthSurface::PasswordReset;
                state.otp = Some(OtpChallenge::new(OtpPurpose::PasswordReset));
                smallvec![Effect::None]
            },

            BookingAction::CloseAuthSurface => {
                if state.gate.phase == GatePhase::ReloadPending {
                    tracing::debug!("Ignoring close while reloading");
                    return smallvec![Effect::None];
                }
                let was_parked = state.gate.slot.is_parked();
                discard_draft(state);
                state.otp = None;

                if was_parked {
                    smallvec![Self::clear_durable(env)]
                } else {
                    smallvec![Effect::None]
                }
            },

            // ═══════════════════════════════════════════════════════════════
            // Registration detour: durable copy of the held draft
            // ═══════════════════════════════════════════════════════════════
            BookingAction::DraftPersisted { draft_id } => {
                if state.gate.slot.park(draft_id) {
                    tracing::debug!(%draft_id, "Draft parked in durable storage");
                    smallvec![Effect::None]
                } else {
                    // The draft was replaced or dropped while it was being written
                    tracing::debug!(%draft_id, "Persisted draft no longer held");
                    smallvec![Self::clear_durable(env)]
                }
            },

            BookingAction::DraftPersistFailed { draft_id, error } => {
                tracing::warn!(%draft_id, %error, "Draft stays in memory only");
                smallvec![Effect::None]
            },

            BookingAction::ParkedDraftTaken { record } => {
                let Some(record) = record else {
                    tracing::warn!("Parked draft was missing or expired");
                    if state.gate.phase == GatePhase::AwaitingAuth {
                        state.gate.phase = GatePhase::Idle;
                    }
                    state.gate.error = Some(FlowError::general(RESTORE_FAILED_MESSAGE));
                    return smallvec![Effect::None];
                };

                let draft = record.draft;
                if state.session.is_authenticated() {
                    counter!("booking.drafts.resumed").increment(1);
                    tracing::info!(draft_id = %draft.id(), "Resuming parked booking");
                    Self::start_limit_check(state, env, draft, true)
                } else {
                    state.gate.slot.hold(draft);
                    state.gate.phase = GatePhase::AwaitingAuth;
                    smallvec![Effect::None]
                }
            },

            // ═══════════════════════════════════════════════════════════════
            // LimitChecked: submit or block
            // ═══════════════════════════════════════════════════════════════
            BookingAction::LimitChecked { draft, user, check } => {
                let GatePhase::CheckingLimit { draft_id, deferred } = state.gate.phase else {
                    tracing::warn!(draft_id = %draft.id(), "Ignoring limit result outside a check");
                    return smallvec![Effect::None];
                };
                if draft.id() != draft_id {
                    tracing::warn!(draft_id = %draft.id(), "Ignoring limit result for another draft");
                    return smallvec![Effect::None];
                }

                let today = env.clock.now().date_naive();
                state.limit.apply(&check, user, today);

                if let Some(error) = check.to_error() {
                    tracing::info!(%draft_id, deferred, "Booking blocked by daily limit");
                    return smallvec![Self::fail_in_flight(draft_id, error)];
                }

                if user.is_none() || state.session.identity().map(|identity| identity.id) != user {
                    tracing::warn!(%draft_id, "Session changed during limit check");
                    let error = FlowError::general("Please sign in again to complete your booking.");
                    return smallvec![Self::fail_in_flight(draft_id, error)];
                }

                state.gate.phase = GatePhase::Submitting {
                    draft_id,
                    kind: draft.kind(),
                    deferred,
                };
                let submitter = env.submitter();

                smallvec![async_effect! {
                    match submitter.submit(&draft).await {
                        Ok(receipt) => Some(BookingAction::BookingSubmitted { draft_id, receipt }),
                        Err(error) => Some(BookingAction::BookingFailed { draft_id, error }),
                    }
                }]
            },

            // ═══════════════════════════════════════════════════════════════
            // Submission settled
            // ═══════════════════════════════════════════════════════════════
            BookingAction::BookingSubmitted { draft_id, receipt } => {
                let GatePhase::Submitting { draft_id: current, kind, .. } = state.gate.phase else {
                    tracing::warn!(%draft_id, "Ignoring submission result outside a submission");
                    return smallvec![Effect::None];
                };
                if current != draft_id {
                    tracing::warn!(%draft_id, "Ignoring submission result for another draft");
                    return smallvec![Effect::None];
                }

                let route = confirmation_route(receipt.id, kind);
                state.confirmation = Some(Confirmation {
                    booking_id: receipt.id,
                    kind,
                    route: route.clone(),
                });
                state.gate.phase = GatePhase::Idle;
                state.gate.surface = AuthSurface::Closed;
                state.gate.error = None;
                state.gate.return_url = None;

                let navigator = env.navigator.clone();
                smallvec![
                    async_effect! {
                        navigator.navigate(&route);
                        None
                    },
                    Self::clear_durable(env),
                    LimitReducer::refresh(state, env),
                ]
            },

            BookingAction::BookingFailed { draft_id, error } => {
                if state.gate.phase.in_flight_draft() != Some(draft_id) {
                    tracing::warn!(%draft_id, "Ignoring submission failure for another draft");
                    return smallvec![Effect::None];
                }
                // No retry: the draft is consumed and the guest sees the error
                tracing::info!(%draft_id, %error, "Booking failed");
                state.gate.phase = GatePhase::Idle;
                state.gate.error = Some(error);
                smallvec![Effect::None]
            },

            // Other actions are not handled by this reducer
            _ => smallvec![Effect::None],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::draft::fixtures::room_draft;
    use crate::limit::LimitCheck;
    use crate::mocks::{MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator};
    use crate::providers::{BookingId, BookingReceipt};
    use crate::state::UserId;
    use crate::state::fixtures::guest;
    use azurea_testing::{FixedClock, ReducerTest, assertions, run_to_idle, test_clock, test_instant};

    type TestReducer = GateReducer<MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator, FixedClock>;
    type TestEnv = BookingEnvironment<MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator, FixedClock>;

    fn env() -> TestEnv {
        BookingEnvironment::new(
            MockAuthApi::new(),
            MockBookingApi::new(),
            MockStorage::new(),
            RecordingNavigator::default(),
            test_clock(),
            FlowConfig::default(),
        )
    }

    fn signed_in() -> FlowState {
        let mut state = FlowState::default();
        state.session.set_authenticated(guest(4, "a@b.com"));
        state
    }

    #[test]
    fn test_signed_out_submit_holds_and_opens_login() {
        let draft = room_draft(12);
        let draft_id = draft.id();

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::default())
            .when_action(BookingAction::submit(draft))
            .then_state(move |state| {
                assert_eq!(state.gate.slot.draft_id(), Some(draft_id));
                assert_eq!(state.gate.phase, GatePhase::AwaitingAuth);
                assert_eq!(state.gate.surface, AuthSurface::Login);
                assert_eq!(state.gate.decision_for(draft_id), Some(&SubmitDecision::Deferred));
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_second_draft_overwrites_first() {
        let first = room_draft(12);
        let second = room_draft(14);
        let second_id = second.id();

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::default())
            .when_action(BookingAction::submit(first))
            .when_action(BookingAction::submit(second))
            .then_state(move |state| {
                assert_eq!(state.gate.slot.draft_id(), Some(second_id));
            })
            .run();
    }

    #[test]
    fn test_signed_in_submit_checks_limit_first() {
        let draft = room_draft(12);
        let draft_id = draft.id();

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(signed_in())
            .when_action(BookingAction::submit(draft))
            .then_state(move |state| {
                assert_eq!(
                    state.gate.phase,
                    GatePhase::CheckingLimit {
                        draft_id,
                        deferred: false
                    }
                );
                assert!(state.gate.was_consumed(draft_id));
                assert!(state.submit_disabled());
            })
            .then_effects(|effects| {
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_cached_limit_blocks_without_request() {
        let mut state = signed_in();
        state.limit.apply(
            &LimitCheck::counted(3, 3),
            Some(UserId(4)),
            test_instant().date_naive(),
        );

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::submit(room_draft(12)))
            .then_state(|state| {
                assert_eq!(state.gate.phase, GatePhase::Idle);
                assert!(state.gate.error.as_ref().is_some_and(FlowError::is_policy));
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_resubmitting_consumed_draft_is_rejected() {
        let draft = room_draft(12);
        let mut state = signed_in();
        state.gate.mark_consumed(draft.id());

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::submit(draft))
            .then_state(|state| {
                assert_eq!(state.gate.phase, GatePhase::Idle);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_close_surface_discards_draft() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(FlowState::default())
            .when_action(BookingAction::submit(room_draft(12)))
            .when_action(BookingAction::CloseAuthSurface)
            .then_state(|state| {
                assert!(state.gate.slot.is_empty());
                assert_eq!(state.gate.phase, GatePhase::Idle);
                assert_eq!(state.gate.surface, AuthSurface::Closed);
            })
            .run();
    }

    #[test]
    fn test_late_submission_result_is_ignored() {
        let receipt = BookingReceipt { id: BookingId(7) };

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(signed_in())
            .when_action(BookingAction::BookingSubmitted {
                draft_id: DraftId::new(),
                receipt,
            })
            .then_state(|state| {
                assert!(state.confirmation.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[tokio::test]
    async fn test_blocked_check_surfaces_policy_warning() {
        let env = env();
        let reducer = TestReducer::new();
        let mut state = signed_in();
        let draft = room_draft(12);
        let draft_id = draft.id();
        reducer.reduce(&mut state, BookingAction::submit(draft.clone()), &env);

        let applied = run_to_idle(
            &reducer,
            &mut state,
            &env,
            BookingAction::LimitChecked {
                draft: Box::new(draft),
                user: Some(UserId(4)),
                check: LimitCheck::counted(3, 3),
            },
        )
        .await;

        assert!(matches!(&applied[..], [BookingAction::BookingFailed { draft_id: id, .. }] if *id == draft_id));
        assert_eq!(state.gate.phase, GatePhase::Idle);
        assert!(!state.limit.can_book());
        assert_eq!(
            state.gate.error.as_ref().map(ToString::to_string).as_deref(),
            Some("You have reached the maximum limit of 3 bookings per day. Please try again tomorrow.")
        );
        assert!(env.bookings.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_session_change_during_check_fails_draft() {
        let env = env();
        let reducer = TestReducer::new();
        let mut state = signed_in();
        let draft = room_draft(12);
        reducer.reduce(&mut state, BookingAction::submit(draft.clone()), &env);

        let applied = run_to_idle(
            &reducer,
            &mut state,
            &env,
            BookingAction::LimitChecked {
                draft: Box::new(draft),
                user: Some(UserId(99)),
                check: LimitCheck::counted(0, 3),
            },
        )
        .await;

        assert!(matches!(&applied[..], [BookingAction::BookingFailed { .. }]));
        assert_eq!(state.gate.phase, GatePhase::Idle);
        assert!(state.gate.error.is_some());
        assert!(env.bookings.submissions().is_empty());
    }
}
