//! Session reducer.
//!
//! Owns the [`AuthSession`](crate::state::AuthSession): boot, session probes,
//! login and logout. Every mutation here waits for the server; the one
//! optimistic sign-in (after a verified registration) lives in the OTP reducer.
//!
//! # Flow
//!
//! 1. `Boot` takes any draft persisted before a registration reload
//! 2. `Booted` holds it, then probes the session
//! 3. `SessionProbed` signs in or out; the root reducer resumes the draft
//!    on a `false → true` transition

use crate::actions::BookingAction;
use crate::draft::{RESTORE_FAILED_MESSAGE, RestoredDraft};
use crate::environment::BookingEnvironment;
use crate::error::FlowError;
use crate::providers::{AuthApi, BookingApi, DurableStorage, Navigator, remove_tokens};
use crate::reducers::Effects;
use crate::reducers::gate::discard_draft;
use crate::state::{AuthSurface, FlowState, GatePhase};
use azurea_core::effect::Effect;
use azurea_core::reducer::Reducer;
use azurea_core::{Clock, async_effect, smallvec};

/// Session reducer.
#[derive(Debug, Clone)]
pub struct SessionReducer<A, B, S, N, C> {
    _phantom: std::marker::PhantomData<(A, B, S, N, C)>,
}

impl<A, B, S, N, C> SessionReducer<A, B, S, N, C> {
    /// Create a new session reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<A, B, S, N, C> Default for SessionReducer<A, B, S, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, B, S, N, C> SessionReducer<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    /// Start a session probe tagged with the current epoch.
    pub(crate) fn probe(state: &mut FlowState, env: &BookingEnvironment<A, B, S, N, C>) -> Effect<BookingAction> {
        let epoch = state.session.begin_probe();
        let auth = env.auth.clone();

        async_effect! {
            let result = auth.probe_session().await;
            Some(BookingAction::SessionProbed { epoch, result })
        }
    }
}

impl<A, B, S, N, C> Reducer for SessionReducer<A, B, S, N, C>
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

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // Boot: read back a draft carried across the registration reload
            // ═══════════════════════════════════════════════════════════════
            BookingAction::Boot => {
                if state.booted {
                    tracing::warn!("Ignoring repeated boot");
                    return smallvec![Effect::None];
                }
                state.booted = true;

                let drafts = env.durable_drafts();
                let now = env.clock.now();

                smallvec![async_effect! {
                    let restored = match drafts.take(now).await {
                        Ok(restored) => restored,
                        Err(error) => {
                            // The flag is unreadable, so nothing is known to be pending
                            tracing::error!(%error, "Failed to read pending booking flag");
                            RestoredDraft::Nothing
                        },
                    };
                    Some(BookingAction::Booted { restored })
                }]
            },

            BookingAction::Booted { restored } => {
                match restored {
                    RestoredDraft::Ready(record) => {
                        let record = *record;
                        tracing::info!(draft_id = %record.draft.id(), "Restored pending draft after reload");
                        state.gate.return_url = Some(record.return_url);
                        state.gate.slot.hold(record.draft);
                        state.gate.phase = GatePhase::AwaitingAuth;
                    },
                    RestoredDraft::Lost => {
                        tracing::warn!("Pending booking could not be restored after reload");
                        state.gate.error = Some(FlowError::general(RESTORE_FAILED_MESSAGE));
                    },
                    RestoredDraft::Nothing => {},
                }
                smallvec![Self::probe(state, env)]
            },

            // ═══════════════════════════════════════════════════════════════
            // Session probe
            // ═══════════════════════════════════════════════════════════════
            BookingAction::WindowFocused => {
                if !state.booted || state.session.probe_in_flight() {
                    return smallvec![Effect::None];
                }
                smallvec![Self::probe(state, env)]
            },

            BookingAction::SessionProbed { epoch, result } => {
                if !state.session.finish_probe(epoch) {
                    tracing::debug!(
                        epoch,
                        current = state.session.epoch(),
                        "Ignoring stale session probe"
                    );
                    return smallvec![Effect::None];
                }

                match result {
                    Ok(Some(identity)) => {
                        tracing::debug!(user_id = %identity.id, "Session confirmed");
                        state.session.set_authenticated(identity);
                    },
                    Ok(None) => {
                        state.session.clear();
                    },
                    Err(error) => {
                        tracing::warn!(%error, "Session probe failed, treating guest as signed out");
                        state.session.clear();
                    },
                }

                // A waiting draft needs somewhere to sign in
                if !state.session.is_authenticated()
                    && !state.gate.slot.is_empty()
                    && state.gate.surface == AuthSurface::Closed
                {
                    state.gate.phase = GatePhase::AwaitingAuth;
                    state.gate.surface = AuthSurface::Login;
                }

                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Login
            // ═══════════════════════════════════════════════════════════════
            BookingAction::Login { credentials } => {
                if state.login.pending {
                    tracing::warn!("Login already in flight");
                    return smallvec![Effect::None];
                }
                if let Err(error) = credentials.validate() {
                    state.login.error = Some(error);
                    return smallvec![Effect::None];
                }

                state.login.pending = true;
                state.login.error = None;
                let auth = env.auth.clone();

                smallvec![async_effect! {
                    match auth.login(&credentials).await {
                        Ok(identity) => Some(BookingAction::LoginSucceeded { identity }),
                        Err(error) => Some(BookingAction::LoginFailed { error }),
                    }
                }]
            },

            BookingAction::LoginSucceeded { identity } => {
                state.login.pending = false;
                state.login.error = None;
                tracing::info!(user_id = %identity.id, "Signed in");
                state.session.set_authenticated(identity);
                if state.gate.surface == AuthSurface::Login {
                    state.gate.surface = AuthSurface::Closed;
                }
                smallvec![Effect::None]
            },

            BookingAction::LoginFailed { error } => {
                state.login.pending = false;
                tracing::info!(%error, "Login rejected");
                state.login.error = Some(error);
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════
            // Logout
            // ═══════════════════════════════════════════════════════════════
            BookingAction::Logout => {
                if state.logout_pending {
                    tracing::warn!("Logout already in flight");
                    return smallvec![Effect::None];
                }
                state.logout_pending = true;
                discard_draft(state);
                state.otp = None;

                let auth = env.auth.clone();
                let storage = env.storage.clone();
                let drafts = env.durable_drafts();

                smallvec![async_effect! {
                    if let Err(error) = drafts.clear().await {
                        tracing::error!(%error, "Failed to clear pending draft");
                    }
                    if let Err(error) = remove_tokens(&storage).await {
                        tracing::error!(%error, "Failed to remove session tokens");
                    }
                    match auth.logout().await {
                        Ok(()) => Some(BookingAction::LoggedOut),
                        Err(error) => Some(BookingAction::LogoutFailed { error }),
                    }
                }]
            },

            BookingAction::LoggedOut => {
                state.logout_pending = false;
                state.session.clear();
                state.confirmation = None;
                state.login.error = None;
                tracing::info!("Signed out");
                smallvec![Effect::None]
            },

            BookingAction::LogoutFailed { error } => {
                state.logout_pending = false;
                tracing::warn!(%error, "Logout failed, session kept");
                state.login.error = Some(error);
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
    use crate::constants::storage_keys;
    use crate::mocks::{MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator};
    use crate::otp::Password;
    use crate::providers::Credentials;
    use crate::state::fixtures::guest;
    use azurea_testing::{FixedClock, ReducerTest, assertions, test_clock};

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

    fn reducer() -> SessionReducer<MockAuthApi, MockBookingApi, MockStorage, RecordingNavigator, FixedClock> {
        SessionReducer::new()
    }

    #[test]
    fn test_stale_probe_is_ignored() {
        let mut state = FlowState::default();
        let epoch = state.session.begin_probe();
        state.session.set_authenticated(guest(4, "a@b.com"));

        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::SessionProbed { epoch, result: Ok(None) })
            .then_state(|state| {
                assert!(state.session.is_authenticated());
                assert!(!state.session.probe_in_flight());
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_failed_probe_keeps_held_draft() {
        let mut state = FlowState::default();
        state.gate.slot.hold(room_draft(12));
        let epoch = state.session.begin_probe();

        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::SessionProbed {
                epoch,
                result: Err(FlowError::general("Network down")),
            })
            .then_state(|state| {
                assert!(!state.session.is_authenticated());
                assert!(state.gate.slot.held().is_some());
                assert_eq!(state.gate.surface, AuthSurface::Login);
                assert_eq!(state.gate.phase, GatePhase::AwaitingAuth);
            })
            .run();
    }

    #[test]
    fn test_invalid_credentials_never_sent() {
        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(FlowState::default())
            .when_action(BookingAction::Login {
                credentials: Credentials {
                    email: "not-an-email".into(),
                    password: Password::new("secret"),
                },
            })
            .then_state(|state| {
                assert!(!state.login.pending);
                assert!(state.login.error.as_ref().is_some_and(FlowError::is_local));
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_login_pending_blocks_second_login() {
        let credentials = Credentials {
            email: "a@b.com".into(),
            password: Password::new("correct horse"),
        };

        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(FlowState::default())
            .when_action(BookingAction::Login {
                credentials: credentials.clone(),
            })
            .when_action(BookingAction::Login { credentials })
            .then_state(|state| {
                assert!(state.login.pending);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_logout_discards_draft_immediately() {
        let mut state = FlowState::default();
        state.session.set_authenticated(guest(4, "a@b.com"));
        state.gate.slot.hold(room_draft(12));

        ReducerTest::new(reducer())
            .with_env(env())
            .given_state(state)
            .when_action(BookingAction::Logout)
            .then_state(|state| {
                assert!(state.logout_pending);
                assert!(state.gate.slot.is_empty());
                // Session is cleared only once the server confirms
                assert!(state.session.is_authenticated());
            })
            .then_effects(|effects| {
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[tokio::test]
    async fn test_boot_probes_after_reading_storage() {
        let env = env();
        env.auth.set_session(Some(guest(4, "a@b.com")));
        let mut state = FlowState::default();

        let applied = azurea_testing::run_to_idle(&reducer(), &mut state, &env, BookingAction::Boot).await;

        assert!(matches!(applied[0], BookingAction::Booted { restored: RestoredDraft::Nothing }));
        assert!(matches!(applied[1], BookingAction::SessionProbed { result: Ok(Some(_)), .. }));
        assert!(state.session.is_authenticated());
    }

    #[tokio::test]
    async fn test_boot_reports_unreadable_pending_draft() {
        let env = env();
        env.storage.insert(storage_keys::PENDING_BOOKING, "true");
        env.storage.insert(storage_keys::PENDING_DRAFT, "not a draft");
        let mut state = FlowState::default();

        let applied = azurea_testing::run_to_idle(&reducer(), &mut state, &env, BookingAction::Boot).await;

        assert!(matches!(applied[0], BookingAction::Booted { restored: RestoredDraft::Lost }));
        assert_eq!(
            state.gate.error.as_ref().map(ToString::to_string).as_deref(),
            Some(RESTORE_FAILED_MESSAGE)
        );
        assert!(state.gate.slot.is_empty());
        assert_eq!(state.gate.phase, GatePhase::Idle);
        assert!(!env.storage.contains(storage_keys::PENDING_BOOKING));
    }

    #[tokio::test]
    async fn test_boot_reports_flag_without_draft() {
        let env = env();
        env.storage.insert(storage_keys::PENDING_BOOKING, "true");
        let mut state = FlowState::default();

        azurea_testing::run_to_idle(&reducer(), &mut state, &env, BookingAction::Boot).await;

        assert!(state.gate.error.is_some());
    }
}
