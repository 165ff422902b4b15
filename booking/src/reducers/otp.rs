//! OTP challenge reducer.
//!
//! Drives the active [`OtpChallenge`] for registration and password reset.
//! Every request carries the challenge id; a result for a challenge that has
//! since been replaced is counted and dropped.
//!
//! # Registration detour
//!
//! When the first registration code is sent while a draft is held, the draft
//! is written to durable storage. After the code is verified the page reloads
//! to the return URL and `Boot` picks the draft up again.

use crate::actions::BookingAction;
use crate::constants::{routes, storage_keys};
use crate::draft::DraftSlot;
use crate::environment::BookingEnvironment;
use crate::error::FlowError;
use crate::otp::{ChallengeId, OtpChallenge, OtpPurpose, OtpRejection};
use crate::providers::{AuthApi, BookingApi, DurableStorage, Navigator, SessionTokens, persist_tokens};
use crate::reducers::Effects;
use crate::reducers::session::SessionReducer;
use crate::state::{AuthSurface, FlowState, GatePhase};
use azurea_core::effect::Effect;
use azurea_core::reducer::Reducer;
use azurea_core::{Clock, async_effect, smallvec};
use metrics::counter;

/// The active challenge, if `challenge` is still it.
fn current(state: &mut FlowState, challenge: ChallengeId) -> Option<&mut OtpChallenge> {
    match state.otp.as_mut() {
        Some(otp) if otp.id() == challenge => Some(otp),
        _ => {
            counter!("booking.otp.stale_results").increment(1);
            tracing::debug!(?challenge, "Ignoring result for a replaced challenge");
            None
        },
    }
}

fn note_rejection(rejection: &OtpRejection) {
    match rejection {
        OtpRejection::CooldownActive { remaining } => {
            counter!("booking.otp.resend_rejected").increment(1);
            tracing::info!(remaining_secs = remaining.num_seconds(), "Resend rejected during cooldown");
        },
        OtpRejection::RequestInFlight { request } => {
            tracing::debug!(?request, "OTP request already in flight");
        },
        OtpRejection::WrongPhase { phase } => {
            tracing::warn!(?phase, "OTP transition not valid from this phase");
        },
        OtpRejection::Invalid(error) => {
            tracing::debug!(%error, "OTP input rejected locally");
        },
    }
}

/// OTP challenge reducer.
#[derive(Debug, Clone)]
pub struct OtpReducer<A, B, S, N, C> {
    _phantom: std::marker::PhantomData<(A, B, S, N, C)>,
}

impl<A, B, S, N, C> OtpReducer<A, B, S, N, C> {
    /// Create a new OTP reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<A, B, S, N, C> Default for OtpReducer<A, B, S, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, B, S, N, C> OtpReducer<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    fn settle(challenge: ChallengeId, result: crate::error::Result<()>) -> Option<BookingAction> {
        Some(match result {
            Ok(()) => BookingAction::OtpSent { challenge },
            Err(error) => BookingAction::OtpRequestFailed { challenge, error },
        })
    }

    fn finish_tokens_only(env: &BookingEnvironment<A, B, S, N, C>, tokens: Option<SessionTokens>) -> Effect<BookingAction> {
        let Some(tokens) = tokens else {
            return Effect::None;
        };
        let storage = env.storage.clone();
        async_effect! {
            if let Err(error) = persist_tokens(&storage, &tokens).await {
                tracing::warn!(%error, "Failed to store session tokens");
            }
            None
        }
    }

    /// Store the tokens, then leave the registration route.
    ///
    /// With a parked draft the page reloads to the URL stored next to it so
    /// boot can pick it up; otherwise the guest goes home.
    fn finish_registration(
        env: &BookingEnvironment<A, B, S, N, C>,
        tokens: Option<SessionTokens>,
        reload_to: Option<String>,
    ) -> Effect<BookingAction> {
        let storage = env.storage.clone();
        let navigator = env.navigator.clone();

        async_effect! {
            if let Some(tokens) = tokens {
                if let Err(error) = persist_tokens(&storage, &tokens).await {
                    tracing::warn!(%error, "Failed to store session tokens");
                }
            }
            match reload_to {
                Some(fallback) => {
                    let url = match storage.get(storage_keys::RETURN_URL).await {
                        Ok(Some(url)) => url,
                        Ok(None) => fallback,
                        Err(error) => {
                            tracing::warn!(%error, "Failed to read return URL");
                            fallback
                        },
                    };
                    tracing::info!(%url, "Reloading to resume booking");
                    navigator.reload(&url);
                },
                None => navigator.navigate(routes::HOME),
            }
            None
        }
    }
}

impl<A, B, S, N, C> Reducer for OtpReducer<A, B, S, N, C>
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
            // Identity step
            // ═══════════════════════════════════════════════════════════════
            BookingAction::SendRegistrationOtp { request } => {
                let otp = state
                    .otp
                    .get_or_insert_with(|| OtpChallenge::new(OtpPurpose::Registration));
                if let Err(rejection) = otp.begin_registration(&request) {
                    note_rejection(&rejection);
                    return smallvec![Effect::None];
                }

                let challenge = otp.id();
                let auth = env.auth.clone();
                smallvec![async_effect! {
                    Self::settle(challenge, auth.send_registration_otp(&request).await)
                }]
            },

            BookingAction::RequestPasswordReset { email } => {
                let otp = state
                    .otp
                    .get_or_insert_with(|| OtpChallenge::new(OtpPurpose::PasswordReset));
                if let Err(rejection) = otp.begin_reset_request(&email) {
                    note_rejection(&rejection);
                    return smallvec![Effect::None];
                }

                let challenge = otp.id();
                let email = otp.email().to_string();
                let auth = env.auth.clone();
                smallvec![async_effect! {
                    Self::settle(challenge, auth.request_password_reset(&email).await)
                }]
            },

            // ═══════════════════════════════════════════════════════════════
            // Code sent
            // ═══════════════════════════════════════════════════════════════
            BookingAction::OtpSent { challenge } => {
                let now = env.clock.now();
                let cooldown = env.config.resend_cooldown;
                let Some(otp) = current(state, challenge) else {
                    return smallvec![Effect::None];
                };
                if let Err(rejection) = otp.confirm_sent(now, cooldown) {
                    note_rejection(&rejection);
                    return smallvec![Effect::None];
                }
                counter!("booking.otp.sent").increment(1);
                tracing::info!(?challenge, purpose = ?otp.purpose(), "OTP sent");

                // The countdown is derived from the clock, so nothing is scheduled
                let purpose = otp.purpose();
                let mut effects = Effects::new();

                if purpose == OtpPurpose::Registration {
                    if let DraftSlot::Held(draft) = &state.gate.slot {
                        let draft = draft.as_ref().clone();
                        let return_url = state
                            .gate
                            .return_url
                            .clone()
                            .unwrap_or_else(|| routes::HOME.to_string());
                        let drafts = env.durable_drafts();

                        effects.push(async_effect! {
                            let draft_id = draft.id();
                            match drafts.persist(&draft, &return_url, now).await {
                                Ok(()) => Some(BookingAction::DraftPersisted { draft_id }),
                                Err(error) => Some(BookingAction::DraftPersistFailed { draft_id, error }),
                            }
                        });
                    }
                }

                effects
            },

            BookingAction::OtpRequestFailed { challenge, error } => {
                if let Some(otp) = current(state, challenge) {
                    tracing::info!(?challenge, %error, "OTP request failed");
                    otp.fail_request(error);
                }
                smallvec![Effect::None]
            },

            BookingAction::ResendOtp => {
                let now = env.clock.now();
                let Some(otp) = state.otp.as_mut() else {
                    return smallvec![Effect::None];
                };
                if let Err(rejection) = otp.begin_resend(now) {
                    note_rejection(&rejection);
                    return smallvec![Effect::None];
                }

                let challenge = otp.id();
                let purpose = otp.purpose();
                let email = otp.email().to_string();
                let auth = env.auth.clone();
                smallvec![async_effect! {
                    let result = match purpose {
                        OtpPurpose::Registration => auth.resend_registration_otp(&email).await,
                        OtpPurpose::PasswordReset => auth.request_password_reset(&email).await,
                    };
                    Self::settle(challenge, result)
                }]
            },

            // ═══════════════════════════════════════════════════════════════
            // Code entry
            // ═══════════════════════════════════════════════════════════════
            BookingAction::OtpDigitEntered { index, text } => {
                if let Some(otp) = state.otp.as_mut() {
                    otp.code_mut().input(index, &text);
                }
                smallvec![Effect::None]
            },

            BookingAction::OtpBackspace { index } => {
                if let Some(otp) = state.otp.as_mut() {
                    otp.code_mut().backspace(index);
                }
                smallvec![Effect::None]
            },

            BookingAction::VerifyOtp => {
                let Some(otp) = state.otp.as_mut() else {
                    return smallvec![Effect::None];
                };
                let code = match otp.begin_verify() {
                    Ok(code) => code,
                    Err(rejection) => {
                        note_rejection(&rejection);
                        return smallvec![Effect::None];
                    },
                };

                let challenge = otp.id();
                let email = otp.email().to_string();
                let auth = env.auth.clone();

                match otp.purpose() {
                    OtpPurpose::Registration => {
                        let Some(password) = otp.password().cloned() else {
                            otp.fail_request(FlowError::general("Please start the registration again."));
                            return smallvec![Effect::None];
                        };
                        smallvec![async_effect! {
                            match auth.verify_registration_otp(&email, &password, &code).await {
                                Ok(registration) => Some(BookingAction::RegistrationVerified { challenge, registration }),
                                Err(error) => Some(BookingAction::OtpRequestFailed { challenge, error }),
                            }
                        }]
                    },
                    OtpPurpose::PasswordReset => smallvec![async_effect! {
                        match auth.verify_reset_otp(&email, &code).await {
                            Ok(()) => Some(BookingAction::ResetOtpVerified { challenge }),
                            Err(error) => Some(BookingAction::OtpRequestFailed { challenge, error }),
                        }
                    }],
                }
            },

            // ═══════════════════════════════════════════════════════════════
            // Registration verified: sign in and resume
            // ═══════════════════════════════════════════════════════════════
            BookingAction::RegistrationVerified { challenge, registration } => {
                let Some(otp) = current(state, challenge) else {
                    return smallvec![Effect::None];
                };
                if let Err(rejection) = otp.confirm_verified() {
                    note_rejection(&rejection);
                    return smallvec![Effect::None];
                }
                state.otp = None;

                // The server session is live at this point, so sign in
                // without waiting for a probe.
                let user_id = registration.identity.id;
                state.session.set_authenticated(registration.identity);
                state.gate.surface = AuthSurface::Closed;
                tracing::info!(%user_id, "Registration verified");

                let reload_to = match state.gate.slot {
                    DraftSlot::Parked { .. } => {
                        state.gate.phase = GatePhase::ReloadPending;
                        Some(
                            state
                                .gate
                                .return_url
                                .clone()
                                .unwrap_or_else(|| routes::HOME.to_string()),
                        )
                    },
                    DraftSlot::Empty => None,
                    DraftSlot::Held(_) => {
                        // Persisting failed; the root reducer resumes it in memory
                        return smallvec![Self::finish_tokens_only(env, registration.tokens)];
                    },
                };

                smallvec![Self::finish_registration(env, registration.tokens, reload_to)]
            },

            // ═══════════════════════════════════════════════════════════════
            // Password reset
            // ═══════════════════════════════════════════════════════════════
            BookingAction::ResetOtpVerified { challenge } => {
                if let Some(otp) = current(state, challenge) {
                    if let Err(rejection) = otp.confirm_verified() {
                        note_rejection(&rejection);
                    }
                }
                smallvec![Effect::None]
            },

            BookingAction::SubmitNewPassword {
                new_password,
                confirm_password,
            } => {
                let Some(otp) = state.otp.as_mut() else {
                    return smallvec![Effect::None];
                };
                let reset = match otp.begin_password_reset(new_password, confirm_password) {
                    Ok(reset) => reset,
                    Err(rejection) => {
                        note_rejection(&rejection);
                        return smallvec![Effect::None];
                    },
                };

                let challenge = otp.id();
                let auth = env.auth.clone();
                smallvec![async_effect! {
                    match auth.reset_password(&reset).await {
                        Ok(()) => Some(BookingAction::PasswordResetCompleted { challenge }),
                        Err(error) => Some(BookingAction::OtpRequestFailed { challenge, error }),
                    }
                }]
            },

            BookingAction::PasswordResetCompleted { challenge } => {
                let Some(otp) = current(state, challenge) else {
                    return smallvec![Effect::None];
                };
                if let Err(rejection) = otp.confirm_password_reset() {
                    note_rejection(&rejection);
                    return smallvec![Effect::None];
                }
                tracing::info!("Password reset completed");
                state.otp = None;
                state.gate.surface = AuthSurface::Login;

                // The server may have signed the guest in; find out
                smallvec![SessionReducer::probe(state, env)]
            },

            BookingAction::ReturnToIdentityStep => {
                if let Some((challenge, purpose)) = state.otp.as_ref().map(|otp| (otp.id(), otp.purpose())) {
                    tracing::debug!(?challenge, "Restarting challenge");
                    state.otp = Some(OtpChallenge::new(purpose));
                }
                smallvec![Effect::None]
            },

            _ => smallvec![Effect::None],
        }
    }
}
