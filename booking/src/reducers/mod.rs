//! Booking workflow reducers.
//!
//! Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
//!
//! [`BookingFlowReducer`] routes each action to one sub-reducer and then
//! looks at how the session changed. A `false → true` transition is the only
//! place a held draft is resumed, so the transition is observed exactly once
//! per sign-in regardless of which path (probe, login, registration) caused it.

pub mod gate;
pub mod limit;
pub mod otp;
pub mod session;

use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::providers::{AuthApi, BookingApi, DurableStorage, Navigator};
use crate::state::FlowState;
use azurea_core::{Clock, SmallVec, effect::Effect, reducer::Reducer};

// Re-export
pub use gate::GateReducer;
pub use limit::LimitReducer;
pub use otp::OtpReducer;
pub use session::SessionReducer;

/// Effects returned by every booking reducer.
pub type Effects = SmallVec<[Effect<BookingAction>; 4]>;

/// Root booking workflow reducer.
///
/// Combines the session, gate, OTP and limit reducers over one [`FlowState`].
#[derive(Debug, Clone)]
pub struct BookingFlowReducer<A, B, S, N, C> {
    session: SessionReducer<A, B, S, N, C>,
    gate: GateReducer<A, B, S, N, C>,
    otp: OtpReducer<A, B, S, N, C>,
    limit: LimitReducer<A, B, S, N, C>,
}

impl<A, B, S, N, C> BookingFlowReducer<A, B, S, N, C> {
    /// Create the root reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            session: SessionReducer::new(),
            gate: GateReducer::new(),
            otp: OtpReducer::new(),
            limit: LimitReducer::new(),
        }
    }
}

impl<A, B, S, N, C> Default for BookingFlowReducer<A, B, S, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, B, S, N, C> Reducer for BookingFlowReducer<A, B, S, N, C>
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
        let was_authenticated = state.session.is_authenticated();

        // Route to appropriate sub-reducer based on action type
        let mut effects = match action {
            // Session
            BookingAction::Boot
            | BookingAction::Booted { .. }
            | BookingAction::WindowFocused
            | BookingAction::SessionProbed { .. }
            | BookingAction::Login { .. }
            | BookingAction::LoginSucceeded { .. }
            | BookingAction::LoginFailed { .. }
            | BookingAction::Logout
            | BookingAction::LoggedOut
            | BookingAction::LogoutFailed { .. } => self.session.reduce(state, action, env),

            // AuthGate
            BookingAction::SubmitBooking { .. }
            | BookingAction::OpenRegistration
            | BookingAction::RegistrationOpened { .. }
            | BookingAction::OpenPasswordReset
            | BookingAction::CloseAuthSurface
            | BookingAction::DraftPersisted { .. }
            | BookingAction::DraftPersistFailed { .. }
            | BookingAction::ParkedDraftTaken { .. }
            | BookingAction::LimitChecked { .. }
            | BookingAction::BookingSubmitted { .. }
            | BookingAction::BookingFailed { .. } => self.gate.reduce(state, action, env),

            // Booking limit
            BookingAction::RefreshLimit | BookingAction::LimitRefreshed { .. } => {
                self.limit.reduce(state, action, env)
            },

            // OTP challenge
            BookingAction::SendRegistrationOtp { .. }
            | BookingAction::RequestPasswordReset { .. }
            | BookingAction::OtpSent { .. }
            | BookingAction::OtpRequestFailed { .. }
            | BookingAction::ResendOtp
            | BookingAction::OtpDigitEntered { .. }
            | BookingAction::OtpBackspace { .. }
            | BookingAction::VerifyOtp
            | BookingAction::RegistrationVerified { .. }
            | BookingAction::ResetOtpVerified { .. }
            | BookingAction::SubmitNewPassword { .. }
            | BookingAction::PasswordResetCompleted { .. }
            | BookingAction::ReturnToIdentityStep => self.otp.reduce(state, action, env),
        };

        match (was_authenticated, state.session.is_authenticated()) {
            (false, true) => effects.extend(GateReducer::on_authenticated(state, env)),
            (true, false) => {
                tracing::debug!("Session ended, forgetting booking limit");
                state.limit.reset();
            },
            _ => {},
        }

        effects
    }
}
