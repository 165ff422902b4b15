//! Booking limit reducer.
//!
//! Keeps [`BookingLimitState`](crate::state::BookingLimitState) current for
//! the signed-in guest. The pre-submit check in the gate writes the same
//! state, so a refresh here only makes the cached value available sooner.

use crate::actions::BookingAction;
use crate::environment::BookingEnvironment;
use crate::providers::{AuthApi, BookingApi, DurableStorage, Navigator};
use crate::reducers::Effects;
use crate::state::FlowState;
use azurea_core::effect::Effect;
use azurea_core::reducer::Reducer;
use azurea_core::{Clock, async_effect, smallvec};

/// Booking limit reducer.
#[derive(Debug, Clone)]
pub struct LimitReducer<A, B, S, N, C> {
    _phantom: std::marker::PhantomData<(A, B, S, N, C)>,
}

impl<A, B, S, N, C> LimitReducer<A, B, S, N, C> {
    /// Create a new limit reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<A, B, S, N, C> Default for LimitReducer<A, B, S, N, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, B, S, N, C> LimitReducer<A, B, S, N, C>
where
    A: AuthApi + Clone + 'static,
    B: BookingApi + Clone + 'static,
    S: DurableStorage + Clone + 'static,
    N: Navigator + Clone + 'static,
    C: Clock + Clone + 'static,
{
    /// Re-read the daily count for the signed-in guest.
    ///
    /// Signed out, the cached value is reset and nothing is requested.
    pub(crate) fn refresh(state: &mut FlowState, env: &BookingEnvironment<A, B, S, N, C>) -> Effect<BookingAction> {
        let Some(identity) = state.session.identity().cloned() else {
            state.limit.reset();
            return Effect::None;
        };

        state.limit.refreshing = true;
        let guard = env.limit_guard();

        async_effect! {
            let check = guard.check(Some(&identity)).await;
            Some(BookingAction::LimitRefreshed {
                user: Some(identity.id),
                check,
            })
        }
    }
}

impl<A, B, S, N, C> Reducer for LimitReducer<A, B, S, N, C>
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
            BookingAction::RefreshLimit => smallvec![Self::refresh(state, env)],

            BookingAction::LimitRefreshed { user, check } => {
                let current = state.session.identity().map(|identity| identity.id);
                if user.is_none() || user != current {
                    tracing::debug!(?user, "Ignoring limit refresh for another session");
                    return smallvec![Effect::None];
                }
                state.limit.apply(&check, user, env.clock.now().date_naive());
                smallvec![Effect::None]
            },

            _ => smallvec![Effect::None],
        }
    }
}
