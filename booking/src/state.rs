//! Booking workflow state.
//!
//! [`FlowState`] is owned by the Store and mutated only by the reducers.
//! Everything a view needs to render (which surface is open, which buttons
//! are disabled, which error goes where) is derivable from it.

use crate::constants::{CONSUMED_DRAFT_HISTORY, limit_reached_message};
use crate::draft::{BookingKind, DraftId, DraftSlot};
use crate::error::FlowError;
use crate::limit::LimitCheck;
use crate::otp::OtpChallenge;
use crate::providers::BookingId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Server-assigned user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Hotel guest
    #[default]
    Guest,
    /// Administrator
    Admin,
    /// Role this client does not know
    #[serde(other)]
    Unknown,
}

/// Identity-document review status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    /// No document reviewed yet
    #[default]
    Unverified,
    /// Document awaiting review
    Pending,
    /// Document accepted
    Verified,
    /// Document rejected
    Rejected,
    /// Status this client does not know
    #[serde(other)]
    Unknown,
}

/// The authenticated user, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User id
    pub id: UserId,
    /// Account email
    pub email: String,
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: String,
    /// Role
    #[serde(default)]
    pub role: Role,
    /// Identity-document review status
    #[serde(default, rename = "is_verified")]
    pub verification: VerificationState,
}

/// Current authentication status.
///
/// Authenticated exactly when an identity is present. `epoch` is bumped by
/// every mutation so that a probe started before a mutation cannot overwrite
/// it when it settles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    identity: Option<Identity>,
    epoch: u64,
    probe_in_flight: bool,
}

impl AuthSession {
    /// Whether a user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// The signed-in user.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Mutation counter.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a session probe is outstanding.
    #[must_use]
    pub const fn probe_in_flight(&self) -> bool {
        self.probe_in_flight
    }

    /// Sign `identity` in. Returns `true` if this was a `false → true` transition.
    pub fn set_authenticated(&mut self, identity: Identity) -> bool {
        let was_authenticated = self.is_authenticated();
        self.identity = Some(identity);
        self.epoch += 1;
        !was_authenticated
    }

    /// Sign out. Returns `true` if someone was signed in.
    pub fn clear(&mut self) -> bool {
        let was_authenticated = self.is_authenticated();
        self.identity = None;
        self.epoch += 1;
        was_authenticated
    }

    /// Record that a probe started; returns the epoch it must match on settlement.
    pub const fn begin_probe(&mut self) -> u64 {
        self.probe_in_flight = true;
        self.epoch
    }

    /// Record that the probe for `epoch` settled. Returns `false` if it is stale.
    pub const fn finish_probe(&mut self, epoch: u64) -> bool {
        self.probe_in_flight = false;
        epoch == self.epoch
    }
}

/// Login surface state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// A login request is in flight; the submit button is disabled.
    pub pending: bool,
    /// Last login error.
    pub error: Option<FlowError>,
}

/// Daily booking quota for one identity on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingLimitState {
    /// Bookings made today
    pub current_count: u32,
    /// Daily maximum
    pub max_limit: u32,
    /// Server verdict, for replies that carry no count
    pub allowed: bool,
    /// Server-provided reason when blocked
    pub message: Option<String>,
    /// Who and when this was computed for
    pub checked_for: Option<(UserId, NaiveDate)>,
    /// A refresh is in flight
    pub refreshing: bool,
}

impl BookingLimitState {
    /// Fresh, allowed state with the given maximum.
    #[must_use]
    pub const fn new(max_limit: u32) -> Self {
        Self {
            current_count: 0,
            max_limit,
            allowed: true,
            message: None,
            checked_for: None,
            refreshing: false,
        }
    }

    /// Whether another booking is allowed.
    #[must_use]
    pub const fn can_book(&self) -> bool {
        self.allowed && self.current_count < self.max_limit
    }

    /// Whether the cached value applies to `user` on `today`.
    #[must_use]
    pub fn is_fresh_for(&self, user: UserId, today: NaiveDate) -> bool {
        self.checked_for == Some((user, today))
    }

    /// Store a check result computed for `user` on `today`.
    pub fn apply(&mut self, check: &LimitCheck, user: Option<UserId>, today: NaiveDate) {
        self.current_count = check.current_count;
        self.max_limit = check.max_limit;
        self.allowed = check.can_book;
        self.message = check.reason.clone();
        self.checked_for = user.map(|u| (u, today));
        self.refreshing = false;
    }

    /// The policy error to show when blocked.
    #[must_use]
    pub fn to_error(&self) -> Option<FlowError> {
        (!self.can_book()).then(|| FlowError::BookingLimitReached {
            current_count: self.current_count,
            max_limit: self.max_limit,
            message: self
                .message
                .clone()
                .unwrap_or_else(|| limit_reached_message(self.max_limit)),
        })
    }

    /// Forget the cached value.
    pub fn reset(&mut self) {
        *self = Self::new(self.max_limit);
    }
}

/// Which authentication surface is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthSurface {
    /// Nothing open
    #[default]
    Closed,
    /// Login modal
    Login,
    /// Registration route
    Registration,
    /// Forgot-password flow
    PasswordReset,
}

/// Where the gate is in handling the current draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GatePhase {
    /// Nothing in progress.
    #[default]
    Idle,
    /// A draft waits in the slot for authentication.
    AwaitingAuth,
    /// Registration completed; a full reload to the return URL was requested.
    ReloadPending,
    /// Limit check in flight for a taken draft; the draft travels with the check.
    CheckingLimit {
        /// Draft being checked
        draft_id: DraftId,
        /// Whether this draft was resumed after authentication
        deferred: bool,
    },
    /// Submission in flight.
    Submitting {
        /// Draft being submitted
        draft_id: DraftId,
        /// Booking kind
        kind: BookingKind,
        /// Whether this draft was resumed after authentication
        deferred: bool,
    },
}

impl GatePhase {
    /// Draft a limit check or submission is in flight for.
    #[must_use]
    pub const fn in_flight_draft(&self) -> Option<DraftId> {
        match self {
            Self::CheckingLimit { draft_id, .. } | Self::Submitting { draft_id, .. } => Some(*draft_id),
            _ => None,
        }
    }
}

/// How the gate handled a submitted draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Handed to the limit check and then the submitter.
    Forwarded,
    /// Held until the guest signs in.
    Deferred,
    /// Refused without a submission.
    Rejected(FlowError),
}

/// AuthGate state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateState {
    /// Current phase
    pub phase: GatePhase,
    /// The single draft slot
    pub slot: DraftSlot,
    /// Surface currently shown
    pub surface: AuthSurface,
    /// Last booking error (validation, server, or policy)
    pub error: Option<FlowError>,
    /// Page the guest left for the registration route
    pub return_url: Option<String>,
    /// Decision for the most recently submitted draft
    pub last_decision: Option<(DraftId, SubmitDecision)>,
    consumed: VecDeque<DraftId>,
}

impl GateState {
    /// Record that `draft_id` has been handed to the submitter (or dropped).
    pub fn mark_consumed(&mut self, draft_id: DraftId) {
        if self.consumed.contains(&draft_id) {
            return;
        }
        if self.consumed.len() == CONSUMED_DRAFT_HISTORY {
            self.consumed.pop_front();
        }
        self.consumed.push_back(draft_id);
    }

    /// Whether `draft_id` was already consumed.
    #[must_use]
    pub fn was_consumed(&self, draft_id: DraftId) -> bool {
        self.consumed.contains(&draft_id)
    }

    /// Decision recorded for `draft_id`, if it was the last one submitted.
    #[must_use]
    pub fn decision_for(&self, draft_id: DraftId) -> Option<&SubmitDecision> {
        match &self.last_decision {
            Some((id, decision)) if *id == draft_id => Some(decision),
            _ => None,
        }
    }

    /// Whether a limit check or submission is in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(
            self.phase,
            GatePhase::CheckingLimit { .. } | GatePhase::Submitting { .. } | GatePhase::ReloadPending
        )
    }
}

/// Successful booking awaiting the confirmation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// New booking id
    pub booking_id: BookingId,
    /// Booking kind
    pub kind: BookingKind,
    /// Route of the confirmation view
    pub route: String,
}

/// Root state of the booking workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowState {
    /// Authentication status
    pub session: AuthSession,
    /// Login surface
    pub login: LoginForm,
    /// A logout request is in flight
    pub logout_pending: bool,
    /// Daily booking quota
    pub limit: BookingLimitState,
    /// AuthGate
    pub gate: GateState,
    /// Active registration or password-reset challenge
    pub otp: Option<OtpChallenge>,
    /// Last successful booking
    pub confirmation: Option<Confirmation>,
    /// `Boot` has been handled
    pub booted: bool,
}

impl FlowState {
    /// Initial state with the given daily maximum.
    #[must_use]
    pub fn new(max_daily_bookings: u32) -> Self {
        Self {
            session: AuthSession::default(),
            login: LoginForm::default(),
            logout_pending: false,
            limit: BookingLimitState::new(max_daily_bookings),
            gate: GateState::default(),
            otp: None,
            confirmation: None,
            booted: false,
        }
    }

    /// Whether a core async operation is outstanding (drives the processing indicator).
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.gate.is_busy()
            || self.login.pending
            || self.logout_pending
            || self.otp.as_ref().is_some_and(|otp| otp.pending().is_some())
    }

    /// Whether the booking submit button should be disabled.
    #[must_use]
    pub const fn submit_disabled(&self) -> bool {
        self.gate.is_busy()
    }
}

impl Default for FlowState {
    fn default() -> Self {
        Self::new(crate::constants::MAX_DAILY_BOOKINGS)
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fixtures::guest;
    use super::*;

    #[test]
    fn test_session_transitions_bump_epoch() {
        let mut session = AuthSession::default();
        assert!(!session.is_authenticated());

        assert!(session.set_authenticated(guest(7, "a@b.com")));
        assert!(!session.set_authenticated(guest(7, "a@b.com")));
        assert_eq!(session.epoch(), 2);

        assert!(session.clear());
        assert!(!session.clear());
        assert!(session.identity().is_none());
    }

    #[test]
    fn test_stale_probe_detected() {
        let mut session = AuthSession::default();
        let epoch = session.begin_probe();
        session.set_authenticated(guest(7, "a@b.com"));
        assert!(session.probe_in_flight());
        assert!(!session.finish_probe(epoch));
        assert!(!session.probe_in_flight());
    }

    #[test]
    fn test_consumed_ring_is_bounded() {
        let mut gate = GateState::default();
        let first = DraftId::new();
        gate.mark_consumed(first);
        for _ in 0..CONSUMED_DRAFT_HISTORY {
            gate.mark_consumed(DraftId::new());
        }
        assert!(!gate.was_consumed(first));
    }

    #[test]
    fn test_identity_from_server_payload() {
        let identity: Identity = serde_json::from_str(
            r#"{"id": 4, "email": "a@b.com", "username": "a@b.com", "first_name": "Guest",
                "last_name": "", "role": "guest", "profile_image": null,
                "is_verified": "unverified", "last_booking_date": null}"#,
        )
        .unwrap();
        assert_eq!(identity.id, UserId(4));
        assert_eq!(identity.role, Role::Guest);
        assert_eq!(identity.verification, VerificationState::Unverified);
    }

    #[test]
    fn test_limit_freshness() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut limit = BookingLimitState::new(3);
        assert!(limit.can_book());
        limit.apply(
            &LimitCheck::counted(3, 3),
            Some(UserId(4)),
            today,
        );
        assert!(!limit.can_book());
        assert!(limit.is_fresh_for(UserId(4), today));
        assert!(!limit.is_fresh_for(UserId(4), today.succ_opt().unwrap()));
        assert!(!limit.is_fresh_for(UserId(5), today));
    }
}
