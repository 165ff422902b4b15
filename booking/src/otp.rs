//! One-time-password challenge.
//!
//! [`OtpChallenge`] is a finite-state machine with a single current phase:
//!
//! ```text
//! CollectingIdentity ──send──▶ OtpSent ──verify──▶ Completed          (registration)
//!                               │   ▲    └─verify─▶ OtpVerified ──reset──▶ Completed  (password reset)
//!                               └───┘ resend (after cooldown)
//! ```
//!
//! Every transition is a method that either applies or returns an
//! [`OtpRejection`] and leaves the challenge untouched. Network failures never
//! move the phase backwards; they clear the in-flight request and record an
//! error. Going back to the email step replaces the whole challenge, so a
//! late result for the old one is recognised by its [`ChallengeId`].

use crate::constants::{OTP_INCOMPLETE_MESSAGE, OTP_LENGTH};
use crate::error::{FlowError, FormField};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one challenge instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeId(pub uuid::Uuid);

impl ChallengeId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ChallengeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A password that never shows up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    /// Wrap a password.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw password, for request bodies only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Registration identity collected before the OTP is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Account email
    pub email: String,
    /// Chosen password
    pub password: Password,
    /// Confirmation of the password
    pub confirm_password: Password,
}

impl RegistrationRequest {
    /// Check the identity locally.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] for a malformed email, a short
    /// password, or mismatched confirmation.
    pub fn validate(&self) -> Result<(), FlowError> {
        validate_email(&self.email)?;
        validate_new_password(&self.password, &self.confirm_password, FormField::Password)
    }
}

/// New password submitted at the end of a reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReset {
    /// Account email
    pub email: String,
    /// New password
    pub new_password: Password,
    /// Confirmation of the new password
    pub confirm_password: Password,
}

pub(crate) fn validate_email(email: &str) -> Result<(), FlowError> {
    let trimmed = email.trim();
    let valid = trimmed
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if valid {
        Ok(())
    } else {
        Err(FlowError::validation(FormField::Email, "Please enter a valid email address."))
    }
}

fn validate_new_password(password: &Password, confirm: &Password, field: FormField) -> Result<(), FlowError> {
    if password.expose().chars().count() < 8 {
        return Err(FlowError::validation(field, "Password must be at least 8 characters."));
    }
    if password != confirm {
        return Err(FlowError::validation(FormField::ConfirmPassword, "Passwords do not match."));
    }
    Ok(())
}

/// What the challenge is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpPurpose {
    /// New-account registration
    Registration,
    /// Password reset
    PasswordReset,
}

/// Current phase of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpPhase {
    /// Waiting for email (and password, for registration).
    CollectingIdentity,
    /// A code was sent; resend unlocks at `resend_available_at`.
    OtpSent {
        /// Earliest instant a resend is accepted
        resend_available_at: DateTime<Utc>,
    },
    /// Reset code accepted; waiting for the new password.
    OtpVerified,
    /// Terminal.
    Completed,
}

/// Request currently outstanding for a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpRequest {
    /// First send
    Send,
    /// Resend
    Resend,
    /// Code verification
    Verify,
    /// New password submission
    ResetPassword,
}

/// Why a transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpRejection {
    /// Not valid from the current phase.
    WrongPhase {
        /// Phase the challenge was in
        phase: OtpPhase,
    },
    /// Another request for this challenge has not settled.
    RequestInFlight {
        /// The outstanding request
        request: OtpRequest,
    },
    /// Resend attempted before the cooldown elapsed.
    CooldownActive {
        /// Time left
        remaining: Duration,
    },
    /// Local validation failed.
    Invalid(FlowError),
}

/// Six-slot verification code input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpCode {
    slots: [Option<char>; OTP_LENGTH],
    focus: usize,
}

impl OtpCode {
    /// Enter `text` into slot `index`.
    ///
    /// Only the first character is kept. Entering a character moves focus to
    /// the next slot; empty text clears the slot. Out-of-range indexes and
    /// whitespace are ignored.
    pub fn input(&mut self, index: usize, text: &str) {
        if index >= OTP_LENGTH {
            return;
        }
        match text.chars().next() {
            None => self.slots[index] = None,
            Some(c) if c.is_whitespace() => {},
            Some(c) => {
                self.slots[index] = Some(c);
                self.focus = (index + 1).min(OTP_LENGTH - 1);
            },
        }
    }

    /// Backspace in slot `index`.
    ///
    /// Clears a filled slot; on an empty slot, moves focus to the previous one.
    pub fn backspace(&mut self, index: usize) {
        if index >= OTP_LENGTH {
            return;
        }
        if self.slots[index].is_some() {
            self.slots[index] = None;
            self.focus = index;
        } else if index > 0 {
            self.focus = index - 1;
        }
    }

    /// Slot that currently has focus.
    #[must_use]
    pub const fn focus(&self) -> usize {
        self.focus
    }

    /// Character in slot `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<char> {
        self.slots.get(index).copied().flatten()
    }

    /// Number of filled slots.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// The full code, if every slot is filled.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.slots.iter().copied().collect()
    }

    /// Empty every slot and focus the first.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One registration or password-reset attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    id: ChallengeId,
    purpose: OtpPurpose,
    phase: OtpPhase,
    email: String,
    password: Option<Password>,
    code: OtpCode,
    pending: Option<OtpRequest>,
    error: Option<FlowError>,
}

impl OtpChallenge {
    /// Fresh challenge in `CollectingIdentity`.
    #[must_use]
    pub fn new(purpose: OtpPurpose) -> Self {
        Self {
            id: ChallengeId::new(),
            purpose,
            phase: OtpPhase::CollectingIdentity,
            email: String::new(),
            password: None,
            code: OtpCode::default(),
            pending: None,
            error: None,
        }
    }

    /// Challenge id.
    #[must_use]
    pub const fn id(&self) -> ChallengeId {
        self.id
    }

    /// Purpose.
    #[must_use]
    pub const fn purpose(&self) -> OtpPurpose {
        self.purpose
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> OtpPhase {
        self.phase
    }

    /// Email the code goes to.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Registration password, if collected.
    #[must_use]
    pub const fn password(&self) -> Option<&Password> {
        self.password.as_ref()
    }

    /// Code input.
    #[must_use]
    pub const fn code(&self) -> &OtpCode {
        &self.code
    }

    /// Mutable code input (editing never changes the phase).
    pub const fn code_mut(&mut self) -> &mut OtpCode {
        &mut self.code
    }

    /// Outstanding request, if any. The matching button stays disabled while set.
    #[must_use]
    pub const fn pending(&self) -> Option<OtpRequest> {
        self.pending
    }

    /// Last error.
    #[must_use]
    pub const fn error(&self) -> Option<&FlowError> {
        self.error.as_ref()
    }

    /// Whether the challenge reached its terminal phase.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.phase, OtpPhase::Completed)
    }

    /// Earliest resend instant, while a code is outstanding.
    #[must_use]
    pub const fn resend_available_at(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            OtpPhase::OtpSent { resend_available_at } => Some(resend_available_at),
            _ => None,
        }
    }

    /// Time until resend unlocks, zero once it has.
    #[must_use]
    pub fn countdown(&self, now: DateTime<Utc>) -> Duration {
        self.resend_available_at()
            .map_or_else(Duration::zero, |at| (at - now).max(Duration::zero()))
    }

    /// Whole seconds shown on the resend countdown (rounded up).
    #[must_use]
    pub fn countdown_secs(&self, now: DateTime<Utc>) -> i64 {
        let remaining = self.countdown(now);
        let secs = remaining.num_seconds();
        if remaining > Duration::seconds(secs) { secs + 1 } else { secs }
    }

    /// Whether a resend would be accepted at `now`.
    #[must_use]
    pub fn can_resend(&self, now: DateTime<Utc>) -> bool {
        self.pending.is_none() && matches!(self.phase, OtpPhase::OtpSent { resend_available_at } if now >= resend_available_at)
    }

    fn ensure_idle(&self) -> Result<(), OtpRejection> {
        match self.pending {
            Some(request) => Err(OtpRejection::RequestInFlight { request }),
            None => Ok(()),
        }
    }

    /// Start the first registration send.
    ///
    /// # Errors
    ///
    /// Rejected outside `CollectingIdentity`, while a request is in flight,
    /// for a non-registration challenge, or if the identity is invalid.
    pub fn begin_registration(&mut self, request: &RegistrationRequest) -> Result<(), OtpRejection> {
        if self.purpose != OtpPurpose::Registration || self.phase != OtpPhase::CollectingIdentity {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        self.ensure_idle()?;
        if let Err(error) = request.validate() {
            self.error = Some(error.clone());
            return Err(OtpRejection::Invalid(error));
        }
        self.email = request.email.trim().to_string();
        self.password = Some(request.password.clone());
        self.pending = Some(OtpRequest::Send);
        self.error = None;
        Ok(())
    }

    /// Start the password-reset send.
    ///
    /// # Errors
    ///
    /// Rejected outside `CollectingIdentity`, while a request is in flight,
    /// for a non-reset challenge, or if the email is invalid.
    pub fn begin_reset_request(&mut self, email: &str) -> Result<(), OtpRejection> {
        if self.purpose != OtpPurpose::PasswordReset || self.phase != OtpPhase::CollectingIdentity {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        self.ensure_idle()?;
        if let Err(error) = validate_email(email) {
            self.error = Some(error.clone());
            return Err(OtpRejection::Invalid(error));
        }
        self.email = email.trim().to_string();
        self.pending = Some(OtpRequest::Send);
        self.error = None;
        Ok(())
    }

    /// Start a resend.
    ///
    /// # Errors
    ///
    /// Rejected unless a code is outstanding, nothing is in flight, and
    /// `now` has reached `resend_available_at`.
    pub fn begin_resend(&mut self, now: DateTime<Utc>) -> Result<(), OtpRejection> {
        let OtpPhase::OtpSent { resend_available_at } = self.phase else {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        };
        self.ensure_idle()?;
        if now < resend_available_at {
            return Err(OtpRejection::CooldownActive {
                remaining: resend_available_at - now,
            });
        }
        self.pending = Some(OtpRequest::Resend);
        self.error = None;
        Ok(())
    }

    /// A send or resend succeeded at `now`.
    ///
    /// The new `resend_available_at` is strictly later than any previous one.
    ///
    /// # Errors
    ///
    /// Rejected if no send or resend is outstanding.
    pub fn confirm_sent(&mut self, now: DateTime<Utc>, cooldown: Duration) -> Result<(), OtpRejection> {
        if !matches!(self.pending, Some(OtpRequest::Send | OtpRequest::Resend)) {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        let mut available_at = now + cooldown;
        if let Some(previous) = self.resend_available_at() {
            available_at = available_at.max(previous + Duration::milliseconds(1));
        }
        self.phase = OtpPhase::OtpSent {
            resend_available_at: available_at,
        };
        self.code.clear();
        self.pending = None;
        self.error = None;
        Ok(())
    }

    /// Start verifying the entered code; returns the code to send.
    ///
    /// # Errors
    ///
    /// Rejected unless a code is outstanding and nothing is in flight. An
    /// incomplete code is rejected locally with a validation error.
    pub fn begin_verify(&mut self) -> Result<String, OtpRejection> {
        if !matches!(self.phase, OtpPhase::OtpSent { .. }) {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        self.ensure_idle()?;
        let Some(code) = self.code.value() else {
            let error = FlowError::validation(FormField::Otp, OTP_INCOMPLETE_MESSAGE);
            self.error = Some(error.clone());
            return Err(OtpRejection::Invalid(error));
        };
        self.pending = Some(OtpRequest::Verify);
        self.error = None;
        Ok(code)
    }

    /// The server accepted the code.
    ///
    /// Registration completes; password reset moves to `OtpVerified`.
    ///
    /// # Errors
    ///
    /// Rejected if no verification is outstanding.
    pub fn confirm_verified(&mut self) -> Result<(), OtpRejection> {
        if self.pending != Some(OtpRequest::Verify) {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        self.phase = match self.purpose {
            OtpPurpose::Registration => OtpPhase::Completed,
            OtpPurpose::PasswordReset => OtpPhase::OtpVerified,
        };
        self.pending = None;
        self.error = None;
        Ok(())
    }

    /// Start submitting the new password; returns the reset payload.
    ///
    /// # Errors
    ///
    /// Rejected outside `OtpVerified`, while a request is in flight, or if the
    /// passwords are invalid.
    pub fn begin_password_reset(
        &mut self,
        new_password: Password,
        confirm_password: Password,
    ) -> Result<PasswordReset, OtpRejection> {
        if self.phase != OtpPhase::OtpVerified {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        self.ensure_idle()?;
        if let Err(error) = validate_new_password(&new_password, &confirm_password, FormField::NewPassword) {
            self.error = Some(error.clone());
            return Err(OtpRejection::Invalid(error));
        }
        self.pending = Some(OtpRequest::ResetPassword);
        self.error = None;
        Ok(PasswordReset {
            email: self.email.clone(),
            new_password,
            confirm_password,
        })
    }

    /// The new password was accepted.
    ///
    /// # Errors
    ///
    /// Rejected if no reset is outstanding.
    pub fn confirm_password_reset(&mut self) -> Result<(), OtpRejection> {
        if self.pending != Some(OtpRequest::ResetPassword) {
            return Err(OtpRejection::WrongPhase { phase: self.phase });
        }
        self.phase = OtpPhase::Completed;
        self.pending = None;
        self.error = None;
        Ok(())
    }

    /// The outstanding request failed; the phase is left as it was.
    pub fn fail_request(&mut self, error: FlowError) {
        self.pending = None;
        self.error = Some(error);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_748_768_400, 0).unwrap()
    }

    fn registration() -> RegistrationRequest {
        RegistrationRequest {
            email: "a@b.com".into(),
            password: Password::new("correct horse"),
            confirm_password: Password::new("correct horse"),
        }
    }

    fn sent_challenge() -> OtpChallenge {
        let mut challenge = OtpChallenge::new(OtpPurpose::Registration);
        challenge.begin_registration(&registration()).unwrap();
        challenge.confirm_sent(t0(), Duration::seconds(120)).unwrap();
        challenge
    }

    fn enter(challenge: &mut OtpChallenge, code: &str) {
        for (i, c) in code.chars().enumerate() {
            challenge.code_mut().input(i, &c.to_string());
        }
    }

    #[test]
    fn test_registration_happy_path() {
        let mut challenge = sent_challenge();
        assert_eq!(challenge.resend_available_at(), Some(t0() + Duration::seconds(120)));

        enter(&mut challenge, "123456");
        assert_eq!(challenge.begin_verify().unwrap(), "123456");
        challenge.confirm_verified().unwrap();
        assert!(challenge.is_completed());
    }

    #[test]
    fn test_cannot_skip_otp_sent() {
        let mut challenge = OtpChallenge::new(OtpPurpose::Registration);
        assert!(matches!(challenge.begin_verify(), Err(OtpRejection::WrongPhase { .. })));
        assert!(matches!(challenge.begin_resend(t0()), Err(OtpRejection::WrongPhase { .. })));
    }

    #[test]
    fn test_resend_cooldown_scenario() {
        let mut challenge = sent_challenge();

        // t=50s: rejected, nothing changes
        let before = challenge.clone();
        let rejection = challenge.begin_resend(t0() + Duration::seconds(50)).unwrap_err();
        assert_eq!(
            rejection,
            OtpRejection::CooldownActive {
                remaining: Duration::seconds(70)
            }
        );
        assert_eq!(challenge, before);

        // t=121s: accepted, cooldown resets to t=241s
        let now = t0() + Duration::seconds(121);
        challenge.begin_resend(now).unwrap();
        challenge.confirm_sent(now, Duration::seconds(120)).unwrap();
        assert_eq!(challenge.resend_available_at(), Some(t0() + Duration::seconds(241)));
    }

    #[test]
    fn test_double_resend_blocked_while_in_flight() {
        let mut challenge = sent_challenge();
        let now = t0() + Duration::seconds(130);
        challenge.begin_resend(now).unwrap();
        assert_eq!(
            challenge.begin_resend(now),
            Err(OtpRejection::RequestInFlight {
                request: OtpRequest::Resend
            })
        );
    }

    #[test]
    fn test_incomplete_code_fails_locally() {
        let mut challenge = sent_challenge();
        enter(&mut challenge, "12345");
        let Err(OtpRejection::Invalid(error)) = challenge.begin_verify() else {
            panic!("expected local validation failure");
        };
        assert_eq!(error.message_for(FormField::Otp), Some(OTP_INCOMPLETE_MESSAGE));
        assert_eq!(challenge.pending(), None);
    }

    #[test]
    fn test_failure_keeps_phase() {
        let mut challenge = sent_challenge();
        enter(&mut challenge, "000000");
        challenge.begin_verify().unwrap();
        challenge.fail_request(FlowError::field(FormField::Otp, "Incorrect OTP code. Please try again"));
        assert!(matches!(challenge.phase(), OtpPhase::OtpSent { .. }));
        assert!(challenge.pending().is_none());
        assert!(challenge.error().is_some());
    }

    #[test]
    fn test_password_reset_path() {
        let mut challenge = OtpChallenge::new(OtpPurpose::PasswordReset);
        challenge.begin_reset_request("a@b.com").unwrap();
        challenge.confirm_sent(t0(), Duration::seconds(120)).unwrap();
        enter(&mut challenge, "654321");
        challenge.begin_verify().unwrap();
        challenge.confirm_verified().unwrap();
        assert_eq!(challenge.phase(), OtpPhase::OtpVerified);

        let mismatch = challenge.begin_password_reset(Password::new("newpassword"), Password::new("other"));
        assert!(matches!(mismatch, Err(OtpRejection::Invalid(_))));

        let reset = challenge
            .begin_password_reset(Password::new("newpassword"), Password::new("newpassword"))
            .unwrap();
        assert_eq!(reset.email, "a@b.com");
        challenge.confirm_password_reset().unwrap();
        assert!(challenge.is_completed());
    }

    #[test]
    fn test_code_focus_movement() {
        let mut code = OtpCode::default();
        code.input(0, "7");
        assert_eq!(code.focus(), 1);
        code.input(1, "89");
        assert_eq!(code.slot(1), Some('8'));
        code.backspace(2);
        assert_eq!(code.focus(), 1);
        code.backspace(1);
        assert_eq!(code.slot(1), None);
        code.input(5, "1");
        assert_eq!(code.focus(), 5);
        code.input(6, "1");
        assert_eq!(code.filled(), 2);
    }

    #[test]
    fn test_countdown_rounds_up() {
        let challenge = sent_challenge();
        let now = t0() + Duration::milliseconds(500);
        assert_eq!(challenge.countdown_secs(now), 120);
        assert_eq!(challenge.countdown_secs(t0() + Duration::seconds(200)), 0);
    }

    proptest! {
        #[test]
        fn prop_resend_available_at_strictly_increases(gaps in prop::collection::vec(0i64..400, 1..12)) {
            let mut challenge = sent_challenge();
            let mut now = t0();
            let mut last = challenge.resend_available_at().unwrap();

            for gap in gaps {
                now += Duration::seconds(gap);
                match challenge.begin_resend(now) {
                    Ok(()) => {
                        prop_assert!(now >= last);
                        challenge.confirm_sent(now, Duration::seconds(120)).unwrap();
                        let next = challenge.resend_available_at().unwrap();
                        prop_assert!(next > last);
                        last = next;
                    }
                    Err(OtpRejection::CooldownActive { .. }) => {
                        prop_assert!(now < last);
                        prop_assert_eq!(challenge.resend_available_at(), Some(last));
                    }
                    Err(other) => prop_assert!(false, "unexpected rejection {:?}", other),
                }
            }
        }

        #[test]
        fn prop_code_never_exceeds_six(inputs in prop::collection::vec((0usize..10, "[0-9a-z]{0,3}"), 0..30)) {
            let mut code = OtpCode::default();
            for (index, text) in inputs {
                code.input(index, &text);
                prop_assert!(code.filled() <= OTP_LENGTH);
                prop_assert!(code.focus() < OTP_LENGTH);
            }
        }
    }
}
