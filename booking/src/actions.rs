//! Booking workflow actions.
//!
//! Actions are the only input to the workflow. Commands express guest or host
//! intent; events report how an effect settled and always carry the id of the
//! draft, challenge or probe they belong to so late results can be ignored.

use crate::draft::{BookingDraft, DraftId, PendingBookingRecord, RestoredDraft};
use crate::error::FlowError;
use crate::limit::LimitCheck;
use crate::otp::{ChallengeId, Password, RegistrationRequest};
use crate::providers::{BookingReceipt, Credentials, VerifiedRegistration};
use crate::state::{Identity, UserId};
use serde::{Deserialize, Serialize};

/// Booking workflow action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════════
    /// Page loaded (including after a full reload).
    ///
    /// # Flow
    ///
    /// 1. Take any draft persisted before a registration reload
    /// 2. `Booted` holds it in the slot
    /// 3. Probe the session; if authenticated, the draft resumes
    Boot,

    /// Boot finished reading durable storage.
    Booted {
        /// Draft carried across the reload, or a note that it was lost.
        restored: RestoredDraft,
    },

    /// The window regained focus; re-probe the session.
    WindowFocused,

    /// A session probe settled.
    SessionProbed {
        /// Session epoch the probe started at.
        epoch: u64,
        /// Identity, no session, or failure.
        result: Result<Option<Identity>, FlowError>,
    },

    /// Sign in with credentials.
    Login {
        /// Email and password.
        credentials: Credentials,
    },

    /// The server accepted the credentials.
    LoginSucceeded {
        /// Signed-in user.
        identity: Identity,
    },

    /// The server rejected the credentials.
    LoginFailed {
        /// Classified error.
        error: FlowError,
    },

    /// Sign out.
    Logout,

    /// The server ended the session.
    LoggedOut,

    /// Logout request failed.
    LogoutFailed {
        /// Classified error.
        error: FlowError,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // AuthGate
    // ═══════════════════════════════════════════════════════════════════════
    /// The guest submitted a validated booking form.
    SubmitBooking {
        /// The booking to make.
        draft: Box<BookingDraft>,
    },

    /// Open the registration route from the login surface.
    OpenRegistration,

    /// Registration route opened.
    RegistrationOpened {
        /// Page the guest came from.
        return_url: String,
    },

    /// Open the forgot-password flow.
    OpenPasswordReset,

    /// The guest closed the authentication surface without finishing.
    CloseAuthSurface,

    /// Draft written to durable storage for the registration reload.
    DraftPersisted {
        /// Persisted draft.
        draft_id: DraftId,
    },

    /// Draft could not be persisted; it stays in memory.
    DraftPersistFailed {
        /// Draft that stays in memory.
        draft_id: DraftId,
        /// Storage error.
        error: FlowError,
    },

    /// Parked draft read back from durable storage after a login.
    ParkedDraftTaken {
        /// The record, unless it was missing or expired.
        record: Option<Box<PendingBookingRecord>>,
    },

    /// Pre-submit limit check settled.
    LimitChecked {
        /// Draft being checked; it travels with the check.
        draft: Box<BookingDraft>,
        /// Identity the check ran for.
        user: Option<UserId>,
        /// Outcome.
        check: LimitCheck,
    },

    /// The server accepted a booking.
    BookingSubmitted {
        /// Submitted draft.
        draft_id: DraftId,
        /// Server reply.
        receipt: BookingReceipt,
    },

    /// The server rejected a booking, or it never arrived.
    BookingFailed {
        /// Submitted draft.
        draft_id: DraftId,
        /// Classified error.
        error: FlowError,
    },

    /// Re-read the daily booking count.
    RefreshLimit,

    /// Background limit refresh settled.
    LimitRefreshed {
        /// Identity the check ran for.
        user: Option<UserId>,
        /// Outcome.
        check: LimitCheck,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // OTP Challenge
    // ═══════════════════════════════════════════════════════════════════════
    /// Submit email and password to start registration.
    SendRegistrationOtp {
        /// Identity to register.
        request: RegistrationRequest,
    },

    /// Submit an email to start a password reset.
    RequestPasswordReset {
        /// Account email.
        email: String,
    },

    /// An OTP send or resend succeeded.
    OtpSent {
        /// Challenge it belongs to.
        challenge: ChallengeId,
    },

    /// An OTP request failed; the challenge keeps its phase.
    OtpRequestFailed {
        /// Challenge it belongs to.
        challenge: ChallengeId,
        /// Classified error.
        error: FlowError,
    },

    /// Ask for a new code.
    ResendOtp,

    /// Text typed into one code slot.
    OtpDigitEntered {
        /// Slot index (0-5).
        index: usize,
        /// Typed text; only the first character is kept.
        text: String,
    },

    /// Backspace pressed in one code slot.
    OtpBackspace {
        /// Slot index (0-5).
        index: usize,
    },

    /// Submit the entered code.
    VerifyOtp,

    /// Registration code accepted; the account exists and is signed in.
    RegistrationVerified {
        /// Challenge it belongs to.
        challenge: ChallengeId,
        /// Server reply.
        registration: VerifiedRegistration,
    },

    /// Reset code accepted.
    ResetOtpVerified {
        /// Challenge it belongs to.
        challenge: ChallengeId,
    },

    /// Submit the new password.
    SubmitNewPassword {
        /// New password.
        new_password: Password,
        /// Confirmation.
        confirm_password: Password,
    },

    /// The new password was accepted.
    PasswordResetCompleted {
        /// Challenge it belongs to.
        challenge: ChallengeId,
    },

    /// Go back to the email step; starts a fresh challenge.
    ReturnToIdentityStep,
}

impl BookingAction {
    /// Submit a draft.
    #[must_use]
    pub fn submit(draft: BookingDraft) -> Self {
        Self::SubmitBooking { draft: Box::new(draft) }
    }
}
