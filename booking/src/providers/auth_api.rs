//! Authentication endpoints of the hotel server.

use crate::error::{FlowError, FormField, Result};
use crate::otp::{Password, PasswordReset, RegistrationRequest, validate_email};
use crate::state::Identity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password
    pub password: Password,
}

impl Credentials {
    /// Check the credentials locally.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] for a malformed email or an empty password.
    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        if self.password.expose().is_empty() {
            return Err(FlowError::validation(FormField::Password, "Please enter your password."));
        }
        Ok(())
    }
}

/// Tokens issued when a registration is verified.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Short-lived access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
}

impl fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokens").finish_non_exhaustive()
    }
}

/// Result of a successful registration OTP verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRegistration {
    /// The newly created, signed-in user
    pub identity: Identity,
    /// Tokens, when the server returned them in the body
    pub tokens: Option<SessionTokens>,
}

/// Authentication API.
///
/// Every method performs exactly one request. Errors are already classified
/// into [`FlowError`] variants so reducers can route them to the right surface.
pub trait AuthApi: Send + Sync {
    /// Ask the server who is signed in.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(identity))`: a session exists
    /// - `Ok(None)`: no session
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn probe_session(&self) -> impl std::future::Future<Output = Result<Option<Identity>>> + Send;

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Field`] for unknown/archived accounts (email) or a
    /// wrong password (password), [`FlowError::General`] otherwise.
    fn login(&self, credentials: &Credentials) -> impl std::future::Future<Output = Result<Identity>> + Send;

    /// End the server session.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn logout(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Send the registration OTP.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Field`] when the server rejects a field (e.g. email already registered).
    fn send_registration_otp(
        &self,
        request: &RegistrationRequest,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Resend the registration OTP.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn resend_registration_otp(&self, email: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Verify the registration OTP; on success the account exists and is signed in.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Field`] on the OTP field for expired or incorrect codes.
    fn verify_registration_otp(
        &self,
        email: &str,
        password: &Password,
        otp: &str,
    ) -> impl std::future::Future<Output = Result<VerifiedRegistration>> + Send;

    /// Send the password-reset OTP.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Field`] on the email field for unknown accounts.
    fn request_password_reset(&self, email: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Verify the password-reset OTP.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Field`] on the OTP field for expired or incorrect codes.
    fn verify_reset_otp(&self, email: &str, otp: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Set the new password.
    ///
    /// # Errors
    ///
    /// Returns error if the server rejects the new password.
    fn reset_password(&self, reset: &PasswordReset) -> impl std::future::Future<Output = Result<()>> + Send;
}
