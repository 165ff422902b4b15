//! Mock authentication API.

use super::lock;
use crate::error::{FlowError, FormField, Result};
use crate::otp::{Password, PasswordReset, RegistrationRequest};
use crate::providers::{AuthApi, Credentials, SessionTokens, VerifiedRegistration};
use crate::state::{Identity, Role, UserId, VerificationState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A request the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCall {
    /// `probe_session`
    Probe,
    /// `login`
    Login {
        /// Email used
        email: String,
    },
    /// `logout`
    Logout,
    /// `send_registration_otp`
    SendRegistrationOtp {
        /// Email used
        email: String,
    },
    /// `resend_registration_otp`
    ResendRegistrationOtp {
        /// Email used
        email: String,
    },
    /// `verify_registration_otp`
    VerifyRegistrationOtp {
        /// Email used
        email: String,
        /// Code submitted
        otp: String,
    },
    /// `request_password_reset`
    RequestPasswordReset {
        /// Email used
        email: String,
    },
    /// `verify_reset_otp`
    VerifyResetOtp {
        /// Email used
        email: String,
        /// Code submitted
        otp: String,
    },
    /// `reset_password`
    ResetPassword {
        /// Email used
        email: String,
    },
}

#[derive(Debug)]
struct Inner {
    session: Option<Identity>,
    accounts: HashMap<String, (Password, Identity)>,
    otp: String,
    next_user_id: i64,
    next_failure: Option<FlowError>,
    probe_failure: Option<FlowError>,
    calls: Vec<AuthCall>,
}

/// Mock authentication API.
///
/// Behaves like a small in-memory server: accounts can log in, a verified
/// registration creates an account and signs it in, logout ends the session.
#[derive(Debug, Clone)]
pub struct MockAuthApi {
    inner: Arc<Mutex<Inner>>,
}

impl MockAuthApi {
    /// Create a mock with no accounts, no session, and OTP `123456`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session: None,
                accounts: HashMap::new(),
                otp: "123456".to_string(),
                next_user_id: 100,
                next_failure: None,
                probe_failure: None,
                calls: Vec::new(),
            })),
        }
    }

    /// Add an account that can log in.
    pub fn add_account(&self, email: &str, password: &str) -> Identity {
        let mut inner = lock(&self.inner);
        let identity = new_identity(&mut inner, email);
        inner
            .accounts
            .insert(email.to_string(), (Password::new(password), identity.clone()));
        identity
    }

    /// Set the server-side session returned by the probe.
    pub fn set_session(&self, identity: Option<Identity>) {
        lock(&self.inner).session = identity;
    }

    /// Server-side session.
    #[must_use]
    pub fn session(&self) -> Option<Identity> {
        lock(&self.inner).session.clone()
    }

    /// Code the mock accepts for both registration and reset.
    pub fn set_otp(&self, otp: &str) {
        lock(&self.inner).otp = otp.to_string();
    }

    /// Fail the next non-probe request with `error`.
    pub fn fail_next(&self, error: FlowError) {
        lock(&self.inner).next_failure = Some(error);
    }

    /// Fail every probe with `error` until cleared with `None`.
    pub fn fail_probes(&self, error: Option<FlowError>) {
        lock(&self.inner).probe_failure = error;
    }

    /// Every request received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<AuthCall> {
        lock(&self.inner).calls.clone()
    }

    /// Number of requests matching `predicate`.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&AuthCall) -> bool) -> usize {
        lock(&self.inner).calls.iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: AuthCall) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.calls.push(call);
        inner.next_failure.take().map_or(Ok(()), Err)
    }
}

impl Default for MockAuthApi {
    fn default() -> Self {
        Self::new()
    }
}

fn new_identity(inner: &mut Inner, email: &str) -> Identity {
    inner.next_user_id += 1;
    Identity {
        id: UserId(inner.next_user_id),
        email: email.to_string(),
        first_name: "Guest".to_string(),
        last_name: String::new(),
        role: Role::Guest,
        verification: VerificationState::Unverified,
    }
}

fn check_otp(expected: &str, otp: &str) -> Result<()> {
    if expected == otp {
        Ok(())
    } else {
        Err(FlowError::field(FormField::Otp, "Incorrect OTP code. Please try again"))
    }
}

impl AuthApi for MockAuthApi {
    async fn probe_session(&self) -> Result<Option<Identity>> {
        let mut inner = lock(&self.inner);
        inner.calls.push(AuthCall::Probe);
        if let Some(error) = inner.probe_failure.clone() {
            return Err(error);
        }
        Ok(inner.session.clone())
    }

    async fn login(&self, credentials: &Credentials) -> Result<Identity> {
        self.record(AuthCall::Login {
            email: credentials.email.clone(),
        })?;
        let mut inner = lock(&self.inner);
        let Some((password, identity)) = inner.accounts.get(&credentials.email).cloned() else {
            return Err(FlowError::field(FormField::Email, "User does not exist"));
        };
        if password != credentials.password {
            return Err(FlowError::field(FormField::Password, "Your password is incorrect."));
        }
        inner.session = Some(identity.clone());
        Ok(identity)
    }

    async fn logout(&self) -> Result<()> {
        self.record(AuthCall::Logout)?;
        lock(&self.inner).session = None;
        Ok(())
    }

    async fn send_registration_otp(&self, request: &RegistrationRequest) -> Result<()> {
        self.record(AuthCall::SendRegistrationOtp {
            email: request.email.clone(),
        })?;
        if lock(&self.inner).accounts.contains_key(&request.email) {
            return Err(FlowError::field(FormField::Email, "Email already exists"));
        }
        Ok(())
    }

    async fn resend_registration_otp(&self, email: &str) -> Result<()> {
        self.record(AuthCall::ResendRegistrationOtp {
            email: email.to_string(),
        })
    }

    async fn verify_registration_otp(&self, email: &str, password: &Password, otp: &str) -> Result<VerifiedRegistration> {
        self.record(AuthCall::VerifyRegistrationOtp {
            email: email.to_string(),
            otp: otp.to_string(),
        })?;
        let mut inner = lock(&self.inner);
        check_otp(&inner.otp, otp)?;
        if inner.accounts.contains_key(email) {
            return Err(FlowError::general("User already exists"));
        }
        let identity = new_identity(&mut inner, email);
        inner
            .accounts
            .insert(email.to_string(), (password.clone(), identity.clone()));
        inner.session = Some(identity.clone());
        Ok(VerifiedRegistration {
            identity,
            tokens: Some(SessionTokens {
                access_token: "access-token".to_string(),
                refresh_token: "refresh-token".to_string(),
            }),
        })
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.record(AuthCall::RequestPasswordReset {
            email: email.to_string(),
        })?;
        if lock(&self.inner).accounts.contains_key(email) {
            Ok(())
        } else {
            Err(FlowError::field(FormField::Email, "User does not exist"))
        }
    }

    async fn verify_reset_otp(&self, email: &str, otp: &str) -> Result<()> {
        self.record(AuthCall::VerifyResetOtp {
            email: email.to_string(),
            otp: otp.to_string(),
        })?;
        check_otp(&lock(&self.inner).otp, otp)
    }

    async fn reset_password(&self, reset: &PasswordReset) -> Result<()> {
        self.record(AuthCall::ResetPassword {
            email: reset.email.clone(),
        })?;
        let mut inner = lock(&self.inner);
        match inner.accounts.get_mut(&reset.email) {
            Some((password, _)) => {
                *password = reset.new_password.clone();
                Ok(())
            },
            None => Err(FlowError::field(FormField::Email, "User does not exist")),
        }
    }
}
