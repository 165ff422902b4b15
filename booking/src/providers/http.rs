//! reqwest-backed hotel server client.
//!
//! One [`HttpHotelApi`] serves both [`AuthApi`] and [`BookingApi`]. The
//! server authenticates with cookies, so the underlying client keeps a cookie
//! store for the lifetime of the value.

use crate::config::ApiConfig;
use crate::constants::endpoints;
use crate::draft::{BookingDraft, BookingRequest};
use crate::error::{FlowError, FormField, Result};
use crate::otp::{Password, PasswordReset, RegistrationRequest};
use crate::providers::{AuthApi, BookingApi, BookingReceipt, Credentials, LimitReport, SessionTokens, VerifiedRegistration};
use crate::state::Identity;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Which call produced an error body; decides how free-text messages map to fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Session,
    Login,
    Logout,
    Register,
    ResendOtp,
    VerifyOtp,
    ForgotPassword,
    VerifyResetOtp,
    ResetPassword,
    LimitCheck,
    SubmitBooking,
}

/// Hotel server client.
#[derive(Debug, Clone)]
pub struct HttpHotelApi {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpHotelApi {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::General`] if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client");
                FlowError::general("Unable to initialise the connection.")
            })?;
        Ok(Self { client, config })
    }

    /// API configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    async fn post_json(&self, endpoint: Endpoint, path: &str, body: &Value) -> Result<Value> {
        let url = self.config.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(FlowError::network)?;
        read_json(endpoint, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: Endpoint, path: &str) -> Result<T> {
        let url = self.config.url(path);
        let response = self.client.get(&url).send().await.map_err(FlowError::network)?;
        let value = read_json(endpoint, response).await?;
        decode(value)
    }
}

async fn read_json(endpoint: Endpoint, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    if status.is_success() {
        Ok(body)
    } else {
        tracing::debug!(?endpoint, %status, "Server rejected request");
        Err(classify_error(endpoint, status, &body))
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(error = %e, "Unexpected response shape");
        FlowError::general("Unexpected response from the server. Please try again later.")
    })
}

fn message_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(message_of),
        _ => None,
    }
}

/// Field a free-text server message belongs to, for the endpoint that produced it.
fn infer_field(endpoint: Endpoint, message: &str) -> Option<FormField> {
    let lower = message.to_lowercase();
    match endpoint {
        Endpoint::Login if lower.contains("does not exist") || lower.contains("archived") => Some(FormField::Email),
        Endpoint::Login if lower.contains("password") => Some(FormField::Password),
        Endpoint::Register | Endpoint::ResendOtp | Endpoint::ForgotPassword if lower.contains("email") || lower.contains("does not exist") => {
            Some(FormField::Email)
        },
        Endpoint::VerifyOtp | Endpoint::VerifyResetOtp if lower.contains("otp") => Some(FormField::Otp),
        Endpoint::VerifyOtp if lower.contains("already exists") => Some(FormField::Email),
        Endpoint::ResetPassword if lower.contains("match") => Some(FormField::ConfirmPassword),
        Endpoint::ResetPassword if lower.contains("password") => Some(FormField::NewPassword),
        _ => None,
    }
}

/// Turn an error response into the flow's error taxonomy.
pub(crate) fn classify_error(endpoint: Endpoint, status: StatusCode, body: &Value) -> FlowError {
    let error = body.get("error").unwrap_or(body);

    if let Value::Object(map) = error {
        let mut fields = BTreeMap::new();
        let mut general = None;
        for (key, value) in map {
            let Some(message) = message_of(value) else { continue };
            match FormField::from_server_key(key) {
                Some(field) => {
                    fields.entry(field).or_insert(message);
                },
                None => {
                    general.get_or_insert(message);
                },
            }
        }
        if !fields.is_empty() {
            return FlowError::Field { errors: fields };
        }
        if let Some(message) = general {
            return FlowError::general(message);
        }
    }

    let message = message_of(error)
        .or_else(|| body.get("message").and_then(message_of))
        .or_else(|| body.get("detail").and_then(message_of));

    match message {
        Some(message) => match infer_field(endpoint, &message) {
            Some(field) => FlowError::field(field, message),
            None => FlowError::general(message),
        },
        None if status.is_server_error() => {
            FlowError::general("Something went wrong on our side. Please try again later.")
        },
        None => FlowError::general(format!("Request failed ({status}).")),
    }
}

#[derive(Deserialize)]
struct SessionBody {
    #[serde(rename = "isAuthenticated", default)]
    is_authenticated: bool,
    #[serde(default)]
    user: Option<Identity>,
}

#[derive(Deserialize)]
struct LoginBody {
    user: Identity,
}

#[derive(Deserialize)]
struct VerifyBody {
    user: Identity,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Multipart form for a booking submission.
pub(crate) fn booking_form(draft: &BookingDraft) -> Result<Form> {
    let request = draft.request();
    let contact = request.contact();
    let document = request.identity_document();

    let valid_id = Part::bytes(document.bytes.clone())
        .file_name(document.file_name.clone())
        .mime_str(&document.content_type)
        .map_err(|e| {
            tracing::warn!(error = %e, "Invalid document content type");
            FlowError::validation(FormField::IdentityDocument, "Please upload a valid ID.")
        })?;

    let form = Form::new()
        .text("firstName", contact.first_name.clone())
        .text("lastName", contact.last_name.clone())
        .text("phoneNumber", contact.phone_number.clone())
        .text("specialRequests", contact.special_requests.clone())
        .part("validId", valid_id)
        .text("status", "pending")
        .text("totalPrice", request.total_price().to_string())
        .text("numberOfGuests", request.number_of_guests().to_string());

    let form = match request {
        BookingRequest::Room(room) => form
            .text("address", contact.address.clone())
            .text("roomId", room.room_id.0.to_string())
            .text("checkIn", room.check_in.format("%Y-%m-%d").to_string())
            .text("checkOut", room.check_out.format("%Y-%m-%d").to_string())
            .text("arrivalTime", room.arrival_time_label()),
        BookingRequest::Venue(venue) => form
            .text("roomId", venue.area_id.0.to_string())
            .text("checkIn", venue.start.format("%Y-%m-%d").to_string())
            .text("checkOut", venue.end.format("%Y-%m-%d").to_string())
            .text("isVenueBooking", "true")
            .text("startTime", venue.start.format("%H:%M").to_string())
            .text("endTime", venue.end.format("%H:%M").to_string()),
    };
    Ok(form)
}

impl AuthApi for HttpHotelApi {
    #[tracing::instrument(skip(self))]
    async fn probe_session(&self) -> Result<Option<Identity>> {
        let url = self.config.url(endpoints::SESSION);
        let response = self.client.get(&url).send().await.map_err(FlowError::network)?;
        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        let body: SessionBody = decode(read_json(Endpoint::Session, response).await?)?;
        Ok(body.user.filter(|_| body.is_authenticated))
    }

    #[tracing::instrument(skip_all)]
    async fn login(&self, credentials: &Credentials) -> Result<Identity> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password.expose(),
        });
        let body: LoginBody = decode(self.post_json(Endpoint::Login, endpoints::LOGIN, &body).await?)?;
        Ok(body.user)
    }

    #[tracing::instrument(skip(self))]
    async fn logout(&self) -> Result<()> {
        self.post_json(Endpoint::Logout, endpoints::LOGOUT, &json!({}))
            .await
            .map(drop)
    }

    #[tracing::instrument(skip_all)]
    async fn send_registration_otp(&self, request: &RegistrationRequest) -> Result<()> {
        let body = json!({
            "email": request.email,
            "password": request.password.expose(),
            "confirm_password": request.confirm_password.expose(),
        });
        self.post_json(Endpoint::Register, endpoints::REGISTER, &body)
            .await
            .map(drop)
    }

    #[tracing::instrument(skip_all)]
    async fn resend_registration_otp(&self, email: &str) -> Result<()> {
        self.post_json(Endpoint::ResendOtp, endpoints::RESEND_OTP, &json!({ "email": email }))
            .await
            .map(drop)
    }

    #[tracing::instrument(skip_all)]
    async fn verify_registration_otp(&self, email: &str, password: &Password, otp: &str) -> Result<VerifiedRegistration> {
        let body = json!({
            "email": email,
            "password": password.expose(),
            "otp": otp,
        });
        let body: VerifyBody = decode(self.post_json(Endpoint::VerifyOtp, endpoints::VERIFY_OTP, &body).await?)?;
        let tokens = body
            .access_token
            .zip(body.refresh_token)
            .map(|(access_token, refresh_token)| SessionTokens {
                access_token,
                refresh_token,
            });
        Ok(VerifiedRegistration {
            identity: body.user,
            tokens,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.post_json(Endpoint::ForgotPassword, endpoints::FORGOT_PASSWORD, &json!({ "email": email }))
            .await
            .map(drop)
    }

    #[tracing::instrument(skip_all)]
    async fn verify_reset_otp(&self, email: &str, otp: &str) -> Result<()> {
        let body = json!({ "email": email, "otp": otp });
        self.post_json(Endpoint::VerifyResetOtp, endpoints::VERIFY_RESET_OTP, &body)
            .await
            .map(drop)
    }

    #[tracing::instrument(skip_all)]
    async fn reset_password(&self, reset: &PasswordReset) -> Result<()> {
        let body = json!({
            "email": reset.email,
            "new_password": reset.new_password.expose(),
            "confirm_password": reset.confirm_password.expose(),
        });
        self.post_json(Endpoint::ResetPassword, endpoints::RESET_PASSWORD, &body)
            .await
            .map(drop)
    }
}

impl BookingApi for HttpHotelApi {
    #[tracing::instrument(skip(self))]
    async fn booking_count_today(&self) -> Result<LimitReport> {
        self.get_json(Endpoint::LimitCheck, endpoints::CHECK_MAX_BOOKINGS).await
    }

    #[tracing::instrument(skip_all, fields(draft_id = %draft.id()))]
    async fn submit_booking(&self, draft: &BookingDraft) -> Result<BookingReceipt> {
        let form = booking_form(draft)?;
        let url = self.config.url(endpoints::BOOKINGS);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(FlowError::network)?;
        let value = read_json(Endpoint::SubmitBooking, response).await?;
        let value = value.get("data").cloned().unwrap_or(value);
        decode(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::draft::fixtures::{room_draft, venue_request};

    #[test]
    fn test_login_messages_map_to_fields() {
        let error = classify_error(
            Endpoint::Login,
            StatusCode::NOT_FOUND,
            &json!({"error": "User does not exist"}),
        );
        assert_eq!(error.message_for(FormField::Email), Some("User does not exist"));

        let error = classify_error(
            Endpoint::Login,
            StatusCode::UNAUTHORIZED,
            &json!({"error": "Your password is incorrect."}),
        );
        assert_eq!(error.message_for(FormField::Password), Some("Your password is incorrect."));

        let error = classify_error(
            Endpoint::Login,
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({"error": "Database unavailable"}),
        );
        assert_eq!(error, FlowError::general("Database unavailable"));
    }

    #[test]
    fn test_otp_messages_map_to_otp_field() {
        let error = classify_error(
            Endpoint::VerifyOtp,
            StatusCode::BAD_REQUEST,
            &json!({"error": "Incorrect OTP code. Please try again"}),
        );
        assert!(error.message_for(FormField::Otp).is_some());

        let error = classify_error(
            Endpoint::VerifyOtp,
            StatusCode::NOT_FOUND,
            &json!({"error": "OTP expired. Please request a new one."}),
        );
        assert!(error.message_for(FormField::Otp).is_some());
    }

    #[test]
    fn test_field_map_and_general_key() {
        let error = classify_error(
            Endpoint::Register,
            StatusCode::BAD_REQUEST,
            &json!({"error": {"email": "Email already exists"}}),
        );
        assert_eq!(error.message_for(FormField::Email), Some("Email already exists"));

        let error = classify_error(
            Endpoint::Register,
            StatusCode::BAD_REQUEST,
            &json!({"error": {"general": "Please fill out the fields"}}),
        );
        assert_eq!(error, FlowError::general("Please fill out the fields"));

        let error = classify_error(
            Endpoint::SubmitBooking,
            StatusCode::BAD_REQUEST,
            &json!({"error": {"phoneNumber": ["Enter a valid phone number."]}}),
        );
        assert_eq!(error.message_for(FormField::PhoneNumber), Some("Enter a valid phone number."));
    }

    #[test]
    fn test_bodyless_server_error_is_banner() {
        let error = classify_error(Endpoint::SubmitBooking, StatusCode::BAD_GATEWAY, &Value::Null);
        assert_eq!(error.surface(), crate::error::ErrorSurface::Banner);
    }

    #[test]
    fn test_booking_form_builds() {
        assert!(booking_form(&room_draft(12)).is_ok());
    }

    #[test]
    fn test_venue_booking_form_checks_document_type() {
        let draft = BookingDraft::new(venue_request(3), chrono::Utc::now()).unwrap();
        assert!(booking_form(&draft).is_ok());

        let BookingRequest::Venue(mut venue) = venue_request(3) else {
            unreachable!()
        };
        venue.identity_document.content_type = "not a mime type".into();
        let draft = BookingDraft::new(BookingRequest::Venue(venue), chrono::Utc::now()).unwrap();
        let error = booking_form(&draft).unwrap_err();
        assert_eq!(error.message_for(FormField::IdentityDocument), Some("Please upload a valid ID."));
    }
}
