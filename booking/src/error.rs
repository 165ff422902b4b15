//! Error types for the booking workflow.
//!
//! Every failure the guest can see is a [`FlowError`]. Where it is shown
//! depends on the variant, see [`FlowError::surface`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for booking workflow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Form fields an error can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    /// Account email.
    Email,
    /// Account password.
    Password,
    /// Password confirmation.
    ConfirmPassword,
    /// New password during a reset.
    NewPassword,
    /// One-time password.
    Otp,
    /// Guest first name.
    FirstName,
    /// Guest last name.
    LastName,
    /// Guest phone number.
    PhoneNumber,
    /// Guest address.
    Address,
    /// Stay or event dates.
    Dates,
    /// Venue start and end times.
    Times,
    /// Number of guests.
    Guests,
    /// Uploaded identity document.
    IdentityDocument,
}

impl FormField {
    /// Map a server error-map key onto a form field.
    ///
    /// The server mixes `snake_case` and `camelCase` keys.
    #[must_use]
    pub fn from_server_key(key: &str) -> Option<Self> {
        let field = match key {
            "email" => Self::Email,
            "password" => Self::Password,
            "confirm_password" | "confirmPassword" => Self::ConfirmPassword,
            "new_password" | "newPassword" => Self::NewPassword,
            "otp" => Self::Otp,
            "first_name" | "firstName" => Self::FirstName,
            "last_name" | "lastName" => Self::LastName,
            "phone_number" | "phoneNumber" => Self::PhoneNumber,
            "address" => Self::Address,
            "check_in" | "checkIn" | "check_out" | "checkOut" | "dates" => Self::Dates,
            "start_time" | "startTime" | "end_time" | "endTime" => Self::Times,
            "number_of_guests" | "numberOfGuests" => Self::Guests,
            "valid_id" | "validId" => Self::IdentityDocument,
            _ => return None,
        };
        Some(field)
    }
}

/// Where an error is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSurface {
    /// Next to the offending field.
    Inline,
    /// Non-field banner.
    Banner,
    /// Distinct policy warning; the action itself did not fail.
    Warning,
}

/// User-facing error taxonomy for the booking workflow.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowError {
    /// Local validation failed; nothing was sent.
    #[error("{message}")]
    Validation {
        /// Offending field
        field: FormField,
        /// Message to show
        message: String,
    },

    /// Server rejected one or more fields.
    #[error("{}", first_message(errors))]
    Field {
        /// Messages keyed by field
        errors: BTreeMap<FormField, String>,
    },

    /// Network failure, unexpected status, or a server message with no field.
    #[error("{message}")]
    General {
        /// Message to show
        message: String,
    },

    /// The guest has used up today's bookings.
    #[error("{message}")]
    BookingLimitReached {
        /// Bookings made today
        current_count: u32,
        /// Daily maximum
        max_limit: u32,
        /// Message to show
        message: String,
    },
}

fn first_message(errors: &BTreeMap<FormField, String>) -> &str {
    errors.values().next().map_or("Invalid input", String::as_str)
}

impl FlowError {
    /// Local validation error.
    #[must_use]
    pub fn validation(field: FormField, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Server error scoped to a single field.
    #[must_use]
    pub fn field(field: FormField, message: impl Into<String>) -> Self {
        Self::Field {
            errors: BTreeMap::from([(field, message.into())]),
        }
    }

    /// Non-field error.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Error for a request that never got a usable response.
    #[must_use]
    pub fn network(detail: impl std::fmt::Display) -> Self {
        tracing::debug!(%detail, "Request failed before a response arrived");
        Self::general("Unable to reach the server. Please check your connection and try again.")
    }

    /// Where this error is presented.
    #[must_use]
    pub const fn surface(&self) -> ErrorSurface {
        match self {
            Self::Validation { .. } | Self::Field { .. } => ErrorSurface::Inline,
            Self::General { .. } => ErrorSurface::Banner,
            Self::BookingLimitReached { .. } => ErrorSurface::Warning,
        }
    }

    /// Message attached to `field`, if any.
    #[must_use]
    pub fn message_for(&self, field: FormField) -> Option<&str> {
        match self {
            Self::Validation { field: f, message } if *f == field => Some(message),
            Self::Field { errors } => errors.get(&field).map(String::as_str),
            _ => None,
        }
    }

    /// Check if this error came from local validation (no request was made).
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this is a policy outcome rather than a failure.
    #[must_use]
    pub const fn is_policy(&self) -> bool {
        matches!(self, Self::BookingLimitReached { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surfaces() {
        assert_eq!(
            FlowError::validation(FormField::Otp, "x").surface(),
            ErrorSurface::Inline
        );
        assert_eq!(FlowError::field(FormField::Email, "taken").surface(), ErrorSurface::Inline);
        assert_eq!(FlowError::general("boom").surface(), ErrorSurface::Banner);
        let limit = FlowError::BookingLimitReached {
            current_count: 3,
            max_limit: 3,
            message: "limit".into(),
        };
        assert_eq!(limit.surface(), ErrorSurface::Warning);
        assert!(limit.is_policy());
    }

    #[test]
    fn test_message_for_field() {
        let error = FlowError::field(FormField::Email, "Email already registered");
        assert_eq!(error.message_for(FormField::Email), Some("Email already registered"));
        assert_eq!(error.message_for(FormField::Password), None);
        assert_eq!(error.to_string(), "Email already registered");
    }

    #[test]
    fn test_server_keys() {
        assert_eq!(FormField::from_server_key("confirm_password"), Some(FormField::ConfirmPassword));
        assert_eq!(FormField::from_server_key("phoneNumber"), Some(FormField::PhoneNumber));
        assert_eq!(FormField::from_server_key("general"), None);
    }
}
