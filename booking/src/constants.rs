//! Booking workflow constants.
//!
//! Storage keys and routes are shared with the web client, so their values
//! must not change.

/// Keys in the reload-durable key/value store.
pub mod storage_keys {
    /// Set to `"true"` while a draft waits on the registration detour.
    pub const PENDING_BOOKING: &str = "pendingBookingCallback";

    /// URL to reload once registration completes.
    pub const RETURN_URL: &str = "bookingReturnUrl";

    /// Serialized draft carried across the reload.
    pub const PENDING_DRAFT: &str = "pendingBookingDraft";

    /// Access token returned by OTP verification.
    pub const ACCESS_TOKEN: &str = "access_token";

    /// Refresh token returned by OTP verification.
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Client-side routes.
pub mod routes {
    /// Intermediate registration route.
    pub const REGISTRATION: &str = "/registration";

    /// Confirmation view, keyed by `bookingId` and `isVenue` query parameters.
    pub const BOOKING_ACCEPTED: &str = "/booking-accepted";

    /// Landing page.
    pub const HOME: &str = "/";
}

/// Server endpoint paths, relative to the configured base URLs.
pub mod endpoints {
    /// Session probe.
    pub const SESSION: &str = "/api/auth/user";
    /// Credential login.
    pub const LOGIN: &str = "/api/auth/login";
    /// Logout.
    pub const LOGOUT: &str = "/api/auth/logout";
    /// Send registration OTP.
    pub const REGISTER: &str = "/api/auth/register";
    /// Resend registration OTP.
    pub const RESEND_OTP: &str = "/api/auth/resend_otp";
    /// Verify registration OTP.
    pub const VERIFY_OTP: &str = "/api/auth/verify_otp";
    /// Send password-reset OTP.
    pub const FORGOT_PASSWORD: &str = "/api/auth/forgot_password";
    /// Verify password-reset OTP.
    pub const VERIFY_RESET_OTP: &str = "/api/auth/verify_reset_otp";
    /// Set the new password.
    pub const RESET_PASSWORD: &str = "/api/auth/reset_password";
    /// Daily booking count for the current guest.
    pub const CHECK_MAX_BOOKINGS: &str = "/booking/check-max-bookings/";
    /// Yes/no eligibility verdict for the current guest.
    pub const CAN_BOOK_TODAY: &str = "/booking/check-can-book-today/";
    /// Booking submission (multipart).
    pub const BOOKINGS: &str = "/booking/bookings";
}

/// Number of positions in an OTP code.
pub const OTP_LENGTH: usize = 6;

/// Seconds before an OTP may be re-sent.
pub const DEFAULT_RESEND_COOLDOWN_SECS: i64 = 120;

/// Bookings a guest may make per calendar day.
pub const MAX_DAILY_BOOKINGS: u32 = 3;

/// Seconds a persisted draft stays resumable.
pub const DEFAULT_PENDING_DRAFT_TTL_SECS: i64 = 30 * 60;

/// Consumed draft ids remembered by the gate.
pub const CONSUMED_DRAFT_HISTORY: usize = 32;

/// Arrival time sent when the guest leaves it blank.
pub const DEFAULT_ARRIVAL_TIME: &str = "12:00";

/// Local OTP validation message.
pub const OTP_INCOMPLETE_MESSAGE: &str = "Please enter a valid 6-digit OTP";

/// Message shown when the daily limit is reached and the server gave none.
#[must_use]
pub fn limit_reached_message(max_limit: u32) -> String {
    format!(
        "You have reached the maximum limit of {max_limit} bookings per day. Please try again tomorrow."
    )
}
