//! Daily booking limit.
//!
//! [`BookingLimitGuard::check`] never fails: a query that cannot be completed
//! reports `can_book = true` and sets `fail_open`, leaving the server as the
//! final authority.

use crate::constants::limit_reached_message;
use crate::error::FlowError;
use crate::providers::{BookingApi, LimitReport};
use crate::state::Identity;
use metrics::counter;
use serde::{Deserialize, Serialize};

/// Outcome of a limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheck {
    /// Whether another booking is allowed
    pub can_book: bool,
    /// Bookings made today (0 when unknown)
    pub current_count: u32,
    /// Daily maximum
    pub max_limit: u32,
    /// Human-readable reason when blocked
    pub reason: Option<String>,
    /// The query failed and the check defaulted to allowed
    pub fail_open: bool,
}

impl LimitCheck {
    /// Result derived from a known count.
    #[must_use]
    pub fn counted(current_count: u32, max_limit: u32) -> Self {
        let can_book = current_count < max_limit;
        Self {
            can_book,
            current_count,
            max_limit,
            reason: (!can_book).then(|| limit_reached_message(max_limit)),
            fail_open: false,
        }
    }

    /// Allowed because the query could not be completed.
    #[must_use]
    pub const fn fail_open(max_limit: u32) -> Self {
        Self {
            can_book: true,
            current_count: 0,
            max_limit,
            reason: None,
            fail_open: true,
        }
    }

    /// Interpret a server reply against the local maximum.
    #[must_use]
    pub fn from_report(report: LimitReport, default_max: u32) -> Self {
        match report {
            LimitReport::Count {
                booking_count,
                can_book,
                max_limit,
            } => {
                let max_limit = max_limit.unwrap_or(default_max);
                let mut check = Self::counted(booking_count, max_limit);
                if can_book == Some(false) && check.can_book {
                    check.can_book = false;
                    check.reason = Some(limit_reached_message(max_limit));
                }
                check
            },
            LimitReport::Verdict { can_book, message } => Self {
                can_book,
                current_count: if can_book { 0 } else { default_max },
                max_limit: default_max,
                reason: if can_book {
                    None
                } else {
                    Some(message.unwrap_or_else(|| limit_reached_message(default_max)))
                },
                fail_open: false,
            },
        }
    }

    /// The policy error to show when blocked.
    #[must_use]
    pub fn to_error(&self) -> Option<FlowError> {
        (!self.can_book).then(|| FlowError::BookingLimitReached {
            current_count: self.current_count,
            max_limit: self.max_limit,
            message: self
                .reason
                .clone()
                .unwrap_or_else(|| limit_reached_message(self.max_limit)),
        })
    }
}

/// Queries the daily booking quota for the current identity.
#[derive(Debug, Clone)]
pub struct BookingLimitGuard<B> {
    api: B,
    max_limit: u32,
}

impl<B: BookingApi> BookingLimitGuard<B> {
    /// Guard with the given daily maximum.
    #[must_use]
    pub const fn new(api: B, max_limit: u32) -> Self {
        Self { api, max_limit }
    }

    /// Check whether `identity` may book again today.
    ///
    /// Without an identity nothing is counted and booking is allowed.
    pub async fn check(&self, identity: Option<&Identity>) -> LimitCheck {
        let Some(identity) = identity else {
            return LimitCheck::counted(0, self.max_limit);
        };

        match self.api.booking_count_today().await {
            Ok(report) => {
                let check = LimitCheck::from_report(report, self.max_limit);
                if !check.can_book {
                    counter!("booking.limit.blocked").increment(1);
                    tracing::info!(
                        user_id = %identity.id,
                        current_count = check.current_count,
                        max_limit = check.max_limit,
                        "Daily booking limit reached"
                    );
                }
                check
            },
            Err(error) => {
                counter!("booking.limit.fail_open").increment(1);
                tracing::warn!(user_id = %identity.id, %error, "Limit check failed, allowing booking");
                LimitCheck::fail_open(self.max_limit)
            },
        }
    }
}
