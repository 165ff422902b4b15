//! Booking endpoints of the hotel server.

use crate::draft::BookingDraft;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned booking id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub i64);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reply to a booking submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReceipt {
    /// The new booking
    pub id: BookingId,
}

/// Reply to a daily-limit query.
///
/// The server answers in one of two shapes depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitReport {
    /// `{booking_count, can_book?, max_limit?}`
    Count {
        /// Bookings made today
        booking_count: u32,
        /// Server verdict, if given
        #[serde(default)]
        can_book: Option<bool>,
        /// Server maximum, if given
        #[serde(default)]
        max_limit: Option<u32>,
    },
    /// `{canBook, message?}`
    Verdict {
        /// Whether another booking is allowed
        #[serde(rename = "canBook", alias = "can_book")]
        can_book: bool,
        /// Reason when not allowed
        #[serde(default)]
        message: Option<String>,
    },
}

/// Booking API.
pub trait BookingApi: Send + Sync {
    /// How many bookings the signed-in guest made today.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn booking_count_today(&self) -> impl std::future::Future<Output = Result<LimitReport>> + Send;

    /// Submit a booking. Performs exactly one request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FlowError::Field`] for a validation error map,
    /// [`crate::FlowError::General`] otherwise.
    fn submit_booking(&self, draft: &BookingDraft) -> impl std::future::Future<Output = Result<BookingReceipt>> + Send;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_report_shapes() {
        let count: LimitReport =
            serde_json::from_str(r#"{"booking_count": 2, "can_book": true, "max_limit": 3}"#).unwrap();
        assert_eq!(
            count,
            LimitReport::Count {
                booking_count: 2,
                can_book: Some(true),
                max_limit: Some(3)
            }
        );

        let verdict: LimitReport = serde_json::from_str(r#"{"canBook": false, "message": "Limit reached"}"#).unwrap();
        assert_eq!(
            verdict,
            LimitReport::Verdict {
                can_book: false,
                message: Some("Limit reached".into())
            }
        );
    }
}
