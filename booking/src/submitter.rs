//! Booking submission.

use crate::constants::routes;
use crate::draft::{BookingDraft, BookingKind};
use crate::error::Result;
use crate::providers::{BookingApi, BookingId, BookingReceipt};
use metrics::counter;

/// Sends a finalized draft to the server.
///
/// One call to [`submit`](Self::submit) is exactly one request; there is no
/// retry. Calling it at most once per draft is the caller's job.
#[derive(Debug, Clone)]
pub struct BookingSubmitter<B> {
    api: B,
}

impl<B: BookingApi> BookingSubmitter<B> {
    /// Submitter over `api`.
    #[must_use]
    pub const fn new(api: B) -> Self {
        Self { api }
    }

    /// Submit `draft`.
    ///
    /// # Errors
    ///
    /// Returns the classified server or network error.
    #[tracing::instrument(skip_all, fields(draft_id = %draft.id(), kind = ?draft.kind()))]
    pub async fn submit(&self, draft: &BookingDraft) -> Result<BookingReceipt> {
        match self.api.submit_booking(draft).await {
            Ok(receipt) => {
                counter!("booking.submissions", "outcome" => "accepted").increment(1);
                tracing::info!(booking_id = %receipt.id, "Booking accepted");
                Ok(receipt)
            },
            Err(error) => {
                counter!("booking.submissions", "outcome" => "rejected").increment(1);
                tracing::warn!(%error, "Booking rejected");
                Err(error)
            },
        }
    }
}

/// Route of the confirmation view for a new booking.
#[must_use]
pub fn confirmation_route(booking_id: BookingId, kind: BookingKind) -> String {
    format!(
        "{}?bookingId={booking_id}&isVenue={}",
        routes::BOOKING_ACCEPTED,
        kind.is_venue()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::draft::fixtures::room_draft;
    use crate::error::FlowError;
    use crate::mocks::MockBookingApi;

    #[tokio::test]
    async fn test_one_call_per_submit() {
        let api = MockBookingApi::new();
        api.set_next_booking_id(BookingId(501));
        let submitter = BookingSubmitter::new(api.clone());

        let receipt = submitter.submit(&room_draft(12)).await.unwrap();
        assert_eq!(receipt.id, BookingId(501));
        assert_eq!(api.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let api = MockBookingApi::new();
        api.fail_next_submission(FlowError::general("Server error"));
        let submitter = BookingSubmitter::new(api.clone());

        assert!(submitter.submit(&room_draft(12)).await.is_err());
        assert_eq!(api.submissions().len(), 1);
    }

    #[test]
    fn test_confirmation_route() {
        assert_eq!(
            confirmation_route(BookingId(88), BookingKind::Room),
            "/booking-accepted?bookingId=88&isVenue=false"
        );
        assert_eq!(
            confirmation_route(BookingId(9), BookingKind::Venue),
            "/booking-accepted?bookingId=9&isVenue=true"
        );
    }
}
