//! Date-then-details room confirmation flow.
//!
//! ```text
//! SelectingDates ──dates──▶ EnteringDetails ──details──▶ Reviewing ──confirm──▶ HandedOff
//!       ▲                        │    ▲                      │
//!       └────── change dates ────┘    └──────── back ────────┘
//! ```
//!
//! `HandedOff` is terminal: the flow produced a [`BookingDraft`] and the
//! caller passes it to the gate.

use crate::draft::{
    Amount, BookingDraft, BookingRequest, ContactDetails, DraftId, IdentityDocument, RoomBookingRequest, RoomId,
};
use crate::error::{FlowError, FormField, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Number of nights billed for a stay; never less than one.
#[must_use]
pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    (check_out - check_in).num_days().max(1)
}

/// Priced stay dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayQuote {
    /// First night
    pub check_in: NaiveDate,
    /// Departure day
    pub check_out: NaiveDate,
    /// Nights billed
    pub nights: i64,
    /// Nightly rate × nights
    pub total: Amount,
}

/// Guest-entered booking details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestDetails {
    /// Contact fields
    pub contact: ContactDetails,
    /// Number of guests
    pub number_of_guests: u32,
    /// Expected arrival time
    pub arrival_time: Option<NaiveTime>,
    /// Identity document
    pub identity_document: IdentityDocument,
}

/// Current step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfirmationStep {
    /// Choosing check-in and check-out.
    #[default]
    SelectingDates,
    /// Dates fixed; filling in guest details.
    EnteringDetails {
        /// The priced stay
        quote: StayQuote,
    },
    /// Reviewing the complete request.
    Reviewing {
        /// The validated request
        request: Box<BookingRequest>,
    },
    /// The draft was handed to the gate.
    HandedOff {
        /// Draft produced
        draft_id: DraftId,
    },
}

/// Confirmation flow for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationFlow {
    room_id: RoomId,
    nightly_rate: Amount,
    step: ConfirmationStep,
}

fn wrong_step() -> FlowError {
    FlowError::general("This step is not available right now.")
}

impl ConfirmationFlow {
    /// Start a flow for `room_id` at `nightly_rate`.
    #[must_use]
    pub const fn new(room_id: RoomId, nightly_rate: Amount) -> Self {
        Self {
            room_id,
            nightly_rate,
            step: ConfirmationStep::SelectingDates,
        }
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> &ConfirmationStep {
        &self.step
    }

    /// Fix the stay dates and price them.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either date is missing or check-out is
    /// not after check-in; the step is unchanged.
    pub fn select_dates(&mut self, check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) -> Result<StayQuote> {
        if !matches!(self.step, ConfirmationStep::SelectingDates) {
            return Err(wrong_step());
        }
        let (Some(check_in), Some(check_out)) = (check_in, check_out) else {
            return Err(FlowError::validation(FormField::Dates, "Please select both dates."));
        };
        if check_out <= check_in {
            return Err(FlowError::validation(
                FormField::Dates,
                "Check-out date must be after check-in date.",
            ));
        }
        let nights = nights_between(check_in, check_out);
        let quote = StayQuote {
            check_in,
            check_out,
            nights,
            total: self.nightly_rate.times(nights),
        };
        self.step = ConfirmationStep::EnteringDetails { quote };
        Ok(quote)
    }

    /// Go back to date selection.
    ///
    /// # Errors
    ///
    /// Rejected once the draft has been handed off.
    pub fn change_dates(&mut self) -> Result<()> {
        if matches!(self.step, ConfirmationStep::HandedOff { .. }) {
            return Err(wrong_step());
        }
        self.step = ConfirmationStep::SelectingDates;
        Ok(())
    }

    /// Submit guest details for review.
    ///
    /// # Errors
    ///
    /// Returns the first local validation error; the step is unchanged.
    pub fn enter_details(&mut self, details: GuestDetails) -> Result<()> {
        let ConfirmationStep::EnteringDetails { quote } = self.step else {
            return Err(wrong_step());
        };
        let request = BookingRequest::Room(RoomBookingRequest {
            room_id: self.room_id,
            check_in: quote.check_in,
            check_out: quote.check_out,
            arrival_time: details.arrival_time,
            number_of_guests: details.number_of_guests,
            contact: details.contact,
            identity_document: details.identity_document,
            total_price: quote.total,
        });
        request.validate()?;
        self.step = ConfirmationStep::Reviewing {
            request: Box::new(request),
        };
        Ok(())
    }

    /// Leave the review and edit details again.
    ///
    /// # Errors
    ///
    /// Rejected outside `Reviewing`.
    pub fn back_to_details(&mut self) -> Result<()> {
        let ConfirmationStep::Reviewing { request } = &self.step else {
            return Err(wrong_step());
        };
        let BookingRequest::Room(room) = request.as_ref() else {
            return Err(wrong_step());
        };
        let quote = StayQuote {
            check_in: room.check_in,
            check_out: room.check_out,
            nights: nights_between(room.check_in, room.check_out),
            total: room.total_price,
        };
        self.step = ConfirmationStep::EnteringDetails { quote };
        Ok(())
    }

    /// Confirm the review and produce the draft.
    ///
    /// # Errors
    ///
    /// Rejected outside `Reviewing`.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<BookingDraft> {
        let ConfirmationStep::Reviewing { request } = &self.step else {
            return Err(wrong_step());
        };
        let draft = BookingDraft::new(request.as_ref().clone(), now)?;
        self.step = ConfirmationStep::HandedOff { draft_id: draft.id() };
        Ok(draft)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::draft::fixtures::{contact, document};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn details() -> GuestDetails {
        GuestDetails {
            contact: contact(),
            number_of_guests: 2,
            arrival_time: None,
            identity_document: document(),
        }
    }

    #[test]
    fn test_full_flow_produces_priced_draft() {
        let mut flow = ConfirmationFlow::new(RoomId(12), Amount::from_major(2500));

        let quote = flow.select_dates(Some(date(1)), Some(date(3))).unwrap();
        assert_eq!(quote.nights, 2);
        assert_eq!(quote.total, Amount::from_major(5000));

        flow.enter_details(details()).unwrap();
        let draft = flow.confirm(Utc::now()).unwrap();
        assert_eq!(draft.request().total_price(), Amount::from_major(5000));
        assert_eq!(flow.step(), &ConfirmationStep::HandedOff { draft_id: draft.id() });
    }

    #[test]
    fn test_dates_required_and_ordered() {
        let mut flow = ConfirmationFlow::new(RoomId(12), Amount::from_major(2500));
        let error = flow.select_dates(Some(date(1)), None).unwrap_err();
        assert_eq!(error.message_for(FormField::Dates), Some("Please select both dates."));

        assert!(flow.select_dates(Some(date(3)), Some(date(3))).is_err());
        assert_eq!(flow.step(), &ConfirmationStep::SelectingDates);
    }

    #[test]
    fn test_cannot_confirm_before_review() {
        let mut flow = ConfirmationFlow::new(RoomId(12), Amount::from_major(2500));
        assert!(flow.confirm(Utc::now()).is_err());
        flow.select_dates(Some(date(1)), Some(date(2))).unwrap();
        assert!(flow.confirm(Utc::now()).is_err());
    }

    #[test]
    fn test_back_and_change_dates() {
        let mut flow = ConfirmationFlow::new(RoomId(12), Amount::from_major(1000));
        flow.select_dates(Some(date(1)), Some(date(4))).unwrap();
        flow.enter_details(details()).unwrap();
        flow.back_to_details().unwrap();
        assert!(matches!(flow.step(), ConfirmationStep::EnteringDetails { quote } if quote.nights == 3));
        flow.change_dates().unwrap();
        assert_eq!(flow.step(), &ConfirmationStep::SelectingDates);
    }

    #[test]
    fn test_minimum_one_night() {
        assert_eq!(nights_between(date(5), date(5)), 1);
        assert_eq!(nights_between(date(1), date(8)), 7);
    }
}
