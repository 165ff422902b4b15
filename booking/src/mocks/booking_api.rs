//! Mock booking API.

use super::lock;
use crate::draft::BookingDraft;
use crate::error::{FlowError, Result};
use crate::providers::{BookingApi, BookingId, BookingReceipt, LimitReport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    booking_count: u32,
    limit_failure: Option<FlowError>,
    limit_checks: usize,
    next_booking_id: i64,
    submission_failure: Option<FlowError>,
    submission_latency: Duration,
    submissions: Vec<BookingDraft>,
}

/// Mock booking API.
///
/// Accepted submissions raise today's count, so the limit reacts the way
/// the server would.
#[derive(Debug, Clone)]
pub struct MockBookingApi {
    inner: Arc<Mutex<Inner>>,
}

impl MockBookingApi {
    /// Create a mock with zero bookings today.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                booking_count: 0,
                limit_failure: None,
                limit_checks: 0,
                next_booking_id: 1,
                submission_failure: None,
                submission_latency: Duration::ZERO,
                submissions: Vec::new(),
            })),
        }
    }

    /// Set today's booking count.
    pub fn set_booking_count(&self, count: u32) {
        lock(&self.inner).booking_count = count;
    }

    /// Make every limit query fail with `error`.
    pub fn fail_limit_check(&self, error: FlowError) {
        lock(&self.inner).limit_failure = Some(error);
    }

    /// Number of limit queries received.
    #[must_use]
    pub fn limit_checks(&self) -> usize {
        lock(&self.inner).limit_checks
    }

    /// Id the next accepted booking receives.
    pub fn set_next_booking_id(&self, id: BookingId) {
        lock(&self.inner).next_booking_id = id.0;
    }

    /// Fail the next submission with `error`.
    pub fn fail_next_submission(&self, error: FlowError) {
        lock(&self.inner).submission_failure = Some(error);
    }

    /// Delay every submission reply by `latency`.
    pub fn set_submission_latency(&self, latency: Duration) {
        lock(&self.inner).submission_latency = latency;
    }

    /// Every draft submitted, accepted or not.
    #[must_use]
    pub fn submissions(&self) -> Vec<BookingDraft> {
        lock(&self.inner).submissions.clone()
    }
}

impl Default for MockBookingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingApi for MockBookingApi {
    async fn booking_count_today(&self) -> Result<LimitReport> {
        let mut inner = lock(&self.inner);
        inner.limit_checks += 1;
        if let Some(error) = inner.limit_failure.clone() {
            return Err(error);
        }
        Ok(LimitReport::Count {
            booking_count: inner.booking_count,
            can_book: None,
            max_limit: None,
        })
    }

    async fn submit_booking(&self, draft: &BookingDraft) -> Result<BookingReceipt> {
        let latency = {
            let mut inner = lock(&self.inner);
            inner.submissions.push(draft.clone());
            inner.submission_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut inner = lock(&self.inner);
        if let Some(error) = inner.submission_failure.take() {
            return Err(error);
        }
        let id = BookingId(inner.next_booking_id);
        inner.next_booking_id += 1;
        inner.booking_count += 1;
        Ok(BookingReceipt { id })
    }
}
