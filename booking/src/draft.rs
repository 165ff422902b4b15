//! Booking drafts.
//!
//! A [`BookingDraft`] is a validated, not-yet-submitted booking request. While
//! the guest authenticates it lives in the gate's single [`DraftSlot`]; across
//! the registration reload it lives in the [`DurableDraftStore`].

use crate::constants::{DEFAULT_ARRIVAL_TIME, storage_keys};
use crate::error::{FlowError, FormField, Result};
use crate::providers::DurableStorage;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of one draft instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub uuid::Uuid);

impl DraftId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Room identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub i64);

/// Venue (area) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaId(pub i64);

/// Money in minor units (centavos).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub i64);

impl Amount {
    /// Build from whole units.
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// Multiply by a count (e.g. nights).
    #[must_use]
    pub const fn times(self, count: i64) -> Self {
        Self(self.0 * count)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Contact fields shared by both booking kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Phone number
    pub phone_number: String,
    /// Postal address (optional)
    #[serde(default)]
    pub address: String,
    /// Free-text requests (optional)
    #[serde(default)]
    pub special_requests: String,
}

/// Uploaded identity document, carried as re-attachable bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDocument {
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub content_type: String,
    /// File contents
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl fmt::Debug for IdentityDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityDocument")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Room stay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomBookingRequest {
    /// Room being booked
    pub room_id: RoomId,
    /// First night
    pub check_in: NaiveDate,
    /// Departure day
    pub check_out: NaiveDate,
    /// Expected arrival time; the server default applies when absent
    pub arrival_time: Option<NaiveTime>,
    /// Number of guests
    pub number_of_guests: u32,
    /// Guest contact details
    pub contact: ContactDetails,
    /// Identity document
    pub identity_document: IdentityDocument,
    /// Computed total
    pub total_price: Amount,
}

impl RoomBookingRequest {
    /// Arrival time as sent to the server (`HH:MM`).
    #[must_use]
    pub fn arrival_time_label(&self) -> String {
        self.arrival_time
            .map_or_else(|| DEFAULT_ARRIVAL_TIME.to_string(), |t| t.format("%H:%M").to_string())
    }
}

/// Venue reservation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueBookingRequest {
    /// Venue being reserved
    pub area_id: AreaId,
    /// Event start
    pub start: NaiveDateTime,
    /// Event end
    pub end: NaiveDateTime,
    /// Number of guests
    pub number_of_guests: u32,
    /// Guest contact details
    pub contact: ContactDetails,
    /// Identity document
    pub identity_document: IdentityDocument,
    /// Computed total
    pub total_price: Amount,
}

/// Which kind of booking a draft is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    /// Room stay
    Room,
    /// Venue reservation
    Venue,
}

impl BookingKind {
    /// Whether this is a venue booking.
    #[must_use]
    pub const fn is_venue(self) -> bool {
        matches!(self, Self::Venue)
    }
}

/// A booking request of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingRequest {
    /// Room stay
    Room(RoomBookingRequest),
    /// Venue reservation
    Venue(VenueBookingRequest),
}

impl BookingRequest {
    /// The booking kind.
    #[must_use]
    pub const fn kind(&self) -> BookingKind {
        match self {
            Self::Room(_) => BookingKind::Room,
            Self::Venue(_) => BookingKind::Venue,
        }
    }

    /// Guest contact details.
    #[must_use]
    pub const fn contact(&self) -> &ContactDetails {
        match self {
            Self::Room(r) => &r.contact,
            Self::Venue(v) => &v.contact,
        }
    }

    /// Number of guests.
    #[must_use]
    pub const fn number_of_guests(&self) -> u32 {
        match self {
            Self::Room(r) => r.number_of_guests,
            Self::Venue(v) => v.number_of_guests,
        }
    }

    /// Identity document.
    #[must_use]
    pub const fn identity_document(&self) -> &IdentityDocument {
        match self {
            Self::Room(r) => &r.identity_document,
            Self::Venue(v) => &v.identity_document,
        }
    }

    /// Computed total.
    #[must_use]
    pub const fn total_price(&self) -> Amount {
        match self {
            Self::Room(r) => r.total_price,
            Self::Venue(v) => v.total_price,
        }
    }

    /// Check the request locally.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_contact(self.contact())?;

        if self.number_of_guests() == 0 {
            return Err(FlowError::validation(FormField::Guests, "Please enter the number of guests."));
        }

        let document = self.identity_document();
        if document.bytes.is_empty() || document.file_name.trim().is_empty() {
            return Err(FlowError::validation(
                FormField::IdentityDocument,
                "Please upload a valid ID.",
            ));
        }

        if self.total_price() < Amount::default() {
            return Err(FlowError::validation(FormField::Dates, "Total price cannot be negative."));
        }

        match self {
            Self::Room(room) if room.check_out <= room.check_in => Err(FlowError::validation(
                FormField::Dates,
                "Check-out date must be after check-in date.",
            )),
            Self::Venue(venue) if venue.end <= venue.start => Err(FlowError::validation(
                FormField::Times,
                "End time must be after start time.",
            )),
            _ => Ok(()),
        }
    }
}

fn validate_contact(contact: &ContactDetails) -> Result<()> {
    if contact.first_name.trim().is_empty() {
        return Err(FlowError::validation(FormField::FirstName, "First name is required."));
    }
    if contact.last_name.trim().is_empty() {
        return Err(FlowError::validation(FormField::LastName, "Last name is required."));
    }
    if !is_valid_phone_number(&contact.phone_number) {
        return Err(FlowError::validation(
            FormField::PhoneNumber,
            "Please enter a valid phone number.",
        ));
    }
    Ok(())
}

/// Digits only after removing spaces and dashes, with an optional leading `+`.
fn is_valid_phone_number(raw: &str) -> bool {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// A validated booking request awaiting submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDraft {
    id: DraftId,
    request: BookingRequest,
    created_at: DateTime<Utc>,
}

impl BookingDraft {
    /// Validate `request` and wrap it in a fresh draft.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] if the request is invalid.
    pub fn new(request: BookingRequest, now: DateTime<Utc>) -> Result<Self> {
        request.validate()?;
        Ok(Self {
            id: DraftId::new(),
            request,
            created_at: now,
        })
    }

    /// Draft id.
    #[must_use]
    pub const fn id(&self) -> DraftId {
        self.id
    }

    /// The booking request.
    #[must_use]
    pub const fn request(&self) -> &BookingRequest {
        &self.request
    }

    /// Booking kind.
    #[must_use]
    pub const fn kind(&self) -> BookingKind {
        self.request.kind()
    }

    /// When the draft was captured.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// The single slot holding a draft that waits on authentication.
///
/// Holding a second draft replaces the first. Reading is always
/// read-and-clear: once taken, a draft cannot be taken again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DraftSlot {
    /// Nothing waiting.
    #[default]
    Empty,
    /// Draft held in memory.
    Held(Box<BookingDraft>),
    /// Draft moved to durable storage for the registration reload.
    Parked {
        /// Id of the persisted draft
        draft_id: DraftId,
    },
}

impl DraftSlot {
    /// Hold `draft`, returning the id of any draft it replaced.
    pub fn hold(&mut self, draft: BookingDraft) -> Option<DraftId> {
        let replaced = self.draft_id();
        *self = Self::Held(Box::new(draft));
        replaced
    }

    /// Take the held draft, leaving the slot empty.
    ///
    /// Returns `None` (and leaves the slot unchanged) if nothing is held in memory.
    pub fn take(&mut self) -> Option<BookingDraft> {
        match std::mem::take(self) {
            Self::Held(draft) => Some(*draft),
            other => {
                *self = other;
                None
            },
        }
    }

    /// Mark the held draft with `draft_id` as persisted.
    ///
    /// Returns `false` if the slot no longer holds that draft.
    pub fn park(&mut self, draft_id: DraftId) -> bool {
        match self {
            Self::Held(draft) if draft.id() == draft_id => {
                *self = Self::Parked { draft_id };
                true
            },
            _ => false,
        }
    }

    /// Take the parked marker, leaving the slot empty.
    pub fn take_parked(&mut self) -> Option<DraftId> {
        match self {
            Self::Parked { draft_id } => {
                let id = *draft_id;
                *self = Self::Empty;
                Some(id)
            },
            _ => None,
        }
    }

    /// Drop whatever is waiting. Returns `true` if something was dropped.
    pub fn discard(&mut self) -> bool {
        !matches!(std::mem::take(self), Self::Empty)
    }

    /// Id of the waiting draft, in memory or parked.
    #[must_use]
    pub fn draft_id(&self) -> Option<DraftId> {
        match self {
            Self::Empty => None,
            Self::Held(draft) => Some(draft.id()),
            Self::Parked { draft_id } => Some(*draft_id),
        }
    }

    /// The draft held in memory, if any.
    #[must_use]
    pub fn held(&self) -> Option<&BookingDraft> {
        match self {
            Self::Held(draft) => Some(draft),
            _ => None,
        }
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether the waiting draft lives in durable storage.
    #[must_use]
    pub const fn is_parked(&self) -> bool {
        matches!(self, Self::Parked { .. })
    }
}

/// Draft and return URL carried across the registration reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBookingRecord {
    /// The draft
    pub draft: BookingDraft,
    /// Where to reload to
    pub return_url: String,
    /// When it was persisted
    pub saved_at: DateTime<Utc>,
}

/// Shown when a pending booking was recorded but its draft cannot be used.
pub const RESTORE_FAILED_MESSAGE: &str = "Your booking details could not be restored. Please submit the form again.";

/// What [`DurableDraftStore::take`] found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoredDraft {
    /// No booking was pending.
    Nothing,
    /// The pending draft, ready to resume.
    Ready(Box<PendingBookingRecord>),
    /// A booking was pending but its draft was missing, unreadable or stale.
    Lost,
}

impl RestoredDraft {
    /// The record, if one was usable.
    #[must_use]
    pub fn into_record(self) -> Option<PendingBookingRecord> {
        match self {
            Self::Ready(record) => Some(*record),
            Self::Nothing | Self::Lost => None,
        }
    }
}

/// Reload-durable home of a draft during the registration detour.
///
/// The draft is written before the "pending booking" flag, and taken with an
/// atomic get-and-delete, so a reader that sees the flag can always find the
/// draft and two readers can never both get it.
#[derive(Debug, Clone)]
pub struct DurableDraftStore<S> {
    storage: S,
    ttl: chrono::Duration,
}

impl<S: DurableStorage> DurableDraftStore<S> {
    /// Wrap `storage`; records older than `ttl` are discarded on take.
    #[must_use]
    pub const fn new(storage: S, ttl: chrono::Duration) -> Self {
        Self { storage, ttl }
    }

    /// Persist `draft` with the URL to return to.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::General`] if the draft cannot be serialized or stored.
    pub async fn persist(&self, draft: &BookingDraft, return_url: &str, now: DateTime<Utc>) -> Result<()> {
        let record = PendingBookingRecord {
            draft: draft.clone(),
            return_url: return_url.to_string(),
            saved_at: now,
        };
        let payload = serde_json::to_string(&record).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialize pending draft");
            FlowError::general("Unable to save your booking details.")
        })?;

        self.storage.set(storage_keys::PENDING_DRAFT, payload).await?;
        self.storage
            .set(storage_keys::RETURN_URL, return_url.to_string())
            .await?;
        self.storage
            .set(storage_keys::PENDING_BOOKING, "true".to_string())
            .await?;

        tracing::debug!(draft_id = %draft.id(), "Persisted pending draft");
        Ok(())
    }

    /// Take the persisted draft, if one exists and has not expired.
    ///
    /// The flags are cleared whether or not a usable record was found. Once
    /// the flag has been read as set, every later failure yields
    /// [`RestoredDraft::Lost`] so the guest can be told.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag itself cannot be read.
    pub async fn take(&self, now: DateTime<Utc>) -> Result<RestoredDraft> {
        let flagged = self.storage.get(storage_keys::PENDING_BOOKING).await?.as_deref() == Some("true");
        let payload = self.storage.take(storage_keys::PENDING_DRAFT).await;
        if let Err(error) = self.clear_flags().await {
            tracing::warn!(%error, "Failed to clear pending booking flags");
        }

        if !flagged {
            return Ok(RestoredDraft::Nothing);
        }

        let payload = match payload {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::warn!("Pending booking flag set without a stored draft");
                return Ok(RestoredDraft::Lost);
            },
            Err(error) => {
                tracing::warn!(%error, "Failed to read pending draft");
                return Ok(RestoredDraft::Lost);
            },
        };

        let record: PendingBookingRecord = match serde_json::from_str(&payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable pending draft");
                return Ok(RestoredDraft::Lost);
            },
        };

        if now - record.saved_at > self.ttl {
            tracing::info!(draft_id = %record.draft.id(), "Discarding expired pending draft");
            return Ok(RestoredDraft::Lost);
        }

        if let Err(error) = record.draft.request().validate() {
            tracing::warn!(%error, "Discarding invalid pending draft");
            return Ok(RestoredDraft::Lost);
        }

        Ok(RestoredDraft::Ready(Box::new(record)))
    }

    /// Remove the draft and both flags.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be written.
    pub async fn clear(&self) -> Result<()> {
        self.storage.remove(storage_keys::PENDING_DRAFT).await?;
        self.clear_flags().await
    }

    async fn clear_flags(&self) -> Result<()> {
        self.storage.remove(storage_keys::PENDING_BOOKING).await?;
        self.storage.remove(storage_keys::RETURN_URL).await
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::mocks::MockStorage;

    #[test]
    fn test_slot_overwrites_not_queues() {
        let mut slot = DraftSlot::default();
        let first = room_draft(12);
        let second = room_draft(14);

        assert_eq!(slot.hold(first.clone()), None);
        assert_eq!(slot.hold(second.clone()), Some(first.id()));
        assert_eq!(slot.take(), Some(second));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_take_is_single_use() {
        let mut slot = DraftSlot::default();
        slot.hold(room_draft(12));
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_park_requires_matching_draft() {
        let mut slot = DraftSlot::default();
        let draft = room_draft(12);
        slot.hold(draft.clone());

        assert!(!slot.park(DraftId::new()));
        assert!(slot.park(draft.id()));
        assert!(slot.is_parked());
        assert!(slot.take().is_none());
        assert_eq!(slot.take_parked(), Some(draft.id()));
        assert!(slot.is_empty());
    }

    #[test]
    fn test_validation_rejects_reversed_dates() {
        let BookingRequest::Room(mut room) = room_request(12) else {
            unreachable!()
        };
        room.check_out = room.check_in;
        let error = BookingRequest::Room(room).validate().unwrap_err();
        assert_eq!(
            error.message_for(FormField::Dates),
            Some("Check-out date must be after check-in date.")
        );
    }

    #[test]
    fn test_validation_rejects_reversed_times() {
        let BookingRequest::Venue(venue) = venue_request(3) else {
            unreachable!()
        };

        for end in [venue.start, venue.start - chrono::Duration::hours(1)] {
            let request = BookingRequest::Venue(VenueBookingRequest { end, ..venue.clone() });
            let error = BookingDraft::new(request, Utc::now()).unwrap_err();
            assert_eq!(
                error.message_for(FormField::Times),
                Some("End time must be after start time.")
            );
        }
        assert_eq!(venue_draft(3).kind(), BookingKind::Venue);
    }

    #[test]
    fn test_validation_rejects_bad_phone() {
        let BookingRequest::Room(mut room) = room_request(12) else {
            unreachable!()
        };
        room.contact.phone_number = "call me".into();
        let error = BookingDraft::new(BookingRequest::Room(room), Utc::now()).unwrap_err();
        assert!(error.is_local());
        assert!(error.message_for(FormField::PhoneNumber).is_some());
    }

    #[test]
    fn test_document_round_trips_as_base64() {
        let draft = room_draft(12);
        let json = serde_json::to_string(&draft).unwrap();
        assert!(json.contains("iVBORw"));
        let back: BookingDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(back, draft);
    }

    fn store() -> (MockStorage, DurableDraftStore<MockStorage>) {
        let storage = MockStorage::new();
        let store = DurableDraftStore::new(storage.clone(), chrono::Duration::minutes(30));
        (storage, store)
    }

    #[tokio::test]
    async fn test_durable_take_without_flag_is_nothing() {
        let (storage, drafts) = store();
        storage.insert(storage_keys::PENDING_DRAFT, "leftover");

        assert_eq!(drafts.take(Utc::now()).await.unwrap(), RestoredDraft::Nothing);
        assert!(!storage.contains(storage_keys::PENDING_DRAFT));
    }

    #[tokio::test]
    async fn test_durable_take_reports_unusable_draft_as_lost() {
        let (storage, drafts) = store();
        storage.insert(storage_keys::PENDING_BOOKING, "true");
        storage.insert(storage_keys::PENDING_DRAFT, "{\"draft\":");
        assert_eq!(drafts.take(Utc::now()).await.unwrap(), RestoredDraft::Lost);
        assert!(!storage.contains(storage_keys::PENDING_BOOKING));

        storage.insert(storage_keys::PENDING_BOOKING, "true");
        assert_eq!(drafts.take(Utc::now()).await.unwrap(), RestoredDraft::Lost);
    }

    #[tokio::test]
    async fn test_durable_take_expires_old_drafts() {
        let (_storage, drafts) = store();
        let saved_at = Utc::now();
        let draft = room_draft(12);
        drafts.persist(&draft, "/rooms/12", saved_at).await.unwrap();

        let later = saved_at + chrono::Duration::minutes(31);
        assert_eq!(drafts.take(later).await.unwrap(), RestoredDraft::Lost);
    }

    #[tokio::test]
    async fn test_durable_round_trip_restores_draft() {
        let (storage, drafts) = store();
        let now = Utc::now();
        let draft = room_draft(12);
        drafts.persist(&draft, "/rooms/12", now).await.unwrap();

        let record = drafts.take(now).await.unwrap().into_record().unwrap();
        assert_eq!(record.draft, draft);
        assert_eq!(record.return_url, "/rooms/12");
        assert!(!storage.contains(storage_keys::RETURN_URL));
        assert_eq!(drafts.take(now).await.unwrap(), RestoredDraft::Nothing);
    }

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount(123_456).to_string(), "1234.56");
        assert_eq!(Amount::from_major(5).times(2).to_string(), "10.00");
    }

    #[test]
    fn test_arrival_time_defaults_to_noon() {
        let BookingRequest::Room(room) = room_request(12) else {
            unreachable!()
        };
        assert_eq!(room.arrival_time_label(), "12:00");
    }
}
