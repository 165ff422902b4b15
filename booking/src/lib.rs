//! # Azurea Booking
//!
//! Deferred-authentication booking workflow for the Azurea hotel client.
//!
//! A guest can fill in a room or venue booking while signed out. The gate
//! holds the draft, sends the guest through login or registration (with an
//! OTP step), and submits the draft exactly once after authentication.
//!
//! ## Architecture
//!
//! ```text
//!              BookingAction
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────┐
//! │         BookingFlowReducer          │
//! │  ┌─────────┐ ┌──────┐ ┌─────┐ ┌───┐ │
//! │  │ Session │ │ Gate │ │ OTP │ │Lim│ │
//! │  └─────────┘ └──────┘ └─────┘ └───┘ │
//! └─────────────────────────────────────┘
//!                   │ Effects
//!                   ▼
//!   AuthApi · BookingApi · DurableStorage · Navigator
//! ```
//!
//! The registration route forces a full page reload. A draft held when the
//! first registration code is sent is written to [`DurableStorage`] and taken
//! back on [`BookingAction::Boot`]; see [`draft::DurableDraftStore`].
//!
//! ## Example
//!
//! ```ignore
//! use azurea_booking::{BookingClient, BookingEnvironment, FlowConfig};
//! use azurea_booking::providers::{FileStorage, HttpHotelApi};
//!
//! let config = FlowConfig::from_env()?;
//! let api = HttpHotelApi::new(config.api.clone())?;
//! let storage = FileStorage::new(&config.storage_path);
//! let env = BookingEnvironment::new(api.clone(), api, storage, navigator, SystemClock, config);
//!
//! let client = BookingClient::new(env);
//! client.boot().await?;
//! ```

pub mod actions;
pub mod client;
pub mod config;
pub mod confirmation;
pub mod constants;
pub mod draft;
pub mod environment;
pub mod error;
pub mod limit;
pub mod otp;
pub mod providers;
pub mod reducers;
pub mod state;
pub mod submitter;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use actions::BookingAction;
pub use client::{BookingClient, DeferredOutcome, PendingBooking, PendingBookingError};
pub use config::{ApiConfig, ConfigError, FlowConfig};
pub use confirmation::{ConfirmationFlow, ConfirmationStep, GuestDetails, StayQuote};
pub use draft::{
    Amount, AreaId, BookingDraft, BookingKind, BookingRequest, ContactDetails, DraftId, DraftSlot, IdentityDocument,
    PendingBookingRecord, RestoredDraft, RoomBookingRequest, RoomId, VenueBookingRequest,
};
pub use environment::BookingEnvironment;
pub use error::{ErrorSurface, FlowError, FormField, Result};
pub use limit::{BookingLimitGuard, LimitCheck};
pub use otp::{OtpChallenge, OtpCode, OtpPhase, OtpPurpose, OtpRejection, Password, RegistrationRequest};
pub use providers::{AuthApi, BookingApi, DurableStorage, Navigator};
pub use reducers::BookingFlowReducer;
pub use state::{AuthSession, AuthSurface, FlowState, GatePhase, Identity, SubmitDecision, UserId};
pub use submitter::BookingSubmitter;
