//! Booking workflow providers.
//!
//! Traits for everything the workflow talks to outside its own state: the
//! hotel server, durable key/value storage, and page navigation. Reducers
//! only see these traits; production implementations live in [`http`] and
//! [`file_storage`], in-memory ones in `crate::mocks`.
//!
//! ```text
//! ┌──────────────────┐   effects    ┌──────────────────┐
//! │ BookingFlow      │─────────────▶│ AuthApi          │──▶ /api/auth/*
//! │ Reducer          │              │ BookingApi       │──▶ /booking/*
//! │                  │              │ DurableStorage   │──▶ JSON file
//! │                  │              │ Navigator        │──▶ host router
//! └──────────────────┘              └──────────────────┘
//! ```

pub mod auth_api;
pub mod booking_api;
pub mod file_storage;
pub mod http;
pub mod navigator;
pub mod storage;

pub use auth_api::{AuthApi, Credentials, SessionTokens, VerifiedRegistration};
pub use booking_api::{BookingApi, BookingId, BookingReceipt, LimitReport};
pub use file_storage::FileStorage;
pub use http::HttpHotelApi;
pub use navigator::Navigator;
pub use storage::{DurableStorage, persist_tokens, remove_tokens};
