//! Typed client for the Ryde fleet API.
//!
//! Every request runs through the same pipeline:
//!
//! 1. Callers use the [`RydeClient`] verbs or the typed endpoint APIs.
//! 2. The request is built from a [`RequestPlan`] carrying the current
//!    access token from the shared session store.
//! 3. A 401 from a non-public endpoint triggers exactly one coordinated
//!    refresh per expiry, then the plan is replayed once.
//! 4. The response is normalized into the shared [`Envelope`] shape, XML
//!    error pages and un-enveloped bodies included, before decoding.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ryde_client::{RydeClient, SessionStore, VehicleFilters};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SessionStore::load("ryde-session.json".into()).await?;
//! let client = RydeClient::builder()
//!     .base_url("https://api.ryde.example")
//!     .session_store(Arc::new(store))
//!     .build()?;
//!
//! // Sign in once; tokens persist across restarts
//! let login = ryde_client::LoginRequest {
//!     email: "host@ryde.example".into(),
//!     password: "hunter2".into(),
//! };
//! client.auth().login(&login, true).await?;
//!
//! // Expired access tokens refresh transparently from here on
//! let page = client.vehicles().list(&VehicleFilters::default()).await?;
//! println!("{} vehicles", page.pagination.total);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod keepalive;
mod metrics;
pub mod refresh;
pub mod request;
pub mod response;

pub use client::{ClientBuilder, RydeClient};
pub use error::{Error, Result};
pub use keepalive::{DEFAULT_KEEPALIVE_INTERVAL, spawn_keepalive_task};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use request::{RequestBody, RequestPlan, UploadPayload};
pub use response::normalize;

// Endpoint API types callers hold on to
pub use api::{
    AuthApi, AuthPayload, Booking, BookingFilters, BookingsApi, LoginRequest, PayoutRequest,
    SignupOutcome, SignupRequest, Transaction, TransactionFilters, TransactionsApi, UploadedImage,
    Vehicle, VehicleFilters, VehicleRequest, VehiclesApi,
};

// Session layer types that appear in this crate's public signatures
pub use common::{Envelope, Paginated, Pagination, UserProfile};
pub use ryde_auth::{AuthEvent, SessionStore, SessionTier};
