//! Session management for the Ryde backend
//!
//! Token persistence, the refresh wire call, and session lifecycle
//! notifications. This crate is a standalone library with no dependency
//! on the HTTP client facade; it can be tested and used independently.
//!
//! Session flow:
//! 1. A login flow stores tokens via `SessionStore::set_tokens()`
//! 2. Request paths read `SessionStore::access_token()` per request
//! 3. On expiry, `token::refresh_session()` exchanges the refresh token
//! 4. Rotated tokens land back via `SessionStore::rotate_tokens()`
//! 5. Terminal rejections clear the store and fire `AuthEvent::Unauthorized`

pub mod error;
pub mod events;
pub mod session;
pub mod token;

pub use error::{Error, Result};
pub use events::{AuthEvent, AuthEvents};
pub use session::{SessionStore, SessionTier};
pub use token::{TokenPair, refresh_session};
