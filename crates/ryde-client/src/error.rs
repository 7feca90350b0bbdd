//! Error types for the request pipeline
//!
//! Display strings here are part of the caller contract: UIs match on
//! `"Session expired. Please login again."` and on the
//! `"<message> (Status: <code>)"` shape for application errors.

/// Errors surfaced by the request pipeline and the typed APIs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-2xx application response.
    #[error("{message} (Status: {status})")]
    Api { status: u16, message: String },

    /// Backend failure surfaced by its message alone (XML error pages,
    /// `success:false` envelopes on a 2xx).
    #[error("{0}")]
    Server(String),

    #[error("invalid response format from server")]
    InvalidResponse,

    #[error("Session expired. Please login again.")]
    SessionExpired,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("request serialization failed: {0}")]
    Serialize(String),

    #[error("decoding response payload: {0}")]
    Decode(String),

    #[error("session storage failed: {0}")]
    Storage(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error ended the session (route the user to login).
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired)
    }

    /// HTTP status carried by an application error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
