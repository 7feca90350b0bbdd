//! Common types for the Ryde client workspace

mod secret;
mod types;

pub use secret::Secret;
pub use types::{Envelope, Paginated, Pagination, UserProfile};
