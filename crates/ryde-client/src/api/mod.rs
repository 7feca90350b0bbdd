//! API endpoint implementations.

mod auth;
mod bookings;
mod transactions;
mod vehicles;

pub use auth::{AuthApi, AuthPayload, LoginRequest, SignupOutcome, SignupRequest};
pub use bookings::{Booking, BookingFilters, BookingsApi};
pub use transactions::{PayoutRequest, Transaction, TransactionFilters, TransactionsApi};
pub use vehicles::{UploadedImage, Vehicle, VehicleFilters, VehicleRequest, VehiclesApi};

use serde::de::DeserializeOwned;

use common::Envelope;

use crate::error::{Error, Result};

/// Pull a typed payload out of a success envelope.
///
/// A 2xx body carrying `success: false` is an application-level rejection
/// even though the transport succeeded. List endpoints decode through the
/// same path: their `data` holds a `{ data, pagination }` page object that
/// deserializes as [`common::Paginated`].
pub(crate) fn decode_data<T: DeserializeOwned>(envelope: Envelope) -> Result<T> {
    if !envelope.success {
        return Err(Error::Server(
            envelope
                .message
                .unwrap_or_else(|| String::from("request failed")),
        ));
    }
    envelope.decode().map_err(|e| Error::Decode(format!("{e}")))
}
