//! Bookings API.

use serde::Deserialize;
use serde_json::{Value, json};

use common::Paginated;

use crate::client::RydeClient;
use crate::error::Result;

use super::decode_data;

/// A rental booking against one of the host's vehicles.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub vehicle_id: i64,
    #[serde(default)]
    pub vehicle_name: Option<String>,
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub total_price: f64,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Filters for listing bookings.
#[derive(Debug, Clone, Default)]
pub struct BookingFilters {
    pub status: Option<String>,
    pub vehicle_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl BookingFilters {
    fn to_params(&self) -> Value {
        json!({
            "status": self.status,
            "vehicleId": self.vehicle_id,
            "startDate": self.start_date,
            "endDate": self.end_date,
            "page": self.page,
            "limit": self.limit,
        })
    }
}

/// Bookings API client.
pub struct BookingsApi {
    client: RydeClient,
}

impl BookingsApi {
    pub(crate) fn new(client: RydeClient) -> Self {
        Self { client }
    }

    /// List bookings, one page at a time.
    pub async fn list(&self, filters: &BookingFilters) -> Result<Paginated<Booking>> {
        let envelope = self
            .client
            .get("/bookings", Some(&filters.to_params()))
            .await?;
        decode_data(envelope)
    }

    /// Get one booking by id.
    pub async fn get(&self, id: i64) -> Result<Booking> {
        let envelope = self.client.get(&format!("/bookings/{id}"), None).await?;
        decode_data(envelope)
    }

    /// Move a booking to a new status, e.g. confirm or cancel it.
    pub async fn update_status(&self, id: i64, status: &str) -> Result<Booking> {
        let envelope = self
            .client
            .patch(&format!("/bookings/{id}/status"), json!({ "status": status }))
            .await?;
        decode_data(envelope)
    }
}
