//! Vehicles API.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use common::Paginated;

use crate::client::RydeClient;
use crate::error::{Error, Result};
use crate::request::UploadPayload;

use super::decode_data;

/// A vehicle in the host's fleet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: i64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub fuel: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    #[serde(default)]
    pub seats: Option<u32>,
    #[serde(default)]
    pub price_per_day: Option<f64>,
    #[serde(default)]
    pub earnings: Option<f64>,
    #[serde(default)]
    pub trips: Option<u32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Fields for creating or updating a vehicle.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_day: Option<f64>,
}

/// Filters for listing vehicles.
#[derive(Debug, Clone, Default)]
pub struct VehicleFilters {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl VehicleFilters {
    fn to_params(&self) -> Value {
        json!({
            "status": self.status,
            "page": self.page,
            "limit": self.limit,
        })
    }
}

/// A stored vehicle image.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedImage {
    pub url: String,
}

/// Vehicles API client.
pub struct VehiclesApi {
    client: RydeClient,
}

impl VehiclesApi {
    pub(crate) fn new(client: RydeClient) -> Self {
        Self { client }
    }

    /// List vehicles, one page at a time.
    pub async fn list(&self, filters: &VehicleFilters) -> Result<Paginated<Vehicle>> {
        let envelope = self
            .client
            .get("/vehicles", Some(&filters.to_params()))
            .await?;
        decode_data(envelope)
    }

    /// Get one vehicle by id.
    pub async fn get(&self, id: i64) -> Result<Vehicle> {
        let envelope = self.client.get(&format!("/vehicles/{id}"), None).await?;
        decode_data(envelope)
    }

    /// Add a vehicle to the fleet.
    pub async fn create(&self, request: &VehicleRequest) -> Result<Vehicle> {
        let body =
            serde_json::to_value(request).map_err(|e| Error::Serialize(format!("{e}")))?;
        let envelope = self.client.post("/vehicles", body).await?;
        decode_data(envelope)
    }

    /// Update a vehicle.
    pub async fn update(&self, id: i64, request: &VehicleRequest) -> Result<Vehicle> {
        let body =
            serde_json::to_value(request).map_err(|e| Error::Serialize(format!("{e}")))?;
        let envelope = self.client.put(&format!("/vehicles/{id}"), body).await?;
        decode_data(envelope)
    }

    /// Remove a vehicle from the fleet.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.client
            .delete(&format!("/vehicles/{id}"))
            .await
            .map(|_| ())
    }

    /// Upload an image for a vehicle.
    pub async fn upload_image(
        &self,
        vehicle_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedImage> {
        let payload = UploadPayload::new(file_name, bytes).field("vehicleId", vehicle_id);
        let envelope = self
            .client
            .upload_file("/vehicles/upload-image", payload)
            .await?;
        decode_data(envelope)
    }
}
