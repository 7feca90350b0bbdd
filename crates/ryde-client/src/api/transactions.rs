//! Transactions API.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use common::Paginated;

use crate::client::RydeClient;
use crate::error::{Error, Result};

use super::decode_data;

/// One ledger entry: an earning, a payout, or a refund.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Decimal amount as the backend formats it, sign included.
    pub amount: String,
    pub status: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    #[serde(default)]
    pub booking_id: Option<i64>,
}

/// Filters for listing transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilters {
    pub transaction_type: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TransactionFilters {
    fn to_params(&self) -> Value {
        json!({
            "type": self.transaction_type,
            "status": self.status,
            "page": self.page,
            "limit": self.limit,
        })
    }
}

/// Fields for requesting a payout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub amount: f64,
    pub bank_details_id: i64,
}

/// Transactions API client.
pub struct TransactionsApi {
    client: RydeClient,
}

impl TransactionsApi {
    pub(crate) fn new(client: RydeClient) -> Self {
        Self { client }
    }

    /// List transactions, one page at a time.
    pub async fn list(&self, filters: &TransactionFilters) -> Result<Paginated<Transaction>> {
        let envelope = self
            .client
            .get("/transactions", Some(&filters.to_params()))
            .await?;
        decode_data(envelope)
    }

    /// Ask for accumulated earnings to be paid out.
    pub async fn request_payout(&self, request: &PayoutRequest) -> Result<Transaction> {
        let body =
            serde_json::to_value(request).map_err(|e| Error::Serialize(format!("{e}")))?;
        let envelope = self
            .client
            .post("/transactions/request-payout", body)
            .await?;
        decode_data(envelope)
    }
}
