use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{MicroUsd, ResourceStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRequest {
    /// The service the number will receive codes for, e.g. `telegram`
    pub service: String,
    /// Country slug as understood by the provider
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedNumber {
    pub upstream_id: String,
    pub phone_number: String,
    pub wholesale_cost: MicroUsd,
    /// When the provider will recycle the number, if it says so
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub sender: Option<String>,
    pub text: String,
    pub code: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamStatus {
    pub status: ResourceStatus,
    pub messages: Vec<SmsMessage>,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error, timeout or 5xx. The provisioning outcome is unknown and the call may be retried.
    #[error("The number provider is unavailable: {0}")]
    Unavailable(String),
    #[error("No numbers are available for {0}")]
    NoNumbersAvailable(String),
    #[error("The number provider rejected the request: {0}")]
    Rejected(String),
    #[error("The number provider does not know order {0}")]
    NotFound(String),
    #[error("The number provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// The upstream SMS-number provider.
#[allow(async_fn_in_trait)]
pub trait NumberProvider {
    /// The current wholesale price for a number.
    async fn quote_price(&self, request: &NumberRequest) -> Result<MicroUsd, ProviderError>;

    /// Buys a number. On success the provider has already charged our account.
    async fn request_number(&self, request: &NumberRequest) -> Result<ProvisionedNumber, ProviderError>;

    async fn check_status(&self, upstream_id: &str) -> Result<UpstreamStatus, ProviderError>;

    /// Cancels an order. Providers only allow this before any SMS has been received.
    async fn cancel(&self, upstream_id: &str) -> Result<(), ProviderError>;
}
