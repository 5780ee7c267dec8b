use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{FailureReason, GatewayKind, MicroUsd};

/// Whether the gateway considers the payment settled.
///
/// Terminal failures are not a settlement status. They are reported through [`GatewayError::PaymentFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Paid,
    Pending,
}

/// The gateway's own, server-verified view of a payment, normalised across gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGroundTruth {
    pub status: SettlementStatus,
    /// The settled amount in minor units of `currency` (e.g. kobo, cents)
    pub amount: i64,
    /// ISO currency code, upper case
    pub currency: String,
    pub reference: String,
    /// The owner token embedded in the payment metadata when the deposit was initiated, if the gateway echoed it back
    pub owner_hint: Option<String>,
    /// The billing email the gateway holds for the payer
    pub customer_email: Option<String>,
    /// The gateway's response body, kept for the audit trail
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub reference: String,
    pub owner_id: String,
    pub email: Option<String>,
    /// Amount in minor units of `currency`
    pub amount: i64,
    pub currency: String,
    /// Where the gateway sends the customer once the checkout is done
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub reference: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network error, timeout or 5xx from the gateway. Retry later; this says nothing about the payment itself.
    #[error("The payment gateway is unavailable: {0}")]
    GatewayUnavailable(String),
    /// The gateway does not (yet) know this reference. Treat as not yet processed.
    #[error("The gateway does not recognise reference {0}")]
    ReferenceNotFound(String),
    #[error("Payment {reference} failed at the gateway: {reason}")]
    PaymentFailed { reference: String, reason: FailureReason },
    /// The gateway answered, but with something that does not match its documented schema.
    #[error("The gateway returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("The gateway rejected the request: {0}")]
    Rejected(String),
    #[error("The gateway is not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::GatewayUnavailable(_) | GatewayError::ReferenceNotFound(_))
    }
}

/// The contract every payment-processor adapter satisfies.
///
/// Adapters differ in their wire formats and signature schemes, but the reconciliation logic only ever sees this
/// interface. Implementations must never derive payment status or amount from a webhook body: the only source of
/// truth is [`PaymentGateway::fetch_ground_truth`].
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    fn kind(&self) -> GatewayKind;

    /// The name of the HTTP header that carries the webhook signature for this gateway.
    fn signature_header(&self) -> &'static str;

    /// Recomputes the expected signature over the raw webhook payload and compares it with the header value.
    ///
    /// Must return `false` when the signing secret is not configured, or when the signature is missing.
    fn verify_webhook_authenticity(&self, raw_payload: &[u8], signature: Option<&str>) -> bool;

    /// Extracts the payment reference from an (already authenticated) webhook body. Only the reference is trusted
    /// from the body; everything else comes from [`PaymentGateway::fetch_ground_truth`].
    fn extract_reference(&self, raw_payload: &[u8]) -> Result<String, GatewayError>;

    /// Asks the gateway, server to server, for the authoritative state of the payment.
    async fn fetch_ground_truth(&self, reference: &str) -> Result<PaymentGroundTruth, GatewayError>;

    /// Opens a hosted checkout for a new deposit. The owner id is embedded in the gateway metadata so that the
    /// payment can be attributed even if the pending transaction is missing when the webhook arrives.
    async fn initialize_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;

    /// The smallest deposit this gateway accepts, in the ledger currency. Defaults to $1.00
    fn minimum_deposit(&self) -> MicroUsd {
        MicroUsd::from_usd(1)
    }
}
