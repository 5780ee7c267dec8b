//! Card payments, through a gateway that speaks the Paystack transaction API.
//!
//! * Checkouts: `POST /transaction/initialize`
//! * Ground truth: `GET /transaction/verify/{reference}`
//! * Webhooks carry a hex HMAC-SHA512 of the raw body, keyed with the secret key, in `x-paystack-signature`.
use std::time::Duration;

use log::*;
use reqwest::{header::HeaderMap, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smsr_engine::{
    db_types::{FailureReason, GatewayKind},
    traits::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentGroundTruth, SettlementStatus},
};

use crate::{
    config::CardGatewayConfig,
    helpers::{owner_from_metadata, OWNER_METADATA_KEY},
    rest::{secret_header, RestClient},
    signatures::{SignatureScheme, VerificationStrategy},
    ClientError,
};

pub const CARD_SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardCustomer {
    pub email: Option<String>,
}

/// The subset of the gateway's transaction object that reconciliation relies on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardTransaction {
    pub reference: String,
    pub status: String,
    /// Minor units (kobo, cents)
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: Value,
    pub customer: Option<CardCustomer>,
    pub gateway_response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CheckoutData {
    authorization_url: String,
    reference: String,
}

#[derive(Debug, Clone, Serialize)]
struct InitializeBody<'a> {
    email: String,
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: Value,
}

#[derive(Clone)]
pub struct CardGateway {
    config: CardGatewayConfig,
    rest: RestClient,
    strategy: VerificationStrategy,
}

impl CardGateway {
    pub fn new(
        config: CardGatewayConfig,
        strategy: VerificationStrategy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Authorization", secret_header("Bearer ", &config.secret_key)?);
        let rest = RestClient::new(&config.api_url, headers, timeout)?;
        Ok(Self { config, rest, strategy })
    }

    pub async fn fetch_transaction(&self, reference: &str) -> Result<CardTransaction, GatewayError> {
        debug!("🏦️ Verifying card payment {reference}");
        let path = format!("/transaction/verify/{}", urlencoding::encode(reference));
        let envelope = self
            .rest
            .rest_query::<Envelope<CardTransaction>, ()>(Method::GET, &path, &[], None)
            .await
            .map_err(|e| not_found_or(e, reference))?;
        match envelope.data {
            Some(tx) if envelope.status => Ok(tx),
            _ => Err(GatewayError::InvalidResponse(envelope.message)),
        }
    }
}

fn not_found_or(e: ClientError, reference: &str) -> GatewayError {
    if e.is_not_found() {
        GatewayError::ReferenceNotFound(reference.to_string())
    } else {
        e.into()
    }
}

/// Maps a card transaction onto the gateway-neutral view. Abandoned checkouts can still be completed, so they count as
/// pending; the deposit poller expires them eventually.
pub fn card_ground_truth(tx: CardTransaction) -> Result<PaymentGroundTruth, GatewayError> {
    let status = match tx.status.as_str() {
        "success" => SettlementStatus::Paid,
        "pending" | "ongoing" | "processing" | "queued" | "abandoned" => SettlementStatus::Pending,
        "failed" | "reversed" => {
            return Err(GatewayError::PaymentFailed { reference: tx.reference, reason: FailureReason::Failed })
        },
        other => return Err(GatewayError::InvalidResponse(format!("Unknown card transaction status '{other}'"))),
    };
    let raw = serde_json::to_value(&tx).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    Ok(PaymentGroundTruth {
        status,
        amount: tx.amount,
        currency: tx.currency.to_ascii_uppercase(),
        owner_hint: owner_from_metadata(&tx.metadata),
        customer_email: tx.customer.and_then(|c| c.email),
        reference: tx.reference,
        raw,
    })
}

impl PaymentGateway for CardGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Card
    }

    fn signature_header(&self) -> &'static str {
        CARD_SIGNATURE_HEADER
    }

    fn verify_webhook_authenticity(&self, raw_payload: &[u8], signature: Option<&str>) -> bool {
        self.strategy.verify(SignatureScheme::HmacSha512Hex, &self.config.secret_key, raw_payload, signature)
    }

    fn extract_reference(&self, raw_payload: &[u8]) -> Result<String, GatewayError> {
        let body: Value =
            serde_json::from_slice(raw_payload).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        body["data"]["reference"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse("Card webhook has no data.reference".to_string()))
    }

    async fn fetch_ground_truth(&self, reference: &str) -> Result<PaymentGroundTruth, GatewayError> {
        let tx = self.fetch_transaction(reference).await?;
        if tx.reference != reference {
            return Err(GatewayError::InvalidResponse(format!(
                "Asked for {reference}, but the gateway answered for {}",
                tx.reference
            )));
        }
        card_ground_truth(tx)
    }

    async fn initialize_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        // The gateway insists on an email. Customers without one get a placeholder that can never match a wallet.
        let email = request.email.clone().unwrap_or_else(|| format!("{}@customers.invalid", request.owner_id));
        let body = InitializeBody {
            email,
            amount: request.amount,
            currency: &request.currency,
            reference: &request.reference,
            callback_url: request.callback_url.as_deref(),
            metadata: json!({ OWNER_METADATA_KEY: request.owner_id }),
        };
        let envelope = self
            .rest
            .rest_query::<Envelope<CheckoutData>, _>(Method::POST, "/transaction/initialize", &[], Some(body))
            .await?;
        match envelope.data {
            Some(data) if envelope.status => {
                info!("🏦️ Card checkout opened for {}", data.reference);
                Ok(CheckoutSession { reference: data.reference, checkout_url: data.authorization_url })
            },
            _ => Err(GatewayError::Rejected(envelope.message)),
        }
    }
}
