//! Bank transfers and USSD, through a gateway that speaks the Flutterwave v3 API.
//!
//! The gateway does not sign webhooks. Instead it echoes a secret hash, configured in its dashboard, in the
//! `verif-hash` header. Amounts are decimal numbers in major units.
use std::time::Duration;

use log::*;
use reqwest::{header::HeaderMap, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smsr_common::format_minor_units;
use smsr_engine::{
    db_types::{FailureReason, GatewayKind},
    traits::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentGroundTruth, SettlementStatus},
};

use crate::{
    config::BankGatewayConfig,
    helpers::{decimal_to_minor_units, owner_from_metadata, OWNER_METADATA_KEY},
    rest::{secret_header, RestClient},
    signatures::{SignatureScheme, VerificationStrategy},
    ClientError,
};

pub const BANK_SIGNATURE_HEADER: &str = "verif-hash";

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    status: String,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BankCustomer {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BankTransaction {
    pub id: i64,
    pub tx_ref: String,
    /// Major units, as a JSON number
    pub amount: Value,
    pub currency: String,
    pub status: String,
    pub customer: Option<BankCustomer>,
    #[serde(default)]
    pub meta: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct PaymentLink {
    link: String,
}

#[derive(Clone)]
pub struct BankGateway {
    config: BankGatewayConfig,
    rest: RestClient,
    strategy: VerificationStrategy,
}

impl BankGateway {
    pub fn new(
        config: BankGatewayConfig,
        strategy: VerificationStrategy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Authorization", secret_header("Bearer ", &config.secret_key)?);
        let rest = RestClient::new(&config.api_url, headers, timeout)?;
        Ok(Self { config, rest, strategy })
    }

    pub async fn fetch_transaction(&self, reference: &str) -> Result<BankTransaction, GatewayError> {
        debug!("🏦️ Verifying bank payment {reference}");
        let params = [("tx_ref", reference)];
        let envelope = self
            .rest
            .rest_query::<Envelope<BankTransaction>, ()>(Method::GET, "/transactions/verify_by_reference", &params, None)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    GatewayError::ReferenceNotFound(reference.to_string())
                } else {
                    e.into()
                }
            })?;
        match envelope.data {
            Some(tx) if envelope.status == "success" => Ok(tx),
            _ => Err(GatewayError::InvalidResponse(envelope.message)),
        }
    }
}

pub fn bank_ground_truth(tx: BankTransaction) -> Result<PaymentGroundTruth, GatewayError> {
    let status = match tx.status.to_ascii_lowercase().as_str() {
        "successful" => SettlementStatus::Paid,
        "pending" => SettlementStatus::Pending,
        "failed" => return Err(GatewayError::PaymentFailed { reference: tx.tx_ref, reason: FailureReason::Failed }),
        "cancelled" => {
            return Err(GatewayError::PaymentFailed { reference: tx.tx_ref, reason: FailureReason::Cancelled })
        },
        other => return Err(GatewayError::InvalidResponse(format!("Unknown bank transaction status '{other}'"))),
    };
    bank_truth_fields(tx, status)
}

fn bank_truth_fields(tx: BankTransaction, status: SettlementStatus) -> Result<PaymentGroundTruth, GatewayError> {
    let amount = decimal_to_minor_units(&tx.amount, 2).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    let raw = serde_json::to_value(&tx).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    Ok(PaymentGroundTruth {
        status,
        amount,
        currency: tx.currency.to_ascii_uppercase(),
        owner_hint: owner_from_metadata(&tx.meta),
        customer_email: tx.customer.and_then(|c| c.email),
        reference: tx.tx_ref,
        raw,
    })
}

impl PaymentGateway for BankGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Bank
    }

    fn signature_header(&self) -> &'static str {
        BANK_SIGNATURE_HEADER
    }

    fn verify_webhook_authenticity(&self, raw_payload: &[u8], signature: Option<&str>) -> bool {
        self.strategy.verify(SignatureScheme::SharedHash, &self.config.webhook_hash, raw_payload, signature)
    }

    fn extract_reference(&self, raw_payload: &[u8]) -> Result<String, GatewayError> {
        let body: Value =
            serde_json::from_slice(raw_payload).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        body["data"]["tx_ref"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse("Bank webhook has no data.tx_ref".to_string()))
    }

    async fn fetch_ground_truth(&self, reference: &str) -> Result<PaymentGroundTruth, GatewayError> {
        let tx = self.fetch_transaction(reference).await?;
        if tx.tx_ref != reference {
            return Err(GatewayError::InvalidResponse(format!(
                "Asked for {reference}, but the gateway answered for {}",
                tx.tx_ref
            )));
        }
        bank_ground_truth(tx)
    }

    async fn initialize_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let redirect_url = request.callback_url.clone().unwrap_or_else(|| self.config.default_redirect_url.clone());
        let body = json!({
            "tx_ref": request.reference,
            "amount": format_minor_units(request.amount, 2),
            "currency": request.currency,
            "redirect_url": redirect_url,
            "customer": { "email": request.email },
            "meta": { OWNER_METADATA_KEY: request.owner_id },
        });
        let envelope =
            self.rest.rest_query::<Envelope<PaymentLink>, _>(Method::POST, "/payments", &[], Some(body)).await?;
        match envelope.data {
            Some(data) if envelope.status == "success" => {
                info!("🏦️ Bank checkout opened for {}", request.reference);
                Ok(CheckoutSession { reference: request.reference.clone(), checkout_url: data.link })
            },
            _ => Err(GatewayError::Rejected(envelope.message)),
        }
    }
}
