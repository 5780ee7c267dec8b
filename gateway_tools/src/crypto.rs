//! Crypto payments, through a hosted-invoice gateway. Invoices are priced in fiat and settled in whatever coin the
//! customer picks. The gateway reports the USD value of what actually arrived, and that is what gets credited.
//!
//! Webhooks carry a hex HMAC-SHA256 of the raw body, keyed with the API key, in the `sign` header.
use std::time::Duration;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smsr_common::format_minor_units;
use smsr_engine::{
    db_types::{FailureReason, GatewayKind, MicroUsd},
    traits::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentGroundTruth, SettlementStatus},
};

use crate::{
    config::CryptoGatewayConfig,
    helpers::{decimal_to_minor_units, owner_from_metadata, OWNER_METADATA_KEY},
    rest::{secret_header, RestClient},
    signatures::{SignatureScheme, VerificationStrategy},
    ClientError,
};

pub const CRYPTO_SIGNATURE_HEADER: &str = "sign";

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    state: i64,
    message: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CryptoInvoice {
    pub uuid: String,
    pub order_id: String,
    /// Fiat amount of the invoice, as a decimal string
    pub amount: Value,
    pub currency: String,
    /// USD value of the coins actually received. Only present once the customer has paid.
    #[serde(default)]
    pub payment_amount_usd: Option<Value>,
    pub payment_status: String,
    /// JSON-encoded string we attach when creating the invoice
    #[serde(default)]
    pub additional_data: Value,
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct CryptoGateway {
    config: CryptoGatewayConfig,
    rest: RestClient,
    strategy: VerificationStrategy,
}

impl CryptoGateway {
    pub fn new(
        config: CryptoGatewayConfig,
        strategy: VerificationStrategy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::with_capacity(2);
        let merchant =
            HeaderValue::from_str(&config.merchant_id).map_err(|e| ClientError::Initialization(e.to_string()))?;
        headers.insert("merchant", merchant);
        headers.insert("x-api-key", secret_header("", &config.api_key)?);
        let rest = RestClient::new(&config.api_url, headers, timeout)?;
        Ok(Self { config, rest, strategy })
    }

    pub async fn fetch_invoice(&self, reference: &str) -> Result<CryptoInvoice, GatewayError> {
        debug!("🏦️ Fetching crypto invoice {reference}");
        let body = json!({ "order_id": reference });
        let envelope = self
            .rest
            .rest_query::<Envelope<CryptoInvoice>, _>(Method::POST, "/v1/payment/info", &[], Some(body))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    GatewayError::ReferenceNotFound(reference.to_string())
                } else {
                    e.into()
                }
            })?;
        match envelope.result {
            Some(invoice) if envelope.state == 0 => Ok(invoice),
            _ => Err(GatewayError::InvalidResponse(envelope.message.unwrap_or_else(|| "empty result".into()))),
        }
    }
}

/// Settled invoices report the USD value received, which may differ from the invoiced amount. Under-payments are
/// final on this gateway.
pub fn crypto_ground_truth(invoice: CryptoInvoice) -> Result<PaymentGroundTruth, GatewayError> {
    let failure = |reason| Err(GatewayError::PaymentFailed { reference: invoice.order_id.clone(), reason });
    let status = match invoice.payment_status.as_str() {
        "paid" | "paid_over" => SettlementStatus::Paid,
        "process" | "check" | "confirm_check" | "locked" => SettlementStatus::Pending,
        "wrong_amount" => return failure(FailureReason::WrongAmount),
        "cancel" => return failure(FailureReason::Expired),
        "fail" | "system_fail" | "refund_process" | "refund_paid" => return failure(FailureReason::Failed),
        "refund_fail" => return failure(FailureReason::RefundFailure),
        other => return Err(GatewayError::InvalidResponse(format!("Unknown invoice status '{other}'"))),
    };
    let invalid = |e: ClientError| GatewayError::InvalidResponse(e.to_string());
    let (amount, currency) = match (status, &invoice.payment_amount_usd) {
        (SettlementStatus::Paid, Some(settled)) => {
            (decimal_to_minor_units(settled, 2).map_err(invalid)?, "USD".to_string())
        },
        (SettlementStatus::Paid, None) => {
            return Err(GatewayError::InvalidResponse(format!(
                "Invoice {} is {} but carries no payment_amount_usd",
                invoice.order_id, invoice.payment_status
            )))
        },
        _ => (decimal_to_minor_units(&invoice.amount, 2).map_err(invalid)?, invoice.currency.to_ascii_uppercase()),
    };
    if status == SettlementStatus::Paid && amount <= 0 {
        return Err(GatewayError::InvalidResponse(format!(
            "Invoice {} settled for a non-positive amount {amount}",
            invoice.order_id
        )));
    }
    let raw = serde_json::to_value(&invoice).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
    Ok(PaymentGroundTruth {
        status,
        amount,
        currency,
        owner_hint: owner_from_metadata(&invoice.additional_data),
        customer_email: None,
        reference: invoice.order_id,
        raw,
    })
}

impl PaymentGateway for CryptoGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Crypto
    }

    fn signature_header(&self) -> &'static str {
        CRYPTO_SIGNATURE_HEADER
    }

    fn verify_webhook_authenticity(&self, raw_payload: &[u8], signature: Option<&str>) -> bool {
        self.strategy.verify(SignatureScheme::HmacSha256Hex, &self.config.api_key, raw_payload, signature)
    }

    fn extract_reference(&self, raw_payload: &[u8]) -> Result<String, GatewayError> {
        let body: Value =
            serde_json::from_slice(raw_payload).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        body["order_id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse("Crypto webhook has no order_id".to_string()))
    }

    async fn fetch_ground_truth(&self, reference: &str) -> Result<PaymentGroundTruth, GatewayError> {
        let invoice = self.fetch_invoice(reference).await?;
        if invoice.order_id != reference {
            return Err(GatewayError::InvalidResponse(format!(
                "Asked for {reference}, but the gateway answered for {}",
                invoice.order_id
            )));
        }
        crypto_ground_truth(invoice)
    }

    async fn initialize_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let body = json!({
            "amount": format_minor_units(request.amount, 2),
            "currency": request.currency,
            "order_id": request.reference,
            "url_return": request.callback_url,
            "additional_data": json!({ OWNER_METADATA_KEY: request.owner_id }).to_string(),
        });
        let envelope =
            self.rest.rest_query::<Envelope<CryptoInvoice>, _>(Method::POST, "/v1/payment", &[], Some(body)).await?;
        match envelope.result {
            Some(CryptoInvoice { url: Some(url), .. }) if envelope.state == 0 => {
                info!("🏦️ Crypto invoice opened for {}", request.reference);
                Ok(CheckoutSession { reference: request.reference.clone(), checkout_url: url })
            },
            _ => Err(GatewayError::Rejected(envelope.message.unwrap_or_else(|| "No invoice URL returned".into()))),
        }
    }

    /// On-chain fees make small invoices uneconomical
    fn minimum_deposit(&self) -> MicroUsd {
        MicroUsd::from_usd(5)
    }
}
