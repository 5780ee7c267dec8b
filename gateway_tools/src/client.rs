use std::time::Duration;

use log::*;
use smsr_engine::{
    db_types::{GatewayKind, MicroUsd},
    traits::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway, PaymentGroundTruth},
};

use crate::{
    bank::BankGateway,
    card::CardGateway,
    config::{BankGatewayConfig, CardGatewayConfig, CryptoGatewayConfig},
    crypto::CryptoGateway,
    signatures::VerificationStrategy,
    ClientError,
};

/// Any one of the supported payment gateways.
///
/// The reconciliation engine is generic over [`PaymentGateway`], so a single concrete type lets the server keep all
/// configured gateways in one list and dispatch webhooks by name.
#[derive(Clone)]
pub enum GatewayClient {
    Card(CardGateway),
    Bank(BankGateway),
    Crypto(CryptoGateway),
}

impl From<CardGateway> for GatewayClient {
    fn from(g: CardGateway) -> Self {
        GatewayClient::Card(g)
    }
}

impl From<BankGateway> for GatewayClient {
    fn from(g: BankGateway) -> Self {
        GatewayClient::Bank(g)
    }
}

impl From<CryptoGateway> for GatewayClient {
    fn from(g: CryptoGateway) -> Self {
        GatewayClient::Crypto(g)
    }
}

/// Builds a client for every gateway whose credentials are present in the environment. Gateways without credentials
/// are skipped with a warning; their webhooks will answer 404.
pub fn gateways_from_env(strategy: VerificationStrategy, timeout: Duration) -> Result<Vec<GatewayClient>, ClientError> {
    let mut gateways = Vec::with_capacity(3);
    let card = CardGatewayConfig::new_from_env_or_default();
    if card.is_configured() {
        gateways.push(CardGateway::new(card, strategy.clone(), timeout)?.into());
    } else {
        warn!("🪛️ The card gateway is not configured and will be disabled");
    }
    let bank = BankGatewayConfig::new_from_env_or_default();
    if bank.is_configured() {
        gateways.push(BankGateway::new(bank, strategy.clone(), timeout)?.into());
    } else {
        warn!("🪛️ The bank gateway is not configured and will be disabled");
    }
    let crypto = CryptoGatewayConfig::new_from_env_or_default();
    if crypto.is_configured() {
        gateways.push(CryptoGateway::new(crypto, strategy, timeout)?.into());
    } else {
        warn!("🪛️ The crypto gateway is not configured and will be disabled");
    }
    info!("🪛️ {} payment gateway(s) enabled", gateways.len());
    Ok(gateways)
}

impl PaymentGateway for GatewayClient {
    fn kind(&self) -> GatewayKind {
        match self {
            GatewayClient::Card(g) => g.kind(),
            GatewayClient::Bank(g) => g.kind(),
            GatewayClient::Crypto(g) => g.kind(),
        }
    }

    fn signature_header(&self) -> &'static str {
        match self {
            GatewayClient::Card(g) => g.signature_header(),
            GatewayClient::Bank(g) => g.signature_header(),
            GatewayClient::Crypto(g) => g.signature_header(),
        }
    }

    fn verify_webhook_authenticity(&self, raw_payload: &[u8], signature: Option<&str>) -> bool {
        match self {
            GatewayClient::Card(g) => g.verify_webhook_authenticity(raw_payload, signature),
            GatewayClient::Bank(g) => g.verify_webhook_authenticity(raw_payload, signature),
            GatewayClient::Crypto(g) => g.verify_webhook_authenticity(raw_payload, signature),
        }
    }

    fn extract_reference(&self, raw_payload: &[u8]) -> Result<String, GatewayError> {
        match self {
            GatewayClient::Card(g) => g.extract_reference(raw_payload),
            GatewayClient::Bank(g) => g.extract_reference(raw_payload),
            GatewayClient::Crypto(g) => g.extract_reference(raw_payload),
        }
    }

    async fn fetch_ground_truth(&self, reference: &str) -> Result<PaymentGroundTruth, GatewayError> {
        match self {
            GatewayClient::Card(g) => g.fetch_ground_truth(reference).await,
            GatewayClient::Bank(g) => g.fetch_ground_truth(reference).await,
            GatewayClient::Crypto(g) => g.fetch_ground_truth(reference).await,
        }
    }

    async fn initialize_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        match self {
            GatewayClient::Card(g) => g.initialize_checkout(request).await,
            GatewayClient::Bank(g) => g.initialize_checkout(request).await,
            GatewayClient::Crypto(g) => g.initialize_checkout(request).await,
        }
    }

    fn minimum_deposit(&self) -> MicroUsd {
        match self {
            GatewayClient::Card(g) => g.minimum_deposit(),
            GatewayClient::Bank(g) => g.minimum_deposit(),
            GatewayClient::Crypto(g) => g.minimum_deposit(),
        }
    }
}
