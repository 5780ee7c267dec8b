//! # Gateway tools
//!
//! HTTP clients for everything outside our walls that the SMS reseller talks to:
//!
//! * the card, bank and crypto payment gateways ([`CardGateway`], [`BankGateway`], [`CryptoGateway`], or any of them
//!   through [`GatewayClient`]), which implement [`smsr_engine::traits::PaymentGateway`];
//! * the upstream number provider ([`SmsProviderClient`]), which implements [`smsr_engine::traits::NumberProvider`];
//! * the FX feed ([`FxClient`]).
//!
//! Every response is decoded into an explicit schema. Anything that does not fit is reported as an invalid response
//! rather than guessed at. Webhook signatures are checked by [`VerificationStrategy`].
mod bank;
mod card;
mod client;
mod config;
mod crypto;
mod error;
mod fx;
mod helpers;
mod provider;
mod rest;
mod signatures;

pub use bank::{bank_ground_truth, BankGateway, BankTransaction, BANK_SIGNATURE_HEADER};
pub use card::{card_ground_truth, CardGateway, CardTransaction, CARD_SIGNATURE_HEADER};
pub use client::{gateways_from_env, GatewayClient};
pub use config::{
    http_timeout_from_env,
    BankGatewayConfig,
    CardGatewayConfig,
    CryptoGatewayConfig,
    FxConfig,
    ProviderConfig,
    DEFAULT_HTTP_TIMEOUT,
};
pub use crypto::{crypto_ground_truth, CryptoGateway, CryptoInvoice, CRYPTO_SIGNATURE_HEADER};
pub use error::ClientError;
pub use fx::FxClient;
pub use provider::{upstream_status, ProviderOrder, SmsProviderClient};
pub use signatures::{
    calculate_hmac_sha256_hex,
    calculate_hmac_sha512_hex,
    constant_time_eq,
    SignatureScheme,
    VerificationStrategy,
};
