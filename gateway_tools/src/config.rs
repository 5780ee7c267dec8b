use std::{env, time::Duration};

use log::*;
use smsr_common::{parse_env_value, Secret};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

fn string_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("🪛️ {name} not set, using {default} as default");
        default.to_string()
    })
}

fn secret_or_empty(name: &str) -> Secret<String> {
    Secret::new(env::var(name).unwrap_or_else(|_| {
        warn!("🪛️ {name} not set. Calls that need it will be refused");
        String::new()
    }))
}

/// Timeout applied to every outbound call. `SMSR_HTTP_TIMEOUT_SECS`, default 15s.
pub fn http_timeout_from_env() -> Duration {
    match parse_env_value::<u64>(env::var("SMSR_HTTP_TIMEOUT_SECS").ok()) {
        Ok(Some(secs)) if secs > 0 => Duration::from_secs(secs),
        Ok(_) => DEFAULT_HTTP_TIMEOUT,
        Err(s) => {
            warn!("🪛️ Invalid SMSR_HTTP_TIMEOUT_SECS value '{s}', using {}s", DEFAULT_HTTP_TIMEOUT.as_secs());
            DEFAULT_HTTP_TIMEOUT
        },
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardGatewayConfig {
    pub api_url: String,
    /// Authenticates our API calls and keys the webhook HMAC
    pub secret_key: Secret<String>,
}

impl CardGatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = string_or_default("SMSR_CARD_API_URL", "https://api.paystack.co");
        let secret_key = secret_or_empty("SMSR_CARD_SECRET_KEY");
        Self { api_url, secret_key }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_configured()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BankGatewayConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    /// The value the gateway echoes in the `verif-hash` header of every webhook
    pub webhook_hash: Secret<String>,
    /// Where customers land after paying if the deposit request did not say
    pub default_redirect_url: String,
}

impl BankGatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = string_or_default("SMSR_BANK_API_URL", "https://api.flutterwave.com/v3");
        let secret_key = secret_or_empty("SMSR_BANK_SECRET_KEY");
        let webhook_hash = secret_or_empty("SMSR_BANK_WEBHOOK_HASH");
        let default_redirect_url = string_or_default("SMSR_CALLBACK_URL", "http://localhost:8360/");
        Self { api_url, secret_key, webhook_hash, default_redirect_url }
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_configured()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CryptoGatewayConfig {
    pub api_url: String,
    pub merchant_id: String,
    /// Authenticates our API calls and keys the webhook HMAC
    pub api_key: Secret<String>,
}

impl CryptoGatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = string_or_default("SMSR_CRYPTO_API_URL", "https://api.cryptomus.com");
        let merchant_id = env::var("SMSR_CRYPTO_MERCHANT_ID").unwrap_or_else(|_| {
            warn!("🪛️ SMSR_CRYPTO_MERCHANT_ID not set. The crypto gateway will be disabled");
            String::new()
        });
        let api_key = secret_or_empty("SMSR_CRYPTO_API_KEY");
        Self { api_url, merchant_id, api_key }
    }

    pub fn is_configured(&self) -> bool {
        !self.merchant_id.is_empty() && self.api_key.is_configured()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    /// Which of the provider's operators to buy from. `any` lets the provider choose.
    pub operator: String,
}

impl ProviderConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = string_or_default("SMSR_PROVIDER_API_URL", "https://5sim.net");
        let api_key = secret_or_empty("SMSR_PROVIDER_API_KEY");
        let operator = string_or_default("SMSR_PROVIDER_OPERATOR", "any");
        Self { api_url, api_key, operator }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FxConfig {
    pub api_url: String,
}

impl FxConfig {
    pub fn new_from_env_or_default() -> Self {
        Self { api_url: string_or_default("SMSR_FX_API_URL", "https://open.er-api.com/v6") }
    }
}
