use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use gateway_tools::http_timeout_from_env;
use log::*;
use smsr_common::{parse_boolean_flag, parse_env_value, Secret, USD_CURRENCY_CODE};
use smsr_engine::PricingConfig;

const DEFAULT_SMSR_HOST: &str = "127.0.0.1";
const DEFAULT_SMSR_PORT: u16 = 8360;
const DEFAULT_JWT_TTL: StdDuration = StdDuration::from_secs(60 * 60);
const DEFAULT_DEPOSIT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_RESOURCE_POLL_INTERVAL: StdDuration = StdDuration::from_secs(30);
const DEFAULT_FX_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(60 * 60);
/// Pending deposits the gateway still does not recognise after this long are marked expired.
pub const DEPOSIT_EXPIRY: Duration = Duration::hours(24);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// The local currency customers may pay in, besides US dollars. Rates for it are refreshed in the background.
    pub local_currency: Option<String>,
    /// Where gateways send the customer after checkout
    pub callback_url: Option<String>,
    pub pricing: PricingConfig,
    pub http_timeout: StdDuration,
    pub deposit_poll_interval: StdDuration,
    pub resource_poll_interval: StdDuration,
    pub fx_refresh_interval: StdDuration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SMSR_HOST.to_string(),
            port: DEFAULT_SMSR_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            local_currency: None,
            callback_url: None,
            pricing: PricingConfig::default(),
            http_timeout: gateway_tools::DEFAULT_HTTP_TIMEOUT,
            deposit_poll_interval: DEFAULT_DEPOSIT_POLL_INTERVAL,
            resource_poll_interval: DEFAULT_RESOURCE_POLL_INTERVAL,
            fx_refresh_interval: DEFAULT_FX_REFRESH_INTERVAL,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SMSR_HOST").ok().unwrap_or_else(|| DEFAULT_SMSR_HOST.into());
        let port = env_or_default("SMSR_PORT", DEFAULT_SMSR_PORT);
        let database_url = env::var("SMSR_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SMSR_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let auth = AuthConfig::from_env_or_default();
        let use_x_forwarded_for = parse_boolean_flag(env::var("SMSR_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SMSR_USE_FORWARDED").ok(), false);
        let local_currency = env::var("SMSR_LOCAL_CURRENCY")
            .ok()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty() && s != USD_CURRENCY_CODE);
        match &local_currency {
            Some(c) => info!("🪛️ Customers may pay in USD or {c}"),
            None => info!("🪛️ SMSR_LOCAL_CURRENCY is not set. Customers may only pay in USD."),
        }
        let callback_url = env::var("SMSR_CALLBACK_URL").ok().filter(|s| !s.trim().is_empty());
        let pricing = pricing_from_env();
        let http_timeout = http_timeout_from_env();
        let deposit_poll_interval =
            StdDuration::from_secs(env_or_default("SMSR_DEPOSIT_POLL_SECS", DEFAULT_DEPOSIT_POLL_INTERVAL.as_secs()));
        let resource_poll_interval =
            StdDuration::from_secs(env_or_default("SMSR_RESOURCE_POLL_SECS", DEFAULT_RESOURCE_POLL_INTERVAL.as_secs()));
        let fx_refresh_interval = StdDuration::from_secs(
            60 * env_or_default("SMSR_FX_REFRESH_MINS", DEFAULT_FX_REFRESH_INTERVAL.as_secs() / 60),
        );
        Self {
            host,
            port,
            database_url,
            auth,
            use_x_forwarded_for,
            use_forwarded,
            local_currency,
            callback_url,
            pricing,
            http_timeout,
            deposit_poll_interval,
            resource_poll_interval,
            fx_refresh_interval,
        }
    }

    /// The subset of the configuration that request handlers need.
    pub fn options(&self) -> ServerOptions {
        ServerOptions {
            use_x_forwarded_for: self.use_x_forwarded_for,
            use_forwarded: self.use_forwarded,
            local_currency: self.local_currency.clone(),
            callback_url: self.callback_url.clone(),
        }
    }
}

fn pricing_from_env() -> PricingConfig {
    let defaults = PricingConfig::default();
    let markup_bps = env_or_default("SMSR_PRICE_MARKUP_BPS", defaults.markup_bps);
    let activation_lifetime = Duration::minutes(env_or_default(
        "SMSR_ACTIVATION_LIFETIME_MINS",
        defaults.activation_lifetime.num_minutes(),
    ));
    let reservation_timeout = Duration::minutes(env_or_default(
        "SMSR_RESERVATION_TIMEOUT_MINS",
        defaults.reservation_timeout.num_minutes(),
    ));
    info!("🪛️ Numbers are sold at a {:.2}% markup", f64::from(markup_bps) / 100.0);
    PricingConfig { markup_bps, activation_lifetime, reservation_timeout }
}

/// Reads and parses `name`, logging and falling back to `default` when the variable is missing or invalid.
fn env_or_default<T>(name: &str, default: T) -> T
where T: std::str::FromStr + std::fmt::Display + Copy {
    match parse_env_value::<T>(env::var(name).ok()) {
        Ok(Some(v)) => v,
        Ok(None) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Err(s) => {
            warn!("🪛️ {s} is not a valid value for {name}. Using the default, {default}, instead.");
            default
        },
    }
}

/// Request-time settings shared with every handler through `web::Data`.
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub local_currency: Option<String>,
    pub callback_url: Option<String>,
}

impl ServerOptions {
    /// Whether deposits may be requested in `currency`.
    pub fn accepts_currency(&self, currency: &str) -> bool {
        currency.eq_ignore_ascii_case(USD_CURRENCY_CODE)
            || self.local_currency.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(currency))
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Shared HS256 secret of the identity provider that issues access tokens
    pub jwt_secret: Secret<String>,
    /// The longest lifetime a token may claim. Tokens that expire further in the future are refused.
    pub max_token_ttl: StdDuration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { jwt_secret: Secret::default(), max_token_ttl: DEFAULT_JWT_TTL }
    }
}

impl AuthConfig {
    pub fn from_env_or_default() -> Self {
        let jwt_secret = env::var("SMSR_JWT_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ SMSR_JWT_SECRET is not set. No access token can be verified, so every authenticated endpoint \
                 will answer 401."
            );
            String::default()
        });
        let max_token_ttl = StdDuration::from_secs(env_or_default("SMSR_JWT_TTL_SECS", DEFAULT_JWT_TTL.as_secs()));
        Self { jwt_secret: Secret::new(jwt_secret), max_token_ttl }
    }
}
