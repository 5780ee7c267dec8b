use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gateway_tools::{
    gateways_from_env,
    FxClient,
    FxConfig,
    GatewayClient,
    ProviderConfig,
    SmsProviderClient,
    VerificationStrategy,
};
use log::*;
use smsr_engine::{
    events::EventProducers,
    AccountApi,
    DepositApi,
    ExchangeRateApi,
    PurchaseApi,
    ReconciliationApi,
    SqliteDatabase,
};

use crate::{
    auth::TokenVerifier,
    config::ServerConfig,
    errors::ServerError,
    notifications::create_logging_event_handlers,
    registry::GatewayRegistry,
    routes::{
        health,
        AssignUnattributedPaymentRoute,
        CancelResourceRoute,
        ExchangeRateRoute,
        InitiateDepositRoute,
        MyBalanceRoute,
        MyResourcesRoute,
        MyTransactionsRoute,
        PurchaseRoute,
        RegisterAccountRoute,
        SetExchangeRateRoute,
        UnattributedPaymentsRoute,
        VerifyDepositRoute,
        WebhookRoute,
    },
    workers::{start_deposit_poller, start_fx_refresher, start_resource_poller},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateways = gateways_from_env(verification_strategy(), config.http_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if gateways.is_empty() {
        warn!("🪛️ No payment gateway is configured. Deposits and webhooks are disabled.");
    }
    let provider = SmsProviderClient::new(ProviderConfig::new_from_env_or_default(), config.http_timeout)
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = create_logging_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let _deposit_poller =
        start_deposit_poller(db.clone(), gateways.clone(), producers.clone(), config.deposit_poll_interval);
    let _resource_poller = start_resource_poller(
        db.clone(),
        provider.clone(),
        producers.clone(),
        config.pricing,
        config.resource_poll_interval,
    );
    if let Some(currency) = config.local_currency.clone() {
        let fx = FxClient::new(FxConfig::new_from_env_or_default(), config.http_timeout)
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        let _fx_refresher = start_fx_refresher(db.clone(), fx, currency, config.fx_refresh_interval);
    }

    let srv = create_server_instance(config, db, gateways, provider, producers)?;
    srv.await.map_err(ServerError::IOError)
}

#[cfg(not(feature = "signature_bypass"))]
fn verification_strategy() -> VerificationStrategy {
    VerificationStrategy::Enforce
}

#[cfg(feature = "signature_bypass")]
fn verification_strategy() -> VerificationStrategy {
    match std::env::var("SMSR_SIGNATURE_BYPASS_TOKEN").ok().filter(|s| !s.trim().is_empty()) {
        Some(token) => {
            warn!("🚨️ Webhook signature bypass is ENABLED. This build must never face the internet.");
            VerificationStrategy::BypassToken(smsr_common::Secret::new(token))
        },
        None => VerificationStrategy::Enforce,
    }
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateways: Vec<GatewayClient>,
    provider: SmsProviderClient,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let options = web::Data::new(config.options());
    let registry = web::Data::new(GatewayRegistry::new(gateways));
    let verifier = web::Data::new(TokenVerifier::new(&config.auth));
    let pricing = config.pricing;
    let srv = HttpServer::new(move || {
        let accounts_api = AccountApi::new(db.clone());
        let reconciliation_api = ReconciliationApi::new(db.clone(), producers.clone());
        let deposit_api = DepositApi::new(db.clone(), producers.clone());
        let purchase_api = PurchaseApi::new(db.clone(), provider.clone(), producers.clone(), pricing);
        let exchange_rate_api = ExchangeRateApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("smsr::access_log"))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(deposit_api))
            .app_data(web::Data::new(purchase_api))
            .app_data(web::Data::new(exchange_rate_api))
            .app_data(options.clone())
            .app_data(registry.clone())
            .app_data(verifier.clone());
        // Routes that require a bearer token
        let api_scope = web::scope("/api")
            .service(RegisterAccountRoute::<SqliteDatabase>::new())
            .service(MyBalanceRoute::<SqliteDatabase>::new())
            .service(MyTransactionsRoute::<SqliteDatabase>::new())
            .service(MyResourcesRoute::<SqliteDatabase>::new())
            .service(InitiateDepositRoute::<SqliteDatabase, GatewayClient>::new())
            .service(VerifyDepositRoute::<SqliteDatabase, GatewayClient>::new())
            .service(PurchaseRoute::<SqliteDatabase, SmsProviderClient>::new())
            .service(CancelResourceRoute::<SqliteDatabase, SmsProviderClient>::new())
            .service(ExchangeRateRoute::<SqliteDatabase>::new())
            .service(SetExchangeRateRoute::<SqliteDatabase>::new())
            .service(UnattributedPaymentsRoute::<SqliteDatabase>::new())
            .service(AssignUnattributedPaymentRoute::<SqliteDatabase>::new());
        app.service(health).service(WebhookRoute::<SqliteDatabase, GatewayClient>::new()).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("🚀️ Listening on {}:{}", config.host, config.port);
    Ok(srv)
}
