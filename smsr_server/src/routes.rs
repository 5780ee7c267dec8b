//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate function. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every database or upstream call below is therefore awaited, never
//! blocked on.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use smsr_common::{parse_decimal_amount, MicroUsd, USD_CURRENCY_CODE};
use smsr_engine::{
    helpers::deposit_reference_gateway,
    traits::{AccountManagement, ExchangeRates, LedgerDatabase, NumberProvider, NumberRequest, PaymentGateway},
    AccountApi,
    DepositApi,
    ExchangeRate,
    ExchangeRateApi,
    PurchaseApi,
    ReconciliationApi,
    ReconciliationError,
};

use crate::{
    auth::{JwtClaims, Role},
    config::ServerOptions,
    data_objects::{
        AssignPaymentRequest,
        BalanceResponse,
        DepositRequest,
        ExchangeRateQuery,
        ExchangeRateResult,
        ExchangeRateUpdate,
        Pagination,
        PaymentStatusResponse,
        PurchaseRequest,
        UnattributedQuery,
    },
    errors::ServerError,
    helpers::get_remote_ip,
    registry::GatewayRegistry,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(webhook => Post "/webhook/{gateway}" impl LedgerDatabase, PaymentGateway);
/// Route handler for gateway payment notifications
///
/// Nothing in the body is trusted until the gateway's signature over the raw bytes has been checked. Even then, only
/// the payment reference is read from it: the status, amount and owner come from the gateway's own records.
///
/// Response codes tell the gateway whether to redeliver:
/// * 200 when the payment was credited, was already credited, is still pending, failed, or was queued for manual
///   attribution.
/// * 401 for a missing or invalid signature, 400 for a body we cannot read.
/// * 404 when the gateway does not (yet) know the reference, 503 when it could not be reached.
pub async fn webhook<B: LedgerDatabase, G: PaymentGateway>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B>>,
    gateways: web::Data<GatewayRegistry<G>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let name = path.into_inner();
    let peer = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "an unknown address".into());
    trace!("💻️ Received {name} webhook from {peer}");
    let gateway = gateways.by_name(&name).ok_or_else(|| ServerError::UnknownGateway(name.clone()))?;
    let signature = req.headers().get(gateway.signature_header()).and_then(|v| v.to_str().ok());
    if !gateway.verify_webhook_authenticity(&body, signature) {
        warn!("🔐️ Rejected a {name} webhook from {peer} with a missing or invalid signature");
        return Err(ServerError::InvalidSignature);
    }
    let reference = gateway.extract_reference(&body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    debug!("💻️ Authentic {name} webhook for payment {reference}");
    let status = payment_status(api.reconcile(gateway, &reference).await)?;
    Ok(HttpResponse::Ok().json(status))
}

/// Turns a reconciliation result into a client response. Unattributed funds are reported as queued, never as an
/// error, because neither the gateway nor the customer can do anything about them.
fn payment_status(
    result: Result<smsr_engine::ReconciliationOutcome, ReconciliationError>,
) -> Result<PaymentStatusResponse, ServerError> {
    match result {
        Ok(outcome) => Ok(outcome.into()),
        Err(ReconciliationError::OwnerResolutionFailed { reference, reason, unattributed_id }) |
        Err(ReconciliationError::ConversionFailed { reference, reason, unattributed_id }) => {
            error!(
                "💻️ Payment {reference} was received but could not be credited ({reason}). It is waiting for manual \
                 attribution as unattributed payment #{unattributed_id}"
            );
            Ok(PaymentStatusResponse::queued_for_review())
        },
        Err(e) => Err(e.into()),
    }
}

//----------------------------------------------   Account  ----------------------------------------------------
route!(register_account => Post "/account" impl LedgerDatabase);
/// Route handler for the account endpoint
///
/// Creates the caller's wallet on first use and keeps the email on file current. The email is what lets payments
/// made without our reference still find their way to the right wallet.
pub async fn register_account<B: LedgerDatabase>(
    claims: JwtClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST account for {}", claims.sub);
    let wallet = api.register_account(claims.owner_id(), claims.email.as_deref()).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(wallet)))
}

route!(my_balance => Get "/balance" impl AccountManagement);
pub async fn my_balance<B: AccountManagement>(
    claims: JwtClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET balance for {}", claims.sub);
    let wallet = api.wallet(claims.owner_id()).await?.ok_or_else(|| ServerError::AccountNotFound(claims.sub.clone()))?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(wallet)))
}

route!(my_transactions => Get "/transactions" impl AccountManagement);
pub async fn my_transactions<B: AccountManagement>(
    claims: JwtClaims,
    query: web::Query<Pagination>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET transactions for {}", claims.sub);
    let transactions = api.transactions(claims.owner_id(), query.limit(), query.offset()).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

route!(my_resources => Get "/resources" impl AccountManagement);
pub async fn my_resources<B: AccountManagement>(
    claims: JwtClaims,
    query: web::Query<Pagination>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET resources for {}", claims.sub);
    let resources = api.resources(claims.owner_id(), query.limit(), query.offset()).await?;
    Ok(HttpResponse::Ok().json(resources))
}

//----------------------------------------------   Deposits  ----------------------------------------------------
route!(initiate_deposit => Post "/deposits" impl LedgerDatabase, PaymentGateway);
/// Route handler for starting a deposit
///
/// Returns the payment reference and the gateway checkout URL the customer should be sent to. The wallet is credited
/// later, when the gateway confirms the payment by webhook or the customer asks us to check.
pub async fn initiate_deposit<B: LedgerDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    body: web::Json<DepositRequest>,
    api: web::Data<DepositApi<B>>,
    gateways: web::Data<GatewayRegistry<G>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST deposit of {} via {} for {}", request.amount, request.gateway, claims.sub);
    let currency = request.currency.as_deref().unwrap_or(USD_CURRENCY_CODE).to_ascii_uppercase();
    if !options.accepts_currency(&currency) {
        return Err(ServerError::InvalidRequestBody(format!("{currency} is not accepted")));
    }
    let amount =
        parse_decimal_amount(&request.amount, 2).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    if amount <= 0 {
        return Err(ServerError::InvalidRequestBody(format!("Deposit amount must be positive. Got {amount}")));
    }
    let gateway = gateways
        .get(request.gateway)
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("The {} gateway is not available", request.gateway)))?;
    let deposit =
        api.initiate_deposit(gateway, claims.owner_id(), amount, &currency, options.callback_url.clone()).await?;
    Ok(HttpResponse::Ok().json(deposit))
}

route!(verify_deposit => Get "/deposits/{reference}" impl LedgerDatabase, PaymentGateway);
/// Route handler for checking on a deposit
///
/// Asks the gateway for the payment's status and credits the wallet if it has settled. Safe to call as often as the
/// customer likes: a payment is only ever credited once.
pub async fn verify_deposit<B: LedgerDatabase, G: PaymentGateway>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<ReconciliationApi<B>>,
    gateways: web::Data<GatewayRegistry<G>>,
) -> Result<HttpResponse, ServerError> {
    let reference = path.into_inner();
    debug!("💻️ GET deposit {reference} for {}", claims.sub);
    let kind = deposit_reference_gateway(&reference).ok_or_else(|| ServerError::NoRecordFound(reference.clone()))?;
    let gateway = gateways.get(kind).ok_or_else(|| ServerError::NoRecordFound(reference.clone()))?;
    let deposit = api
        .db()
        .fetch_transaction_by_reference(kind.as_str(), &reference)
        .await?
        .filter(|t| t.owner_id == claims.owner_id())
        .ok_or_else(|| ServerError::NoRecordFound(reference.clone()))?;
    let status = match api.verify_deposit(gateway, claims.owner_id(), &reference).await {
        // The deposit is ours; the gateway just has not seen the payment yet
        Err(ReconciliationError::ReferenceNotFound(_)) => {
            PaymentStatusResponse { transaction: Some(deposit), ..PaymentStatusResponse::pending() }
        },
        result => payment_status(result)?,
    };
    Ok(HttpResponse::Ok().json(status))
}

//----------------------------------------------   Purchases  ----------------------------------------------------
route!(purchase => Post "/purchases" impl LedgerDatabase, NumberProvider);
/// Route handler for buying a number
///
/// The caller is only charged if the provider hands out a number. An insufficient balance is reported with the
/// amount the customer is short by.
pub async fn purchase<B: LedgerDatabase, P: NumberProvider>(
    claims: JwtClaims,
    body: web::Json<PurchaseRequest>,
    api: web::Data<PurchaseApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let PurchaseRequest { service, country } = body.into_inner();
    debug!("💻️ POST purchase of a {service}/{country} number for {}", claims.sub);
    if service.trim().is_empty() || country.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("service and country are required".into()));
    }
    let request = NumberRequest { service: service.trim().to_lowercase(), country: country.trim().to_lowercase() };
    let receipt = api.purchase(claims.owner_id(), request).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

route!(cancel_resource => Post "/resources/{id}/cancel" impl LedgerDatabase, NumberProvider);
pub async fn cancel_resource<B: LedgerDatabase, P: NumberProvider>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<PurchaseApi<B, P>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST cancel resource #{id} for {}", claims.sub);
    let receipt = api.cancel_purchase(claims.owner_id(), id).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

//----------------------------------------------   Exchange rates  ----------------------------------------------------
route!(exchange_rate => Get "/exchange_rate" impl ExchangeRates);
pub async fn exchange_rate<B: ExchangeRates>(
    _claims: JwtClaims,
    query: web::Query<ExchangeRateQuery>,
    api: web::Data<ExchangeRateApi<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let currency = query
        .into_inner()
        .currency
        .or_else(|| options.local_currency.clone())
        .unwrap_or_else(|| USD_CURRENCY_CODE.to_string());
    trace!("💻️ GET exchange rate for {currency}");
    let rate = api.fetch_last_rate(&currency).await?;
    Ok(HttpResponse::Ok().json(ExchangeRateResult::from(rate)))
}

route!(set_exchange_rate => Post "/admin/exchange_rate" impl ExchangeRates where requires [Role::Admin]);
pub async fn set_exchange_rate<B: ExchangeRates>(
    claims: JwtClaims,
    body: web::Json<ExchangeRateUpdate>,
    api: web::Data<ExchangeRateApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let update = body.into_inner();
    let rate = parse_decimal_amount(&update.rate, 2).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let rate = ExchangeRate::new(&update.currency, rate, None);
    info!("💻️ {} is setting the exchange rate to {rate}", claims.sub);
    api.set_exchange_rate(&rate).await?;
    Ok(HttpResponse::Ok().json(ExchangeRateResult::from(rate)))
}

//----------------------------------------------   Unattributed payments  ---------------------------------------------
route!(unattributed_payments => Get "/admin/unattributed" impl LedgerDatabase where requires [Role::Admin]);
/// Route handler for the manual attribution queue
///
/// Lists payments that were received but could not be matched to a wallet. Every entry is money we are holding on
/// someone's behalf.
pub async fn unattributed_payments<B: LedgerDatabase>(
    query: web::Query<UnattributedQuery>,
    api: web::Data<DepositApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET unattributed payments");
    let payments = api.unattributed_payments(query.include_resolved).await?;
    Ok(HttpResponse::Ok().json(payments))
}

route!(assign_unattributed_payment => Post "/admin/unattributed/{id}/assign" impl LedgerDatabase where requires [Role::Admin]);
pub async fn assign_unattributed_payment<B: LedgerDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<AssignPaymentRequest>,
    api: web::Data<DepositApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let AssignPaymentRequest { owner_id, amount_usd } = body.into_inner();
    let amount = amount_usd
        .map(|s| parse_decimal_amount(&s, 6).map(MicroUsd::from))
        .transpose()
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    info!("💻️ {} is assigning unattributed payment #{id} to {owner_id}", claims.sub);
    let outcome = api.assign_unattributed_payment(id, &owner_id, amount).await?;
    Ok(HttpResponse::Ok().json(PaymentStatusResponse::from(outcome)))
}
