//! Background jobs. Each worker runs on its own tokio task until the process exits. Do not await the returned
//! JoinHandles.
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use gateway_tools::{FxClient, GatewayClient, SmsProviderClient};
use log::*;
use smsr_engine::{
    events::EventProducers,
    ExchangeRateApi,
    PricingConfig,
    PurchaseApi,
    ReconciliationApi,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::config::DEPOSIT_EXPIRY;

const DEPOSIT_BATCH_SIZE: i64 = 50;
const RESOURCE_BATCH_SIZE: i64 = 100;
// tokio intervals panic on a zero period
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Reconciles deposits whose webhook never arrived. A deposit is only picked up once it is at least one `interval`
/// old, so the webhook gets a chance to land first.
pub fn start_deposit_poller(
    db: SqliteDatabase,
    gateways: Vec<GatewayClient>,
    producers: EventProducers,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval.max(MIN_INTERVAL));
        let api = ReconciliationApi::new(db, producers);
        let min_age = ChronoDuration::from_std(interval).unwrap_or_else(|_| ChronoDuration::minutes(1));
        info!("🕰️ Pending deposit poller started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running pending deposit poll");
            match api.reconcile_pending_deposits(&gateways, min_age, DEPOSIT_EXPIRY, DEPOSIT_BATCH_SIZE).await {
                Ok(summary) if summary.checked > 0 => info!(
                    "🕰️ Checked {} pending deposits: {} credited, {} failed, {} expired, {} still pending, {} errors",
                    summary.checked,
                    summary.credited,
                    summary.failed,
                    summary.expired,
                    summary.still_pending,
                    summary.errors
                ),
                Ok(_) => trace!("🕰️ No pending deposits to check"),
                Err(e) => error!("🕰️ Error running the pending deposit poll: {e}"),
            }
        }
    })
}

/// Refreshes the status and messages of live numbers, refunds the ones the provider gave up on, and returns funds
/// held by reservations that never completed.
pub fn start_resource_poller(
    db: SqliteDatabase,
    provider: SmsProviderClient,
    producers: EventProducers,
    pricing: PricingConfig,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval.max(MIN_INTERVAL));
        let api = PurchaseApi::new(db, provider, producers, pricing);
        info!("🕰️ Resource poller and reservation sweeper started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running resource status poll");
            match api.refresh_resource_statuses(RESOURCE_BATCH_SIZE).await {
                Ok(summary) if summary.checked > 0 => info!(
                    "🕰️ Checked {} resources: {} updated, {} refunded, {} errors",
                    summary.checked, summary.updated, summary.refunded, summary.errors
                ),
                Ok(_) => trace!("🕰️ No live resources to check"),
                Err(e) => error!("🕰️ Error running the resource status poll: {e}"),
            }
            match api.release_stale_reservations().await {
                Ok(0) => {},
                Ok(n) => warn!("🕰️ Released {n} abandoned purchase reservations"),
                Err(e) => error!("🕰️ Error releasing abandoned reservations: {e}"),
            }
        }
    })
}

/// Keeps the stored rate for the local currency fresh.
pub fn start_fx_refresher(
    db: SqliteDatabase,
    client: FxClient,
    currency: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval.max(MIN_INTERVAL));
        let api = ExchangeRateApi::new(db);
        info!("🕰️ Exchange rate refresher started for {currency}");
        loop {
            timer.tick().await;
            match client.fetch_rate(&currency).await {
                Ok(rate) => match api.set_exchange_rate(&rate).await {
                    Ok(()) => info!("🕰️ Exchange rate updated: {rate}"),
                    Err(e) => error!("🕰️ Could not store the new {currency} exchange rate: {e}"),
                },
                // The last stored rate stays in force
                Err(e) => warn!("🕰️ Could not fetch the {currency} exchange rate: {e}"),
            }
        }
    })
}
