//! # Purchase orchestration
//!
//! Buying a number touches two systems that cannot share a transaction: our ledger and the upstream provider. The
//! [`PurchaseApi`] bridges them with a reservation:
//!
//! 1. The retail price is quoted and checked against the wallet balance.
//! 2. The charge is reserved: the wallet is debited and a `pending` purchase transaction is written, atomically, under
//!    the storage-level balance check. Concurrent purchases can therefore never overdraw a wallet.
//! 3. The provider is asked for a number.
//! 4. On success the reservation is committed, and the resource row is written in the same unit. On failure the
//!    reservation is released and the customer is not charged.
//!
//! If the process dies between 2 and 4, the reservation stays `pending` until
//! [`PurchaseApi::release_stale_reservations`] returns the funds.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde_json::json;

use crate::{
    db_types::{MicroUsd, NewReservation, NewResource, PurchasedResource, ResourceStatus, Transaction},
    events::{publish_to_all, EventProducers, PurchaseCompletedEvent, ResourceRefundedEvent},
    helpers::apply_markup,
    ledger_api::{
        errors::PurchaseError,
        purchase_objects::{PricingConfig, PurchaseReceipt, RefundReceipt, ResourcePollSummary},
    },
    traits::{LedgerDatabase, NumberProvider, NumberRequest, ProviderError, SmsMessage},
};

pub struct PurchaseApi<B, P> {
    db: B,
    provider: P,
    producers: EventProducers,
    pricing: PricingConfig,
}

impl<B, P> Debug for PurchaseApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PurchaseApi ({:?})", self.pricing)
    }
}

/// The number of messages stored on a resource.
fn message_count(resource: &PurchasedResource) -> usize {
    resource
        .messages
        .as_deref()
        .and_then(|m| serde_json::from_str::<Vec<SmsMessage>>(m).ok())
        .map(|m| m.len())
        .unwrap_or(0)
}

impl<B, P> PurchaseApi<B, P>
where
    B: LedgerDatabase,
    P: NumberProvider,
{
    pub fn new(db: B, provider: P, producers: EventProducers, pricing: PricingConfig) -> Self {
        Self { db, provider, producers, pricing }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// The retail price the customer would pay for `request` right now.
    pub async fn quote(&self, request: &NumberRequest) -> Result<MicroUsd, PurchaseError> {
        let wholesale = self.provider.quote_price(request).await.map_err(|e| {
            warn!("📞️ Could not get a price for {}/{}: {e}", request.service, request.country);
            PurchaseError::ProvisioningFailed(e)
        })?;
        let retail = apply_markup(wholesale, self.pricing.markup_bps);
        trace!("📞️ {}/{} costs {wholesale} wholesale, {retail} retail", request.service, request.country);
        Ok(retail)
    }

    /// Buys a number for `owner_id`. The wallet is charged if, and only if, the provider delivers a number.
    pub async fn purchase(&self, owner_id: &str, request: NumberRequest) -> Result<PurchaseReceipt, PurchaseError> {
        trace!("🔄️📞️ {owner_id} wants a {}/{} number", request.service, request.country);
        let wallet =
            self.db.fetch_wallet(owner_id).await?.ok_or_else(|| PurchaseError::WalletNotFound(owner_id.to_string()))?;
        let charge = self.quote(&request).await?;
        if wallet.balance < charge {
            let shortfall = charge - wallet.balance;
            debug!("🔄️📞️ {owner_id} has {} but needs {charge}", wallet.balance);
            return Err(PurchaseError::InsufficientFunds { balance: wallet.balance, charge, shortfall });
        }
        let reservation = NewReservation {
            owner_id: owner_id.to_string(),
            amount: charge,
            description: format!("{} number ({})", request.service, request.country),
            metadata: Some(json!({ "service": request.service, "country": request.country }).to_string()),
        };
        // The balance may have changed since the read above. The storage layer has the final say.
        let reservation = self.db.reserve_funds(reservation).await?;
        debug!("🔄️📞️ Reserved {charge} for {owner_id} as #{}", reservation.id);

        let number = match self.provider.request_number(&request).await {
            Ok(n) => n,
            Err(e) => {
                warn!("🔄️📞️ Provisioning failed for reservation #{}: {e}. Releasing the funds", reservation.id);
                self.release(&reservation, &format!("provisioning failed: {e}")).await;
                return Err(PurchaseError::ProvisioningFailed(e));
            },
        };
        if number.wholesale_cost > charge {
            warn!(
                "🔄️📞️ Provider charged {} for {}, more than the {charge} retail price",
                number.wholesale_cost, number.upstream_id
            );
        }
        let expiry_at = number.expires_at.unwrap_or_else(|| Utc::now() + self.pricing.activation_lifetime);
        let resource = NewResource {
            upstream_id: number.upstream_id.clone(),
            service: request.service.clone(),
            country: request.country.clone(),
            resource_value: number.phone_number.clone(),
            expiry_at,
        };
        match self.db.commit_purchase(reservation.id, resource).await {
            Ok((transaction, resource, balance)) => {
                info!(
                    "🔄️📞️ {owner_id} bought {} ({}) for {charge}. Balance is now {balance}",
                    resource.resource_value, resource.upstream_id
                );
                let event = PurchaseCompletedEvent { transaction: transaction.clone(), resource: resource.clone() };
                publish_to_all(&self.producers.purchase_completed_producer, event).await;
                Ok(PurchaseReceipt { transaction, resource, balance })
            },
            Err(e) => {
                error!(
                    "🔄️📞️ Number {} was provisioned but the purchase could not be recorded: {e}. Cancelling upstream \
                     and releasing reservation #{}",
                    number.upstream_id, reservation.id
                );
                if let Err(cancel_err) = self.provider.cancel(&number.upstream_id).await {
                    error!("🔄️📞️ Could not cancel orphaned order {}: {cancel_err}", number.upstream_id);
                }
                self.release(&reservation, "purchase could not be recorded").await;
                Err(e.into())
            },
        }
    }

    async fn release(&self, reservation: &Transaction, reason: &str) {
        match self.db.release_reservation(reservation.id, reason).await {
            Ok(Some(_)) => debug!("🔄️📞️ Reservation #{} released", reservation.id),
            Ok(None) => debug!("🔄️📞️ Reservation #{} was already settled", reservation.id),
            Err(e) => error!(
                "🔄️📞️ Could not release reservation #{} of {} for {}: {e}. The sweeper will retry",
                reservation.id, -reservation.amount, reservation.owner_id
            ),
        }
    }

    /// Cancels an active resource at the provider and refunds its cost. Only possible before any SMS arrived.
    pub async fn cancel_purchase(&self, owner_id: &str, resource_id: i64) -> Result<RefundReceipt, PurchaseError> {
        let resource = self
            .db
            .fetch_resource(resource_id)
            .await?
            .filter(|r| r.owner_id == owner_id)
            .ok_or(PurchaseError::ResourceNotFound(resource_id))?;
        if resource.status != ResourceStatus::Active {
            return Err(PurchaseError::NotCancellable(format!("the number is {}", resource.status)));
        }
        if message_count(&resource) > 0 {
            return Err(PurchaseError::NotCancellable("a message has already been received".to_string()));
        }
        self.provider.cancel(&resource.upstream_id).await.map_err(|e| match e {
            ProviderError::Rejected(reason) => PurchaseError::NotCancellable(reason),
            e => {
                warn!("📞️ Could not cancel {}: {e}", resource.upstream_id);
                PurchaseError::Upstream(e)
            },
        })?;
        info!("🔄️📞️ {owner_id} cancelled {} ({})", resource.resource_value, resource.upstream_id);
        self.refund(&resource, "cancelled by customer")
            .await?
            .ok_or_else(|| PurchaseError::NotCancellable("the number has already been refunded".to_string()))
    }

    async fn refund(&self, resource: &PurchasedResource, reason: &str) -> Result<Option<RefundReceipt>, PurchaseError> {
        match self.db.refund_resource(resource.id, reason).await? {
            Some((refund, resource, balance)) => {
                info!(
                    "🔄️📞️ Refunded {} to {} for {} ({reason}). Balance is now {balance}",
                    refund.amount, resource.owner_id, resource.upstream_id
                );
                let event = ResourceRefundedEvent { refund: refund.clone(), resource: resource.clone() };
                publish_to_all(&self.producers.resource_refunded_producer, event).await;
                Ok(Some(RefundReceipt { refund, resource, balance }))
            },
            None => {
                debug!("🔄️📞️ Resource #{} has already been refunded", resource.id);
                Ok(None)
            },
        }
    }

    /// One pass of the resource status poller. Resources the provider cancelled or let lapse without delivering a
    /// message are refunded. So are resources past their expiry that never received one.
    pub async fn refresh_resource_statuses(&self, batch_size: i64) -> Result<ResourcePollSummary, PurchaseError> {
        let resources = self.db.fetch_resources_to_poll(batch_size).await?;
        let mut summary = ResourcePollSummary::default();
        let now = Utc::now();
        for resource in resources {
            summary.checked += 1;
            let upstream = match self.provider.check_status(&resource.upstream_id).await {
                Ok(s) => s,
                Err(ProviderError::NotFound(id)) => {
                    warn!("📞️ Provider no longer knows order {id} (resource #{})", resource.id);
                    self.db.update_resource_status(resource.id, ResourceStatus::Unknown, None).await?;
                    summary.updated += 1;
                    continue;
                },
                Err(e) => {
                    debug!("📞️ Could not refresh resource #{}: {e}", resource.id);
                    summary.errors += 1;
                    continue;
                },
            };
            let received = upstream.messages.len().max(message_count(&resource));
            let lapsed_locally = upstream.status == ResourceStatus::Active && resource.expiry_at < now;
            let refundable = received == 0 &&
                (matches!(upstream.status, ResourceStatus::Cancelled | ResourceStatus::Expired) || lapsed_locally);
            if refundable {
                if lapsed_locally {
                    if let Err(e) = self.provider.cancel(&resource.upstream_id).await {
                        warn!("📞️ Could not cancel lapsed order {}: {e}", resource.upstream_id);
                        summary.errors += 1;
                        continue;
                    }
                }
                match self.refund(&resource, &format!("number {}", upstream.status)).await {
                    Ok(Some(_)) => summary.refunded += 1,
                    Ok(None) => {},
                    Err(e) => {
                        error!("🔄️📞️ Could not refund resource #{}: {e}", resource.id);
                        summary.errors += 1;
                    },
                }
                continue;
            }
            let status = if lapsed_locally { ResourceStatus::Expired } else { upstream.status };
            let messages = if upstream.messages.is_empty() {
                None
            } else {
                serde_json::to_string(&upstream.messages).ok()
            };
            let changed = status != resource.status || messages.is_some();
            if changed && self.db.update_resource_status(resource.id, status, messages).await?.is_some() {
                trace!("📞️ Resource #{} is now {status}", resource.id);
                summary.updated += 1;
            }
        }
        if summary.checked > 0 {
            debug!("🕰️ Resource poll: {summary:?}");
        }
        Ok(summary)
    }

    /// Returns the funds held by reservations older than the configured timeout. Returns how many were released.
    pub async fn release_stale_reservations(&self) -> Result<usize, PurchaseError> {
        let cutoff = Utc::now() - self.pricing.reservation_timeout;
        let stale = self.db.fetch_stale_reservations(cutoff).await?;
        let mut released = 0;
        for reservation in stale {
            if self.db.release_reservation(reservation.id, "reservation timed out").await?.is_some() {
                warn!(
                    "🕰️ Released abandoned reservation #{} of {} for {}",
                    reservation.id, -reservation.amount, reservation.owner_id
                );
                released += 1;
            }
        }
        Ok(released)
    }
}
