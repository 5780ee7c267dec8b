//! # Payment reconciliation
//!
//! `ReconciliationApi` turns a gateway-verified payment into exactly one wallet credit, no matter how many times the
//! same payment is observed. Webhook redeliveries, the customer pressing "check status" and the background poller all
//! funnel into [`ReconciliationApi::reconcile`].
//!
//! The flow for a reference is:
//! 1. If a transaction for `(gateway, reference)` is already completed, report `AlreadyProcessed`. If it already
//!    failed, report the stored failure reason.
//! 2. Ask the gateway for ground truth. Network trouble and unknown references are transient errors; terminal
//!    failures mark the transaction failed.
//! 3. For a paid payment, resolve the owner (pending transaction first, then the owner token the gateway echoed
//!    back, then a unique billing email match), convert the settled amount to the ledger currency, and credit the
//!    wallet in one atomic unit.
//!
//! Payments that are paid but cannot be attributed are never dropped. They are written to the unattributed payments
//! queue, logged at `error` and published as an [`OwnerResolutionFailedEvent`].
use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use serde_json::json;

use crate::{
    db_types::{
        manual_attribution_reference,
        CreditRequest,
        CreditResult,
        FailureReason,
        GatewayKind,
        MicroUsd,
        NewUnattributedPayment,
        Transaction,
        TransactionStatus,
        MANUAL_SOURCE,
    },
    events::{
        publish_to_all,
        DepositCreditedEvent,
        EventProducers,
        OwnerResolutionFailedEvent,
        PaymentFailedEvent,
    },
    ledger_api::{
        errors::ReconciliationError,
        exchange_objects::ExchangeRate,
        reconciliation_objects::{PollSummary, ReconciliationOutcome},
    },
    traits::{ExchangeRateError, GatewayError, LedgerDatabase, PaymentGateway, PaymentGroundTruth, SettlementStatus},
};

enum OwnerResolution {
    Resolved(String),
    Unresolved(String),
}

pub struct ReconciliationApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> ReconciliationApi<B>
where B: LedgerDatabase
{
    /// Applies the gateway's authoritative view of `reference` to the ledger. Safe to call any number of times,
    /// concurrently or not.
    pub async fn reconcile<G: PaymentGateway>(
        &self,
        gateway: &G,
        reference: &str,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let kind = gateway.kind();
        let source = kind.as_str();
        trace!("🔄️💰️ Reconciling [{source}:{reference}]");
        let existing = self.db.fetch_transaction_by_reference(source, reference).await?;
        // Expiry and checkout failures are our own decisions, so the gateway may still settle the payment later.
        let mut failed_locally = None;
        if let Some(t) = &existing {
            match t.status {
                TransactionStatus::Completed => {
                    debug!("🔄️💰️ [{source}:{reference}] was already credited as #{}", t.id);
                    return Ok(ReconciliationOutcome::AlreadyProcessed { transaction: t.clone() });
                },
                TransactionStatus::Failed => {
                    let reason = t.failure().unwrap_or(FailureReason::Failed);
                    if !matches!(reason, FailureReason::Expired | FailureReason::SystemFailure) {
                        debug!("🔄️💰️ [{source}:{reference}] has already failed ({reason})");
                        return Ok(ReconciliationOutcome::Failed { reason, transaction: Some(t.clone()) });
                    }
                    failed_locally = Some((reason, t.clone()));
                },
                TransactionStatus::Pending => {},
            }
        }
        let stored_failure = |reason: FailureReason, t: Transaction| ReconciliationOutcome::Failed {
            reason,
            transaction: Some(t),
        };

        let truth = match gateway.fetch_ground_truth(reference).await {
            Ok(truth) => truth,
            Err(GatewayError::PaymentFailed { reason, .. }) => {
                if let Some((stored, t)) = failed_locally {
                    return Ok(stored_failure(stored, t));
                }
                return self.record_failure(kind, reference, reason).await;
            },
            Err(GatewayError::ReferenceNotFound(r)) => {
                return match failed_locally {
                    Some((stored, t)) => Ok(stored_failure(stored, t)),
                    None => {
                        debug!("🔄️💰️ [{source}:{reference}] is not known to the gateway yet");
                        Err(ReconciliationError::ReferenceNotFound(r))
                    },
                };
            },
            Err(e) => {
                if e.is_retryable() {
                    debug!("🔄️💰️ [{source}:{reference}] could not be verified yet: {e}");
                } else {
                    warn!("🔄️💰️ [{source}:{reference}] could not be verified: {e}");
                }
                return Err(e.into());
            },
        };
        if truth.reference != reference {
            warn!("🔄️💰️ Gateway answered a lookup for {reference} with reference {}", truth.reference);
            return Err(ReconciliationError::InvalidGatewayResponse(format!(
                "Asked for {reference} but received {}",
                truth.reference
            )));
        }
        if truth.status == SettlementStatus::Pending {
            if let Some((stored, t)) = failed_locally {
                return Ok(stored_failure(stored, t));
            }
            debug!("🔄️💰️ [{source}:{reference}] is not settled yet");
            return Ok(ReconciliationOutcome::Pending);
        }
        if truth.amount <= 0 {
            warn!("🔄️💰️ [{source}:{reference}] reported as paid with a non-positive amount {}", truth.amount);
            return self.record_failure(kind, reference, FailureReason::WrongAmount).await;
        }

        // Once a payment is in the manual queue, only an operator may credit it.
        if let Some(queued) = self.db.fetch_unattributed_payment(source, reference).await? {
            return match &queued.resolved_owner_id {
                Some(owner) => {
                    let manual_ref = manual_attribution_reference(source, reference);
                    let t = self.db.fetch_transaction_by_reference(MANUAL_SOURCE, &manual_ref).await?.ok_or_else(
                        || ReconciliationError::ReferenceNotFound(manual_ref.clone()),
                    )?;
                    debug!("🔄️💰️ [{source}:{reference}] was manually attributed to {owner}");
                    Ok(ReconciliationOutcome::AlreadyProcessed { transaction: t })
                },
                None => Err(ReconciliationError::OwnerResolutionFailed {
                    reference: reference.to_string(),
                    reason: queued.reason.clone(),
                    unattributed_id: queued.id,
                }),
            };
        }

        let owner_id = match self.resolve_owner(existing.as_ref(), &truth).await? {
            OwnerResolution::Resolved(owner) => owner,
            OwnerResolution::Unresolved(reason) => {
                let id = self.quarantine(kind, &truth, None, &reason).await?;
                return Err(ReconciliationError::OwnerResolutionFailed {
                    reference: reference.to_string(),
                    reason,
                    unattributed_id: id,
                });
            },
        };

        let (amount, rate) = match self.convert(&truth).await {
            Ok(v) => v,
            Err(e) => {
                let reason = format!("No usable exchange rate for {}: {e}", truth.currency);
                let id = self.quarantine(kind, &truth, None, &reason).await?;
                return Err(ReconciliationError::ConversionFailed {
                    reference: reference.to_string(),
                    reason,
                    unattributed_id: id,
                });
            },
        };

        let metadata = json!({
            "gateway_amount": truth.amount,
            "currency": truth.currency,
            "rate": rate.rate,
            "rate_as_of": rate.as_of,
            "requested_amount": existing.as_ref().map(|t| t.amount),
            "customer_email": truth.customer_email,
            "gateway_response": truth.raw,
        });
        let credit = CreditRequest {
            owner_id: owner_id.clone(),
            source: source.to_string(),
            reference: reference.to_string(),
            amount,
            description: format!("Deposit via {kind}"),
            metadata: Some(metadata.to_string()),
        };
        match self.db.credit_deposit(credit).await? {
            CreditResult::Credited { transaction, balance } => {
                info!("🔄️💰️ [{source}:{reference}] credited {amount} to {owner_id}. Balance is now {balance}");
                let event = DepositCreditedEvent::new(transaction.clone(), balance);
                publish_to_all(&self.producers.deposit_credited_producer, event).await;
                Ok(ReconciliationOutcome::Credited { transaction, balance })
            },
            CreditResult::AlreadyProcessed(transaction) => {
                debug!("🔄️💰️ [{source}:{reference}] was credited by a concurrent request");
                Ok(ReconciliationOutcome::AlreadyProcessed { transaction })
            },
            CreditResult::PreviouslyFailed(t) => {
                // The gateway took the money after we gave up on the payment. Nobody has been credited.
                let reason = format!(
                    "Gateway settled the payment after transaction #{} was marked {}",
                    t.id,
                    t.failure_reason.as_deref().unwrap_or("failed")
                );
                let id = self.quarantine(kind, &truth, Some(amount), &reason).await?;
                Err(ReconciliationError::OwnerResolutionFailed {
                    reference: reference.to_string(),
                    reason,
                    unattributed_id: id,
                })
            },
        }
    }

    /// Reconciles a deposit on behalf of the customer who initiated it. References that do not exist, or that belong to
    /// someone else, are reported as not found.
    pub async fn verify_deposit<G: PaymentGateway>(
        &self,
        gateway: &G,
        owner_id: &str,
        reference: &str,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let existing = self.db.fetch_transaction_by_reference(gateway.kind().as_str(), reference).await?;
        match existing {
            Some(t) if t.owner_id == owner_id => self.reconcile(gateway, reference).await,
            Some(_) => {
                warn!("🔄️💰️ {owner_id} asked to verify deposit {reference}, which belongs to someone else");
                Err(ReconciliationError::ReferenceNotFound(reference.to_string()))
            },
            None => Err(ReconciliationError::ReferenceNotFound(reference.to_string())),
        }
    }

    /// One pass of the pending-deposit poller.
    ///
    /// Deposits older than `min_age` are reconciled. Those still unsettled (or unknown to the gateway) after
    /// `expire_after` are marked [`FailureReason::Expired`].
    pub async fn reconcile_pending_deposits<G: PaymentGateway>(
        &self,
        gateways: &[G],
        min_age: Duration,
        expire_after: Duration,
        batch_size: i64,
    ) -> Result<PollSummary, ReconciliationError> {
        let now = Utc::now();
        let pending = self.db.fetch_pending_deposits(now - min_age, batch_size).await?;
        let mut summary = PollSummary::default();
        for deposit in pending {
            summary.checked += 1;
            let Some(gateway) = gateways.iter().find(|g| g.kind().as_str() == deposit.source) else {
                warn!("🔄️💰️ No gateway is configured for pending deposit #{} ({})", deposit.id, deposit.source);
                summary.errors += 1;
                continue;
            };
            let expired = deposit.created_at < now - expire_after;
            match self.reconcile(gateway, &deposit.external_reference).await {
                Ok(ReconciliationOutcome::Credited { .. }) | Ok(ReconciliationOutcome::AlreadyProcessed { .. }) => {
                    summary.credited += 1
                },
                Ok(ReconciliationOutcome::Failed { .. }) => summary.failed += 1,
                Ok(ReconciliationOutcome::Pending) | Err(ReconciliationError::ReferenceNotFound(_)) if expired => {
                    self.expire_deposit(gateway.kind(), &deposit).await?;
                    summary.expired += 1;
                },
                Ok(ReconciliationOutcome::Pending) | Err(ReconciliationError::ReferenceNotFound(_)) => {
                    summary.still_pending += 1
                },
                Err(e) => {
                    if !e.is_transient() {
                        error!("🔄️💰️ Pending deposit #{} could not be reconciled: {e}", deposit.id);
                    }
                    summary.errors += 1;
                },
            }
        }
        if summary.checked > 0 {
            info!("🔄️💰️ Pending deposit sweep: {summary:?}");
        }
        Ok(summary)
    }

    async fn expire_deposit(&self, kind: GatewayKind, deposit: &Transaction) -> Result<(), ReconciliationError> {
        let reference = &deposit.external_reference;
        if let Some(t) = self.db.fail_deposit(kind.as_str(), reference, FailureReason::Expired).await? {
            info!("🔄️💰️ Deposit #{} [{kind}:{reference}] expired without settling", t.id);
            let event =
                PaymentFailedEvent { gateway: kind, reference: reference.clone(), reason: FailureReason::Expired, transaction: Some(t) };
            publish_to_all(&self.producers.payment_failed_producer, event).await;
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        kind: GatewayKind,
        reference: &str,
        reason: FailureReason,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let transaction = self.db.fail_deposit(kind.as_str(), reference, reason).await?;
        let transaction = match transaction {
            Some(t) => Some(t),
            // Lost a race, or there never was a row. Report whatever is on file.
            None => self.db.fetch_transaction_by_reference(kind.as_str(), reference).await?,
        };
        if let Some(t) = &transaction {
            if t.status == TransactionStatus::Completed {
                debug!("🔄️💰️ [{kind}:{reference}] reported as {reason}, but it was already credited");
                return Ok(ReconciliationOutcome::AlreadyProcessed { transaction: t.clone() });
            }
        }
        info!("🔄️💰️ [{kind}:{reference}] failed at the gateway: {reason}");
        let event =
            PaymentFailedEvent { gateway: kind, reference: reference.to_string(), reason, transaction: transaction.clone() };
        publish_to_all(&self.producers.payment_failed_producer, event).await;
        Ok(ReconciliationOutcome::Failed { reason, transaction })
    }

    async fn resolve_owner(
        &self,
        pending: Option<&Transaction>,
        truth: &PaymentGroundTruth,
    ) -> Result<OwnerResolution, ReconciliationError> {
        if let Some(t) = pending {
            trace!("🔄️💰️ {} belongs to {} (pending transaction #{})", truth.reference, t.owner_id, t.id);
            return Ok(OwnerResolution::Resolved(t.owner_id.clone()));
        }
        if let Some(hint) = truth.owner_hint.as_deref().filter(|h| !h.trim().is_empty()) {
            if self.db.fetch_wallet(hint).await?.is_some() {
                debug!("🔄️💰️ {} attributed to {hint} via the embedded owner token", truth.reference);
                return Ok(OwnerResolution::Resolved(hint.to_string()));
            }
            warn!("🔄️💰️ {} carries owner token {hint}, but no such wallet exists", truth.reference);
        }
        let Some(email) = truth.customer_email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return Ok(OwnerResolution::Unresolved(
                "The payment carries neither a known owner token nor a billing email".to_string(),
            ));
        };
        let mut matches = self.db.fetch_wallets_by_email(email).await?;
        match matches.len() {
            0 => Ok(OwnerResolution::Unresolved(format!("No account is registered with billing email {email}"))),
            1 => {
                let owner = matches.remove(0).owner_id;
                debug!("🔄️💰️ {} attributed to {owner} via billing email", truth.reference);
                Ok(OwnerResolution::Resolved(owner))
            },
            n => Ok(OwnerResolution::Unresolved(format!("{n} accounts share billing email {email}"))),
        }
    }

    /// Converts the settled amount to the ledger currency. The returned rate is the one that was applied.
    async fn convert(&self, truth: &PaymentGroundTruth) -> Result<(MicroUsd, ExchangeRate), ExchangeRateError> {
        let rate = if truth.currency.eq_ignore_ascii_case(smsr_common::USD_CURRENCY_CODE) {
            ExchangeRate::usd()
        } else {
            self.db.fetch_last_rate(&truth.currency).await?
        };
        let amount = rate.to_micro_usd(truth.amount);
        trace!("💱️ {} {} => {amount} at {rate}", truth.amount, truth.currency);
        Ok((amount, rate))
    }

    /// Puts a paid payment in the manual attribution queue and raises the alarm. Returns the queue id.
    async fn quarantine(
        &self,
        kind: GatewayKind,
        truth: &PaymentGroundTruth,
        amount: Option<MicroUsd>,
        reason: &str,
    ) -> Result<i64, ReconciliationError> {
        let amount = match amount {
            Some(a) => Some(a),
            None => self.convert(truth).await.ok().map(|(a, _)| a),
        };
        let payment = NewUnattributedPayment {
            source: kind.as_str().to_string(),
            external_reference: truth.reference.clone(),
            gateway_amount: truth.amount,
            currency: truth.currency.clone(),
            amount,
            customer_email: truth.customer_email.clone(),
            reason: reason.to_string(),
            raw: Some(truth.raw.to_string()),
        };
        let record = self.db.record_unattributed_payment(payment).await?;
        error!(
            "🔄️💰️🚨️ Payment [{kind}:{}] of {} {} was received but could not be credited: {reason}. It is queued for \
             manual attribution as #{}",
            truth.reference, truth.amount, truth.currency, record.id
        );
        let id = record.id;
        publish_to_all(&self.producers.owner_resolution_failed_producer, OwnerResolutionFailedEvent::new(record)).await;
        Ok(id)
    }
}
