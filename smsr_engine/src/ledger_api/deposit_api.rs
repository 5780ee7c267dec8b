//! Opening deposits and clearing the unattributed payments queue.
use std::fmt::Debug;

use log::*;
use serde_json::json;
use smsr_common::USD_CURRENCY_CODE;

use crate::{
    db_types::{CreditResult, FailureReason, MicroUsd, NewDeposit, UnattributedPayment},
    events::{publish_to_all, DepositCreditedEvent, EventProducers},
    helpers::new_deposit_reference,
    ledger_api::{
        errors::DepositError,
        exchange_objects::ExchangeRate,
        reconciliation_objects::{DepositInitiation, ReconciliationOutcome},
    },
    traits::{CheckoutRequest, ExchangeRateError, LedgerDatabase, LedgerError, PaymentGateway},
};

pub struct DepositApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for DepositApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepositApi")
    }
}

impl<B> DepositApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    /// Starts a deposit of `amount` minor units of `currency` through `gateway`.
    ///
    /// A pending transaction is written before the gateway is contacted, so a webhook that arrives before this call
    /// returns still finds its owner. If the gateway cannot open a checkout, the pending transaction is failed with
    /// [`FailureReason::SystemFailure`].
    pub async fn initiate_deposit<G: PaymentGateway>(
        &self,
        gateway: &G,
        owner_id: &str,
        amount: i64,
        currency: &str,
        callback_url: Option<String>,
    ) -> Result<DepositInitiation, DepositError> {
        let wallet =
            self.db.fetch_wallet(owner_id).await?.ok_or_else(|| DepositError::WalletNotFound(owner_id.to_string()))?;
        let rate = self.rate_for(currency).await?;
        let requested = rate.to_micro_usd(amount);
        let minimum = gateway.minimum_deposit();
        if requested < minimum {
            debug!("🏦️ {owner_id} asked to deposit {requested}, which is below the {} minimum", gateway.kind());
            return Err(DepositError::AmountTooSmall { minimum });
        }
        let kind = gateway.kind();
        let reference = new_deposit_reference(kind);
        let deposit = NewDeposit {
            owner_id: owner_id.to_string(),
            gateway: kind,
            reference: reference.clone(),
            requested_amount: requested,
            description: format!("Deposit via {kind}"),
            metadata: Some(
                json!({ "requested_amount": amount, "currency": rate.currency, "rate": rate.rate }).to_string(),
            ),
        };
        let transaction = self.db.insert_pending_deposit(deposit).await?;
        debug!("🏦️ Pending deposit #{} [{kind}:{reference}] created for {owner_id}", transaction.id);
        let request = CheckoutRequest {
            reference: reference.clone(),
            owner_id: owner_id.to_string(),
            email: wallet.email,
            amount,
            currency: rate.currency.clone(),
            callback_url,
        };
        match gateway.initialize_checkout(&request).await {
            Ok(session) => {
                info!("🏦️ Deposit [{kind}:{reference}] of {amount} {} opened for {owner_id}", rate.currency);
                Ok(DepositInitiation { transaction, reference, checkout_url: session.checkout_url })
            },
            Err(e) => {
                warn!("🏦️ Could not open a {kind} checkout for {reference}: {e}");
                if let Err(fail_err) = self.db.fail_deposit(kind.as_str(), &reference, FailureReason::SystemFailure).await
                {
                    error!("🏦️ Could not mark deposit {reference} as failed: {fail_err}");
                }
                Err(e.into())
            },
        }
    }

    async fn rate_for(&self, currency: &str) -> Result<ExchangeRate, DepositError> {
        if currency.eq_ignore_ascii_case(USD_CURRENCY_CODE) {
            return Ok(ExchangeRate::usd());
        }
        match self.db.fetch_last_rate(currency).await {
            Ok(rate) => Ok(rate),
            Err(ExchangeRateError::RateDoesNotExist(_)) => Err(DepositError::UnsupportedCurrency(currency.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn unattributed_payments(&self, include_resolved: bool) -> Result<Vec<UnattributedPayment>, DepositError> {
        let payments = self.db.fetch_unattributed_payments(include_resolved).await?;
        Ok(payments)
    }

    /// Credits a queued payment to `owner_id`. Uses the converted amount recorded with the payment unless the
    /// operator supplies one.
    pub async fn assign_unattributed_payment(
        &self,
        id: i64,
        owner_id: &str,
        amount: Option<MicroUsd>,
    ) -> Result<ReconciliationOutcome, DepositError> {
        let payment = self
            .db
            .fetch_unattributed_payment_by_id(id)
            .await?
            .ok_or(DepositError::Ledger(LedgerError::UnattributedPaymentNotFound(id)))?;
        let amount = amount.or(payment.amount).ok_or(DepositError::AmountRequired(id))?;
        if !amount.is_positive() {
            return Err(DepositError::AmountTooSmall { minimum: MicroUsd::from(1) });
        }
        let result = self.db.assign_unattributed_payment(id, owner_id, amount).await.map_err(|e| match e {
            LedgerError::WalletNotFound(owner) => DepositError::WalletNotFound(owner),
            e => DepositError::Ledger(e),
        })?;
        match result {
            CreditResult::Credited { transaction, balance } => {
                info!(
                    "🏦️ Payment [{}:{}] manually credited to {owner_id} as {amount}. Balance is now {balance}",
                    payment.source, payment.external_reference
                );
                let event = DepositCreditedEvent::new(transaction.clone(), balance);
                publish_to_all(&self.producers.deposit_credited_producer, event).await;
                Ok(ReconciliationOutcome::Credited { transaction, balance })
            },
            CreditResult::AlreadyProcessed(transaction) => Ok(ReconciliationOutcome::AlreadyProcessed { transaction }),
            CreditResult::PreviouslyFailed(t) => {
                Err(DepositError::Ledger(LedgerError::InvalidStateTransition(format!("Transaction #{} has failed", t.id))))
            },
        }
    }
}
