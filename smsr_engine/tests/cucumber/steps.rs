use std::time::Duration;

use cucumber::{then, when};
use smsr_common::parse_decimal_amount;
use smsr_engine::{
    db_types::{FailureReason, MicroUsd, NewReservation, ResourceStatus, TransactionKind, TransactionStatus},
    events::EventProducers,
    traits::{AccountManagement, LedgerDatabase, NumberRequest, ProviderError},
    PricingConfig,
    PurchaseApi,
    PurchaseError,
    ReconciliationError,
    ReconciliationOutcome,
};

use crate::cucumber::LedgerWorld;

/// Parses "$12.50" or "12.50" into the ledger currency.
pub fn parse_usd(s: &str) -> MicroUsd {
    let cents = parse_decimal_amount(s.trim_start_matches('$'), 2).expect("Invalid dollar amount");
    MicroUsd::from_cents(cents)
}

fn minor_units(amount: &str) -> i64 {
    parse_decimal_amount(amount, 2).expect("Invalid amount")
}

//--------------------------------------      Deposits       ---------------------------------------------------------

#[when(expr = "'{word}' starts a {word} deposit of {word} {word}")]
async fn start_deposit(world: &mut LedgerWorld, owner: String, gateway: String, amount: String, currency: String) {
    let gw = world.gateway(&gateway).clone();
    let result =
        world.system().deposits.initiate_deposit(&gw, &owner, minor_units(&amount), &currency, None).await;
    let system = world.system_mut();
    if let Ok(deposit) = &result {
        system.references.entry(owner).or_default().push(deposit.reference.clone());
    }
    system.last_deposit = Some(result);
}

#[when(expr = "the {word} gateway is down for checkouts")]
async fn checkout_down(world: &mut LedgerWorld, gateway: String) {
    let err = smsr_engine::traits::GatewayError::GatewayUnavailable("503 Service Unavailable".into());
    world.gateway(&gateway).fail_checkouts(Some(err));
}

#[then(expr = "the deposit is rejected as {word}")]
async fn deposit_rejected(world: &mut LedgerWorld, kind: String) {
    let result = world.system().last_deposit.as_ref().expect("No deposit was attempted");
    let err = result.as_ref().err().unwrap_or_else(|| panic!("Expected deposit to fail, got {result:?}"));
    let actual = match err {
        smsr_engine::DepositError::AmountTooSmall { .. } => "too_small",
        smsr_engine::DepositError::UnsupportedCurrency(_) => "unsupported_currency",
        smsr_engine::DepositError::Gateway(_) => "gateway_error",
        smsr_engine::DepositError::WalletNotFound(_) => "no_wallet",
        e => panic!("Unexpected deposit error {e}"),
    };
    assert_eq!(actual, kind);
}

#[when(expr = "the {word} gateway reports the latest deposit of '{word}' as paid {word} {word}")]
async fn latest_paid(world: &mut LedgerWorld, gateway: String, owner: String, amount: String, currency: String) {
    let reference = world.latest_reference(&owner);
    world.gateway(&gateway).set_paid(&reference, minor_units(&amount), &currency);
}

#[when(expr = "the {word} gateway reports the latest deposit of '{word}' as pending")]
async fn latest_pending(world: &mut LedgerWorld, gateway: String, owner: String) {
    let reference = world.latest_reference(&owner);
    world.gateway(&gateway).set_pending(&reference, 0, "USD");
}

#[when(expr = "the {word} gateway reports the latest deposit of '{word}' as failed with reason {word}")]
async fn latest_failed(world: &mut LedgerWorld, gateway: String, owner: String, reason: String) {
    let reason: FailureReason = reason.parse().expect("Unknown failure reason");
    let reference = world.latest_reference(&owner);
    world.gateway(&gateway).set_failed(&reference, reason);
}

#[when(expr = "the {word} gateway reports payment [{word}] as paid {word} {word} with owner token '{word}'")]
async fn paid_with_token(
    world: &mut LedgerWorld,
    gateway: String,
    reference: String,
    amount: String,
    currency: String,
    owner: String,
) {
    world.gateway(&gateway).set_paid_with_customer(&reference, minor_units(&amount), &currency, Some(&owner), None);
}

#[when(expr = "the {word} gateway reports payment [{word}] as paid {word} {word} by '{word}'")]
async fn paid_with_email(
    world: &mut LedgerWorld,
    gateway: String,
    reference: String,
    amount: String,
    currency: String,
    email: String,
) {
    world.gateway(&gateway).set_paid_with_customer(&reference, minor_units(&amount), &currency, None, Some(&email));
}

#[when(expr = "the {word} gateway is unavailable for payment [{word}]")]
async fn gateway_unavailable(world: &mut LedgerWorld, gateway: String, reference: String) {
    world.gateway(&gateway).set_unavailable(&reference);
}

async fn deliver(world: &mut LedgerWorld, gateway: &str, reference: &str, times: usize) {
    let gw = world.gateway(gateway).clone();
    let mut last = None;
    for _ in 0..times {
        last = Some(world.system().reconciler.reconcile(&gw, reference).await);
    }
    world.system_mut().last_outcome = last;
}

#[when(expr = "the {word} webhook for the latest deposit of '{word}' is delivered {int} time(s)")]
async fn webhook_latest(world: &mut LedgerWorld, gateway: String, owner: String, times: usize) {
    let reference = world.latest_reference(&owner);
    deliver(world, &gateway, &reference, times).await;
}

#[when(expr = "the {word} webhook for payment [{word}] is delivered")]
async fn webhook_for_reference(world: &mut LedgerWorld, gateway: String, reference: String) {
    deliver(world, &gateway, &reference, 1).await;
}

#[when(expr = "'{word}' checks the latest deposit")]
async fn verify_latest(world: &mut LedgerWorld, owner: String) {
    let reference = world.latest_reference(&owner);
    let gw = world.system().card.clone();
    let result = world.system().reconciler.verify_deposit(&gw, &owner, &reference).await;
    world.system_mut().last_outcome = Some(result);
}

#[when(expr = "'{word}' checks the latest deposit of '{word}'")]
async fn verify_someone_elses(world: &mut LedgerWorld, owner: String, other: String) {
    let reference = world.latest_reference(&other);
    let gw = world.system().card.clone();
    let result = world.system().reconciler.verify_deposit(&gw, &owner, &reference).await;
    world.system_mut().last_outcome = Some(result);
}

#[when(expr = "the pending deposit sweep runs with an expiry of {int} seconds")]
async fn deposit_sweep(world: &mut LedgerWorld, expiry: i64) {
    // Give the deposits a moment to age past the minimum
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let gateways = vec![world.system().card.clone(), world.system().bank.clone()];
    world
        .system()
        .reconciler
        .reconcile_pending_deposits(&gateways, chrono::Duration::zero(), chrono::Duration::seconds(expiry), 100)
        .await
        .expect("Error running the deposit sweep");
}

#[then(expr = "the reconciliation outcome is {word}")]
async fn outcome_is(world: &mut LedgerWorld, expected: String) {
    let result = world.system().last_outcome.as_ref().expect("Nothing was reconciled");
    let actual = match result {
        Ok(ReconciliationOutcome::Credited { .. }) => "credited".to_string(),
        Ok(ReconciliationOutcome::AlreadyProcessed { .. }) => "already_processed".to_string(),
        Ok(ReconciliationOutcome::Pending) => "pending".to_string(),
        Ok(ReconciliationOutcome::Failed { reason, .. }) => format!("failed:{reason}"),
        Err(ReconciliationError::OwnerResolutionFailed { .. }) => "owner_resolution_failed".to_string(),
        Err(ReconciliationError::ConversionFailed { .. }) => "conversion_failed".to_string(),
        Err(ReconciliationError::GatewayUnavailable(_)) => "gateway_unavailable".to_string(),
        Err(ReconciliationError::ReferenceNotFound(_)) => "reference_not_found".to_string(),
        Err(e) => format!("error:{e}"),
    };
    assert_eq!(actual, expected);
}

#[then(expr = "the customer is told {string}")]
async fn customer_message(world: &mut LedgerWorld, message: String) {
    let result = world.system().last_outcome.as_ref().expect("Nothing was reconciled");
    let outcome = result.as_ref().expect("Reconciliation failed");
    assert_eq!(outcome.user_message(), message);
}

#[then(expr = "the latest deposit of '{word}' is {word}")]
async fn deposit_status(world: &mut LedgerWorld, owner: String, status: String) {
    let reference = world.latest_reference(&owner);
    let t = world
        .system()
        .accounts
        .transactions(&owner, 100, 0)
        .await
        .expect("Error fetching transactions")
        .into_iter()
        .find(|t| t.external_reference == reference)
        .expect("Deposit not found");
    let expected: TransactionStatus = status.parse().expect("Unknown status");
    assert_eq!(t.status, expected);
}

#[then(expr = "the latest deposit of '{word}' failed with reason {word}")]
async fn deposit_failure(world: &mut LedgerWorld, owner: String, reason: String) {
    let reference = world.latest_reference(&owner);
    let gateway = reference.split('_').nth(1).expect("Malformed reference").to_string();
    let t = world
        .system()
        .db
        .fetch_transaction_by_reference(&gateway, &reference)
        .await
        .expect("Error fetching transaction")
        .expect("Deposit not found");
    assert_eq!(t.status, TransactionStatus::Failed);
    assert_eq!(t.failure_reason.as_deref(), Some(reason.as_str()));
}

#[then(expr = "'{word}' has {int} completed deposit(s)")]
async fn completed_deposits(world: &mut LedgerWorld, owner: String, count: usize) {
    let deposits = world
        .system()
        .accounts
        .transactions(&owner, 100, 0)
        .await
        .expect("Error fetching transactions")
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Deposit && t.is_completed())
        .count();
    assert_eq!(deposits, count);
}

#[then(expr = "'{word}' has a balance of {word}")]
async fn balance_is(world: &mut LedgerWorld, owner: String, balance: String) {
    let wallet = world.system().accounts.wallet(&owner).await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance.to_string(), balance);
}

#[then(expr = "the gateway was asked about the payment {int} time(s)")]
async fn lookups(world: &mut LedgerWorld, count: usize) {
    assert_eq!(world.system().card.lookups(), count);
}

//--------------------------------------  Unattributed     ---------------------------------------------------------

#[then(expr = "there is/are {int} open unattributed payment(s)")]
async fn open_unattributed(world: &mut LedgerWorld, count: usize) {
    let open = world.system().deposits.unattributed_payments(false).await.expect("Error fetching payments");
    assert_eq!(open.len(), count);
}

#[then(expr = "an operator has been alerted {int} time(s)")]
async fn alerted(world: &mut LedgerWorld, count: usize) {
    // Event handlers run on their own tasks
    for _ in 0..20 {
        if world.system().alerts() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(world.system().alerts(), count);
}

#[when(expr = "an operator assigns the unattributed payment [{word}] to '{word}'")]
async fn assign_unattributed(world: &mut LedgerWorld, reference: String, owner: String) {
    let payment = world
        .system()
        .deposits
        .unattributed_payments(true)
        .await
        .expect("Error fetching payments")
        .into_iter()
        .find(|p| p.external_reference == reference)
        .expect("No such unattributed payment");
    world
        .system()
        .deposits
        .assign_unattributed_payment(payment.id, &owner, None)
        .await
        .expect("Error assigning payment");
}

//--------------------------------------      Purchases       ---------------------------------------------------------

#[when(expr = "'{word}' buys a {word} number in {word}")]
async fn buy_number(world: &mut LedgerWorld, owner: String, service: String, country: String) {
    let request = NumberRequest { service, country };
    let result = world.system().purchases.purchase(&owner, request).await;
    world.system_mut().last_purchase = Some(result);
}

#[when("the provider fails the next request")]
async fn provider_fails(world: &mut LedgerWorld) {
    world.system().provider.fail_requests(Some(ProviderError::NoNumbersAvailable("telegram/usa".into())));
}

#[then(expr = "the purchase succeeds for {word}")]
async fn purchase_succeeds(world: &mut LedgerWorld, charge: String) {
    let result = world.system().last_purchase.as_ref().expect("No purchase was attempted");
    let receipt = result.as_ref().unwrap_or_else(|e| panic!("Purchase failed: {e}"));
    assert_eq!(-receipt.transaction.amount, parse_usd(&charge));
    assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
    assert_eq!(receipt.resource.status, ResourceStatus::Active);
    assert!(receipt.resource.expiry_at > chrono::Utc::now());
}

#[then(expr = "the purchase fails with insufficient funds, short by {word}")]
async fn purchase_insufficient(world: &mut LedgerWorld, shortfall: String) {
    match world.system().last_purchase.as_ref().expect("No purchase was attempted") {
        Err(PurchaseError::InsufficientFunds { shortfall: s, .. }) => assert_eq!(*s, parse_usd(&shortfall)),
        other => panic!("Expected insufficient funds, got {other:?}"),
    }
}

#[then("the purchase fails because provisioning failed")]
async fn purchase_provisioning_failed(world: &mut LedgerWorld) {
    match world.system().last_purchase.as_ref().expect("No purchase was attempted") {
        Err(PurchaseError::ProvisioningFailed(_)) => {},
        other => panic!("Expected provisioning failure, got {other:?}"),
    }
}

#[then(expr = "'{word}' has {int} {word} number(s)")]
async fn resources_with_status(world: &mut LedgerWorld, owner: String, count: usize, status: String) {
    let resources = world.system().accounts.resources(&owner, 100, 0).await.expect("Error fetching resources");
    let n = resources.iter().filter(|r| r.status.to_string() == status).count();
    assert_eq!(n, count);
}

#[then(expr = "'{word}' has no pending reservations")]
async fn no_pending(world: &mut LedgerWorld, owner: String) {
    let transactions = world.system().accounts.transactions(&owner, 100, 0).await.expect("Error fetching transactions");
    assert!(transactions.iter().all(|t| t.kind != TransactionKind::Purchase || t.status != TransactionStatus::Pending));
}

#[when(expr = "'{word}' is left with an unfinished purchase of {word}")]
async fn abandoned_reservation(world: &mut LedgerWorld, owner: String, amount: String) {
    let reservation = NewReservation {
        owner_id: owner,
        amount: parse_usd(&amount),
        description: "Reserved for telegram/usa".into(),
        metadata: None,
    };
    world.system().db.reserve_funds(reservation).await.expect("Error reserving funds");
}

#[when(expr = "the reservation sweeper runs with a timeout of {int} seconds")]
async fn reservation_sweeper(world: &mut LedgerWorld, timeout: i64) {
    // Reservation ages are compared at one-second resolution
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let system = world.system();
    let pricing = PricingConfig { reservation_timeout: chrono::Duration::seconds(timeout), ..Default::default() };
    let api = PurchaseApi::new(system.db.clone(), system.provider.clone(), EventProducers::default(), pricing);
    api.release_stale_reservations().await.expect("Error releasing reservations");
}

async fn latest_resource_id(world: &LedgerWorld, owner: &str) -> (i64, String) {
    let resources = world.system().accounts.resources(owner, 1, 0).await.expect("Error fetching resources");
    let r = resources.first().expect("No resources");
    (r.id, r.upstream_id.clone())
}

#[when(expr = "'{word}' cancels their latest number")]
async fn cancel_latest(world: &mut LedgerWorld, owner: String) {
    let (id, _) = latest_resource_id(world, &owner).await;
    let result = world.system().purchases.cancel_purchase(&owner, id).await;
    world.system_mut().last_cancel = Some(result);
}

#[then(expr = "the cancellation is {word}")]
async fn cancellation_result(world: &mut LedgerWorld, expected: String) {
    let result = world.system().last_cancel.as_ref().expect("Nothing was cancelled");
    let actual = match result {
        Ok(_) => "refunded",
        Err(PurchaseError::NotCancellable(_)) => "refused",
        Err(PurchaseError::ResourceNotFound(_)) => "not_found",
        Err(e) => panic!("Unexpected cancellation error {e}"),
    };
    assert_eq!(actual, expected);
}

#[when(expr = "the provider reports the latest number of '{word}' as {word}")]
async fn upstream_status(world: &mut LedgerWorld, owner: String, status: String) {
    let (_, upstream_id) = latest_resource_id(world, &owner).await;
    let status = match status.as_str() {
        "cancelled" => ResourceStatus::Cancelled,
        "expired" => ResourceStatus::Expired,
        "completed" => ResourceStatus::Completed,
        s => panic!("Unsupported upstream status {s}"),
    };
    world.system().provider.set_status(&upstream_id, status);
}

#[when(expr = "an SMS with code {word} arrives for the latest number of '{word}'")]
async fn sms_arrives(world: &mut LedgerWorld, code: String, owner: String) {
    let (_, upstream_id) = latest_resource_id(world, &owner).await;
    world.system().provider.deliver_sms(&upstream_id, &format!("Your code is {code}"), &code);
}

#[when("the resource poller runs")]
async fn resource_poller(world: &mut LedgerWorld) {
    world.system().purchases.refresh_resource_statuses(100).await.expect("Error polling resources");
}
