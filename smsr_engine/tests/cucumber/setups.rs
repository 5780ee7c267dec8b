use cucumber::given;
use smsr_common::parse_decimal_amount;
use smsr_engine::{traits::LedgerDatabase, ExchangeRate};

use crate::cucumber::{ledger_world::LedgerSystem, LedgerWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut LedgerWorld) {
    let system = LedgerSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "an account '{word}' with email '{word}'")]
async fn account_with_email(world: &mut LedgerWorld, owner: String, email: String) {
    world.system().accounts.register_account(&owner, Some(&email)).await.expect("Error registering account");
}

#[given(expr = "an account '{word}' without an email")]
async fn account_without_email(world: &mut LedgerWorld, owner: String) {
    world.system().db.register_wallet(&owner, None).await.expect("Error registering wallet");
}

#[given(expr = "the exchange rate is {word} {word} per USD")]
async fn exchange_rate(world: &mut LedgerWorld, rate: String, currency: String) {
    let rate = parse_decimal_amount(&rate, 2).expect("Invalid rate");
    world.system().rates.set_exchange_rate(&ExchangeRate::new(&currency, rate, None)).await.expect("Error setting rate");
}

#[given(expr = "the provider charges {word} per number")]
async fn provider_price(world: &mut LedgerWorld, price: String) {
    let price = crate::cucumber::steps::parse_usd(&price);
    world.system().provider.set_price(price);
}

#[given(expr = "'{word}' has deposited {word} {word}")]
async fn has_deposited(world: &mut LedgerWorld, owner: String, amount: String, currency: String) {
    let amount = parse_decimal_amount(&amount, 2).expect("Invalid amount");
    let system = world.system();
    let deposit = system
        .deposits
        .initiate_deposit(&system.card, &owner, amount, &currency, None)
        .await
        .expect("Error starting deposit");
    system.card.set_paid(&deposit.reference, amount, &currency);
    let outcome = system.reconciler.reconcile(&system.card, &deposit.reference).await.expect("Error reconciling");
    assert!(outcome.is_credited());
}
