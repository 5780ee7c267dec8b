use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use cucumber::World;
use log::*;
use smsr_engine::{
    db_types::{GatewayKind, MicroUsd},
    events::{EventHandlers, EventHooks},
    test_utils::{
        fakes::{FakeGateway, FakeNumberProvider},
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    AccountApi,
    DepositApi,
    DepositError,
    DepositInitiation,
    ExchangeRateApi,
    PricingConfig,
    PurchaseApi,
    PurchaseError,
    PurchaseReceipt,
    ReconciliationApi,
    ReconciliationError,
    ReconciliationOutcome,
    RefundReceipt,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct LedgerWorld {
    pub system: Option<LedgerSystem>,
}

pub struct LedgerSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub card: FakeGateway,
    pub bank: FakeGateway,
    pub provider: FakeNumberProvider,
    pub accounts: AccountApi<SqliteDatabase>,
    pub reconciler: ReconciliationApi<SqliteDatabase>,
    pub deposits: DepositApi<SqliteDatabase>,
    pub purchases: PurchaseApi<SqliteDatabase, FakeNumberProvider>,
    pub rates: ExchangeRateApi<SqliteDatabase>,
    /// Deposit references by owner, most recent last
    pub references: HashMap<String, Vec<String>>,
    pub alerts: Arc<AtomicUsize>,
    pub last_outcome: Option<Result<ReconciliationOutcome, ReconciliationError>>,
    pub last_deposit: Option<Result<DepositInitiation, DepositError>>,
    pub last_purchase: Option<Result<PurchaseReceipt, PurchaseError>>,
    pub last_cancel: Option<Result<RefundReceipt, PurchaseError>>,
}

impl Debug for LedgerSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerSystem ({})", self.db_path)
    }
}

impl LedgerWorld {
    pub fn system(&self) -> &LedgerSystem {
        self.system.as_ref().expect("Ledger system not initialised")
    }

    pub fn system_mut(&mut self) -> &mut LedgerSystem {
        self.system.as_mut().expect("Ledger system not initialised")
    }

    pub fn gateway(&self, name: &str) -> &FakeGateway {
        let kind: GatewayKind = name.parse().expect("Unknown gateway");
        match kind {
            GatewayKind::Card => &self.system().card,
            GatewayKind::Bank => &self.system().bank,
            GatewayKind::Crypto => panic!("The crypto gateway is not part of the test system"),
        }
    }

    pub fn latest_reference(&self, owner: &str) -> String {
        self.system()
            .references
            .get(owner)
            .and_then(|refs| refs.last().cloned())
            .unwrap_or_else(|| panic!("{owner} has not started a deposit"))
    }
}

impl LedgerSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let alerts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&alerts);
        let mut hooks = EventHooks::default();
        hooks.on_owner_resolution_failed(move |_ev| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let handlers = EventHandlers::new(16, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let card = FakeGateway::new(GatewayKind::Card, "card-secret");
        let bank = FakeGateway::new(GatewayKind::Bank, "bank-secret");
        let provider = FakeNumberProvider::new(MicroUsd::from_usd(1));
        let pricing = PricingConfig { markup_bps: 2500, ..Default::default() };
        Self {
            db_path: url,
            accounts: AccountApi::new(db.clone()),
            reconciler: ReconciliationApi::new(db.clone(), producers.clone()),
            deposits: DepositApi::new(db.clone(), producers.clone()),
            purchases: PurchaseApi::new(db.clone(), provider.clone(), producers, pricing),
            rates: ExchangeRateApi::new(db.clone()),
            db,
            card,
            bank,
            provider,
            references: HashMap::new(),
            alerts,
            last_outcome: None,
            last_deposit: None,
            last_purchase: None,
            last_cancel: None,
        }
    }

    pub fn alerts(&self) -> usize {
        self.alerts.load(Ordering::SeqCst)
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
