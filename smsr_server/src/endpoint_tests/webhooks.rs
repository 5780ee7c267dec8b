use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use smsr_engine::{
    db_types::{FailureReason, GatewayKind, MicroUsd, NewDeposit, TransactionStatus},
    events::EventProducers,
    test_utils::{fakes::FakeGateway, prepare_env::new_test_database},
    traits::{AccountManagement, LedgerDatabase},
    ReconciliationApi,
    SqliteDatabase,
};

use super::helpers::{parse_json, send};
use crate::{config::ServerOptions, registry::GatewayRegistry, routes::WebhookRoute};

const SECRET: &str = "card-webhook-secret";

fn signed_webhook(gateway: &FakeGateway, reference: &str) -> TestRequest {
    let body = FakeGateway::webhook_body(reference);
    TestRequest::post()
        .uri("/webhook/card")
        .insert_header(("x-fake-signature", gateway.sign(&body)))
        .set_payload(body)
}

#[actix_web::test]
async fn credits_a_paid_deposit_once() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("alice", None).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    gateway.set_paid_with_customer("pay_001", 2_500, "USD", Some("alice"), None);

    let (status, body) = send(signed_webhook(&gateway, "pay_001"), configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let body = parse_json(&body);
    assert_eq!(body["status"], "credited");
    assert_eq!(body["message"], "Payment confirmed.");
    assert_eq!(body["balance"], 25_000_000);

    // The gateway redelivers
    let (status, body) = send(signed_webhook(&gateway, "pay_001"), configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(&body)["status"], "already_processed");
    let wallet = db.fetch_wallet("alice").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from_cents(2_500));
}

#[actix_web::test]
async fn expired_payment_fails_the_deposit() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("alice", None).await.expect("Error registering wallet");
    let deposit = NewDeposit {
        owner_id: "alice".into(),
        gateway: GatewayKind::Card,
        reference: "dep_card_77".into(),
        requested_amount: MicroUsd::from_usd(5),
        description: "Deposit via card".into(),
        metadata: None,
    };
    db.insert_pending_deposit(deposit).await.expect("Error saving deposit");
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    gateway.set_failed("dep_card_77", FailureReason::Expired);

    let (status, body) = send(signed_webhook(&gateway, "dep_card_77"), configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let body = parse_json(&body);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["message"], "Payment expired.");

    let t = db
        .fetch_transaction_by_reference("card", "dep_card_77")
        .await
        .expect("Error fetching deposit")
        .expect("Deposit not found");
    assert_eq!(t.status, TransactionStatus::Failed);
    assert_eq!(t.failure_reason.as_deref(), Some("expired"));
    let wallet = db.fetch_wallet("alice").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from_usd(0));
}

#[actix_web::test]
async fn rejects_bad_signatures_before_looking_anything_up() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    gateway.set_paid("pay_002", 2_500, "USD");

    let forged = FakeGateway::new(GatewayKind::Card, "not-the-secret");
    let body = FakeGateway::webhook_body("pay_002");
    let req = TestRequest::post()
        .uri("/webhook/card")
        .insert_header(("x-fake-signature", forged.sign(&body)))
        .set_payload(body.clone());
    let (status, response) = send(req, configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response, r#"{"error":"Invalid signature."}"#);

    let req = TestRequest::post().uri("/webhook/card").set_payload(body);
    let (status, _) = send(req, configure(db, gateway.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(gateway.lookups(), 0);
}

#[actix_web::test]
async fn unknown_gateways_are_not_found() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    let body = FakeGateway::webhook_body("pay_003");
    for path in ["/webhook/paypal", "/webhook/bank"] {
        let req = TestRequest::post()
            .uri(path)
            .insert_header(("x-fake-signature", gateway.sign(&body)))
            .set_payload(body.clone());
        let (status, response) = send(req, configure(db.clone(), gateway.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response, r#"{"error":"Reference not found."}"#);
    }
}

#[actix_web::test]
async fn unreadable_body_is_a_bad_request() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    let body = br#"{"event":"charge.success","data":{}}"#.to_vec();
    let req = TestRequest::post()
        .uri("/webhook/card")
        .insert_header(("x-fake-signature", gateway.sign(&body)))
        .set_payload(body);
    let (status, response) = send(req, configure(db, gateway)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, r#"{"error":"Invalid request."}"#);
}

#[actix_web::test]
async fn unreachable_gateway_asks_for_redelivery() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("alice", None).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    gateway.set_unavailable("pay_004");
    let (status, body) = send(signed_webhook(&gateway, "pay_004"), configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, r#"{"error":"Payment gateway is currently unavailable."}"#);

    // A reference the gateway has never heard of
    let (status, _) = send(signed_webhook(&gateway, "pay_unknown"), configure(db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let wallet = db.fetch_wallet("alice").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from(0));
}

#[actix_web::test]
async fn unattributable_payment_is_queued_for_review() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("alice", Some("alice@example.com")).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Card, SECRET);
    gateway.set_paid_with_customer("pay_005", 4_000, "USD", Some("ghost"), Some("stranger@example.com"));

    let (status, body) = send(signed_webhook(&gateway, "pay_005"), configure(db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::OK);
    let body = parse_json(&body);
    assert_eq!(body["status"], "queued_for_review");
    assert_eq!(body["message"], crate::data_objects::QUEUED_FOR_REVIEW_MESSAGE);

    let queued = db.fetch_unattributed_payments(false).await.expect("Error fetching unattributed payments");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].external_reference, "pay_005");
    let wallet = db.fetch_wallet("alice").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from(0));
}

fn configure(db: SqliteDatabase, gateway: FakeGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = ReconciliationApi::new(db, EventProducers::default());
        cfg.service(WebhookRoute::<SqliteDatabase, FakeGateway>::new())
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(GatewayRegistry::new(vec![gateway])))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}
