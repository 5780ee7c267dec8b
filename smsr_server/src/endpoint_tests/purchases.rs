use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::json;
use smsr_engine::{
    db_types::{GatewayKind, MicroUsd},
    events::EventProducers,
    test_utils::{
        fakes::{FakeGateway, FakeNumberProvider},
        prepare_env::new_test_database,
    },
    traits::{AccountManagement, LedgerDatabase, ProviderError},
    PricingConfig,
    PurchaseApi,
    ReconciliationApi,
    SqliteDatabase,
};

use super::helpers::{parse_json, post_request, user_token};
use crate::routes::{CancelResourceRoute, PurchaseRoute};

async fn funded_wallet(db: &SqliteDatabase, owner_id: &str, cents: i64) {
    db.register_wallet(owner_id, None).await.expect("Error registering wallet");
    if cents > 0 {
        let gateway = FakeGateway::new(GatewayKind::Card, "secret");
        let reference = format!("pay_{owner_id}");
        gateway.set_paid_with_customer(&reference, cents, "USD", Some(owner_id), None);
        ReconciliationApi::new(db.clone(), EventProducers::default())
            .reconcile(&gateway, &reference)
            .await
            .expect("Error funding wallet");
    }
}

async fn balance(db: &SqliteDatabase, owner_id: &str) -> MicroUsd {
    db.fetch_wallet(owner_id).await.expect("Error fetching wallet").expect("No wallet").balance
}

#[actix_web::test]
async fn insufficient_balance_reports_the_shortfall() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    funded_wallet(&db, "carol", 100).await;
    let provider = FakeNumberProvider::new(MicroUsd::from_usd(1));
    let (status, body) = post_request(
        &user_token("carol"),
        "/purchases",
        json!({ "service": "telegram", "country": "usa" }),
        configure(db.clone(), provider.clone()),
    )
    .await;
    // $1.00 wholesale plus 25% is $1.25, and carol has $1.00
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Insufficient balance. You need $0.25 more."}"#);
    assert_eq!(provider.orders(), 0);
    assert_eq!(balance(&db, "carol").await, MicroUsd::from_cents(100));
}

#[actix_web::test]
async fn purchase_and_cancel() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    funded_wallet(&db, "carol", 500).await;
    let provider = FakeNumberProvider::new(MicroUsd::from_usd(1));
    let token = user_token("carol");
    let (status, body) = post_request(
        &token,
        "/purchases",
        json!({ "service": " Telegram ", "country": "USA" }),
        configure(db.clone(), provider.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let receipt = parse_json(&body);
    assert_eq!(receipt["resource"]["service"], "telegram");
    assert_eq!(receipt["resource"]["country"], "usa");
    assert_eq!(receipt["resource"]["resource_value"], "+15550000001");
    assert_eq!(receipt["balance"], 3_750_000);
    let id = receipt["resource"]["id"].as_i64().expect("No resource id");

    let path = format!("/resources/{id}/cancel");
    let (status, body) = post_request(&token, &path, json!({}), configure(db.clone(), provider.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(parse_json(&body)["balance"], 5_000_000);
    assert_eq!(provider.cancelled(), vec!["order-1".to_string()]);

    // Only once
    let (status, _) = post_request(&token, &path, json!({}), configure(db.clone(), provider.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(balance(&db, "carol").await, MicroUsd::from_cents(500));
}

#[actix_web::test]
async fn cannot_cancel_someone_elses_number() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    funded_wallet(&db, "carol", 500).await;
    funded_wallet(&db, "mallory", 0).await;
    let provider = FakeNumberProvider::new(MicroUsd::from_usd(1));
    let (_, body) = post_request(
        &user_token("carol"),
        "/purchases",
        json!({ "service": "whatsapp", "country": "uk" }),
        configure(db.clone(), provider.clone()),
    )
    .await;
    let id = parse_json(&body)["resource"]["id"].as_i64().expect("No resource id");
    let path = format!("/resources/{id}/cancel");
    let (status, body) =
        post_request(&user_token("mallory"), &path, json!({}), configure(db.clone(), provider.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Reference not found."}"#);
    assert!(provider.cancelled().is_empty());
    assert_eq!(balance(&db, "mallory").await, MicroUsd::from(0));
}

#[actix_web::test]
async fn provider_failure_leaves_the_balance_alone() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    funded_wallet(&db, "carol", 500).await;
    let provider = FakeNumberProvider::new(MicroUsd::from_usd(1));
    provider.fail_requests(Some(ProviderError::Unavailable("no numbers left at 10.1.2.3".into())));
    let (status, body) = post_request(
        &user_token("carol"),
        "/purchases",
        json!({ "service": "telegram", "country": "usa" }),
        configure(db.clone(), provider),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, r#"{"error":"Number provisioning is currently unavailable."}"#);
    assert_eq!(balance(&db, "carol").await, MicroUsd::from_cents(500));
    let resources = db.fetch_resources_for_owner("carol", 10, 0).await.expect("Error fetching resources");
    assert!(resources.is_empty());
}

#[actix_web::test]
async fn blank_purchase_request() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    funded_wallet(&db, "carol", 500).await;
    let provider = FakeNumberProvider::new(MicroUsd::from_usd(1));
    let (status, body) = post_request(
        &user_token("carol"),
        "/purchases",
        json!({ "service": "  ", "country": "usa" }),
        configure(db, provider.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid request."}"#);
    assert_eq!(provider.orders(), 0);
}

fn configure(db: SqliteDatabase, provider: FakeNumberProvider) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = PurchaseApi::new(db, provider, EventProducers::default(), PricingConfig::default());
        cfg.service(PurchaseRoute::<SqliteDatabase, FakeNumberProvider>::new())
            .service(CancelResourceRoute::<SqliteDatabase, FakeNumberProvider>::new())
            .app_data(web::Data::new(api));
    }
}
