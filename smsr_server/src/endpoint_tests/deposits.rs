use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::json;
use smsr_engine::{
    db_types::{GatewayKind, MicroUsd},
    events::EventProducers,
    test_utils::{fakes::FakeGateway, prepare_env::new_test_database},
    traits::{AccountManagement, LedgerDatabase},
    DepositApi,
    ReconciliationApi,
    SqliteDatabase,
};

use super::helpers::{get_request, parse_json, post_request, user_token};
use crate::{
    config::ServerOptions,
    registry::GatewayRegistry,
    routes::{InitiateDepositRoute, VerifyDepositRoute},
};

#[actix_web::test]
async fn deposit_lifecycle() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("bob", Some("bob@example.com")).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Card, "secret");
    let token = user_token("bob");

    let (status, response) = post_request(
        &token,
        "/deposits",
        json!({ "gateway": "card", "amount": "10.00" }),
        configure(db.clone(), gateway.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = parse_json(&response);
    let reference = response["reference"].as_str().expect("No reference").to_string();
    assert!(reference.starts_with("dep_card_"));
    assert_eq!(response["checkout_url"], format!("https://checkout.example.test/{reference}"));
    let checkouts = gateway.checkouts();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].amount, 1_000);
    assert_eq!(checkouts[0].email.as_deref(), Some("bob@example.com"));

    // The customer comes back before paying
    let path = format!("/deposits/{reference}");
    let (status, response) = get_request(&token, &path, configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let response = parse_json(&response);
    assert_eq!(response["status"], "pending");
    assert_eq!(response["message"], "Payment not yet confirmed.");
    assert_eq!(response["transaction"]["external_reference"], reference.as_str());

    gateway.set_paid(&reference, 1_000, "USD");
    let (status, response) = get_request(&token, &path, configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let response = parse_json(&response);
    assert_eq!(response["status"], "credited");
    assert_eq!(response["message"], "Payment confirmed.");

    // Asking again never credits twice
    let (_, response) = get_request(&token, &path, configure(db.clone(), gateway.clone())).await;
    assert_eq!(parse_json(&response)["status"], "already_processed");
    let wallet = db.fetch_wallet("bob").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from_cents(1_000));
}

#[actix_web::test]
async fn other_peoples_deposits_are_not_found() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("bob", None).await.expect("Error registering wallet");
    db.register_wallet("eve", None).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Card, "secret");
    let (_, response) = post_request(
        &user_token("bob"),
        "/deposits",
        json!({ "gateway": "card", "amount": "5" }),
        configure(db.clone(), gateway.clone()),
    )
    .await;
    let reference = parse_json(&response)["reference"].as_str().expect("No reference").to_string();
    gateway.set_paid(&reference, 500, "USD");

    let path = format!("/deposits/{reference}");
    let (status, response) = get_request(&user_token("eve"), &path, configure(db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response, r#"{"error":"Reference not found."}"#);
    assert_eq!(gateway.lookups(), 0);

    let (status, _) =
        get_request(&user_token("eve"), "/deposits/not_a_reference", configure(db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let wallet = db.fetch_wallet("eve").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from(0));
}

#[actix_web::test]
async fn invalid_deposit_requests() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("bob", None).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Card, "secret");
    let token = user_token("bob");
    let cases = [
        json!({ "gateway": "card", "amount": "0" }),
        json!({ "gateway": "card", "amount": "-5.00" }),
        json!({ "gateway": "card", "amount": "ten dollars" }),
        json!({ "gateway": "card", "amount": "10.001" }),
        json!({ "gateway": "card", "amount": "10.00", "currency": "EUR" }),
        // Not configured on this server
        json!({ "gateway": "crypto", "amount": "10.00" }),
        // Below the gateway minimum
        json!({ "gateway": "card", "amount": "0.50" }),
    ];
    for case in cases {
        let (status, response) =
            post_request(&token, "/deposits", case.clone(), configure(db.clone(), gateway.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
        assert_eq!(response, r#"{"error":"Invalid request."}"#);
    }
    assert!(gateway.checkouts().is_empty());
}

#[actix_web::test]
async fn deposits_need_an_account() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let gateway = FakeGateway::new(GatewayKind::Card, "secret");
    let (status, response) = post_request(
        &user_token("stranger"),
        "/deposits",
        json!({ "gateway": "card", "amount": "10.00" }),
        configure(db, gateway),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response, r#"{"error":"Account not found."}"#);
}

fn configure(db: SqliteDatabase, gateway: FakeGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let deposits = DepositApi::new(db.clone(), EventProducers::default());
        let reconciliation = ReconciliationApi::new(db, EventProducers::default());
        cfg.service(InitiateDepositRoute::<SqliteDatabase, FakeGateway>::new())
            .service(VerifyDepositRoute::<SqliteDatabase, FakeGateway>::new())
            .app_data(web::Data::new(deposits))
            .app_data(web::Data::new(reconciliation))
            .app_data(web::Data::new(GatewayRegistry::new(vec![gateway])))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}
