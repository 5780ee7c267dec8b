use actix_web::{http::StatusCode, web, web::ServiceConfig};
use serde_json::json;
use smsr_engine::{
    db_types::{GatewayKind, MicroUsd},
    events::EventProducers,
    test_utils::{fakes::FakeGateway, prepare_env::new_test_database},
    traits::{AccountManagement, LedgerDatabase},
    DepositApi,
    ExchangeRateApi,
    ReconciliationApi,
    ReconciliationError,
    SqliteDatabase,
};

use super::helpers::{admin_token, get_request, parse_json, post_request, user_token};
use crate::{
    config::ServerOptions,
    routes::{AssignUnattributedPaymentRoute, ExchangeRateRoute, SetExchangeRateRoute, UnattributedPaymentsRoute},
};

#[actix_web::test]
async fn admin_routes_need_the_admin_role() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let update = json!({ "currency": "NGN", "rate": "1550.50" });
    let (status, body) = post_request("", "/admin/exchange_rate", update.clone(), configure(db.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Unauthorized."}"#);

    let (status, body) =
        post_request(&user_token("alice"), "/admin/exchange_rate", update, configure(db.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, r#"{"error":"Forbidden."}"#);

    let (status, _) = get_request(&user_token("alice"), "/admin/unattributed", configure(db.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let assign = json!({ "owner_id": "alice" });
    let (status, _) = post_request(&user_token("alice"), "/admin/unattributed/1/assign", assign, configure(db)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn set_and_fetch_exchange_rate() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let update = json!({ "currency": "NGN", "rate": "1550.50" });
    let (status, body) =
        post_request(&admin_token("root"), "/admin/exchange_rate", update, configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(parse_json(&body)["rate"], "1550.50");

    let (status, body) = get_request(&user_token("alice"), "/exchange_rate?currency=NGN", configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let body = parse_json(&body);
    assert_eq!(body["currency"], "NGN");
    assert_eq!(body["rate"], "1550.50");

    let (status, _) = get_request(&user_token("alice"), "/exchange_rate?currency=EUR", configure(db.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let bad = json!({ "currency": "NGN", "rate": "lots" });
    let (status, _) = post_request(&admin_token("root"), "/admin/exchange_rate", bad, configure(db)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn assign_unattributed_payment() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    db.register_wallet("alice", None).await.expect("Error registering wallet");
    let gateway = FakeGateway::new(GatewayKind::Bank, "secret");
    gateway.set_paid_with_customer("pay_orphan", 4_000, "USD", None, Some("unknown@example.com"));
    let err = ReconciliationApi::new(db.clone(), EventProducers::default())
        .reconcile(&gateway, "pay_orphan")
        .await
        .expect_err("Payment should not be attributable");
    let ReconciliationError::OwnerResolutionFailed { unattributed_id, .. } = err else {
        panic!("Unexpected error {err}");
    };

    let (status, body) = get_request(&admin_token("root"), "/admin/unattributed", configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let queue = parse_json(&body);
    assert_eq!(queue.as_array().map(Vec::len), Some(1));
    assert_eq!(queue[0]["external_reference"], "pay_orphan");
    assert_eq!(queue[0]["id"], unattributed_id);

    let path = format!("/admin/unattributed/{unattributed_id}/assign");
    let (status, body) =
        post_request(&admin_token("root"), &path, json!({ "owner_id": "nobody" }), configure(db.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Account not found."}"#);

    let (status, body) =
        post_request(&admin_token("root"), &path, json!({ "owner_id": "alice" }), configure(db.clone())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(parse_json(&body)["status"], "credited");
    let wallet = db.fetch_wallet("alice").await.expect("Error fetching wallet").expect("No wallet");
    assert_eq!(wallet.balance, MicroUsd::from_cents(4_000));

    let (_, body) = get_request(&admin_token("root"), "/admin/unattributed", configure(db.clone())).await;
    assert_eq!(body, "[]");
    let (_, body) =
        get_request(&admin_token("root"), "/admin/unattributed?include_resolved=true", configure(db)).await;
    assert_eq!(parse_json(&body)[0]["resolved_owner_id"], "alice");
}

fn configure(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let rates = ExchangeRateApi::new(db.clone());
        let deposits = DepositApi::new(db, EventProducers::default());
        cfg.service(ExchangeRateRoute::<SqliteDatabase>::new())
            .service(SetExchangeRateRoute::<SqliteDatabase>::new())
            .service(UnattributedPaymentsRoute::<SqliteDatabase>::new())
            .service(AssignUnattributedPaymentRoute::<SqliteDatabase>::new())
            .app_data(web::Data::new(rates))
            .app_data(web::Data::new(deposits))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}
