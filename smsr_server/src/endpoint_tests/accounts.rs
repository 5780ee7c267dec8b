use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, Utc};
use log::debug;
use smsr_engine::{
    db_types::{MicroUsd, Wallet},
    test_utils::prepare_env::new_test_database,
    AccountApi,
    SqliteDatabase,
};

use super::helpers::{get_request, issue_token, parse_json, post_request, user_token};
use crate::{
    auth::Role,
    endpoint_tests::mocks::MockAccountManager,
    routes::{MyBalanceRoute, MyResourcesRoute, MyTransactionsRoute, RegisterAccountRoute},
};

#[actix_web::test]
async fn fetch_balance_no_token() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("", "/balance", configure(MockAccountManager::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Unauthorized."}"#);
}

#[actix_web::test]
async fn fetch_balance_expired_token() {
    let _ = env_logger::try_init().ok();
    let expired = Utc::now() - Duration::days(1);
    let token = issue_token("alice", vec![Role::User], expired);
    debug!("Calling /balance with expired token");
    let (status, body) = get_request(&token, "/balance", configure(MockAccountManager::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"Unauthorized."}"#);
}

#[actix_web::test]
async fn fetch_balance_tampered_token() {
    let _ = env_logger::try_init().ok();
    let mut token = user_token("alice");
    token.push('x');
    let (status, _) = get_request(&token, "/balance", configure(MockAccountManager::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn fetch_balance() {
    let _ = env_logger::try_init().ok();
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_wallet().withf(|owner| owner == "alice").times(1).returning(|owner| {
        Ok(Some(Wallet {
            owner_id: owner.to_string(),
            email: None,
            balance: MicroUsd::from_cents(1_250),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }))
    });
    let (status, body) = get_request(&user_token("alice"), "/balance", configure(accounts)).await;
    assert_eq!(status, StatusCode::OK);
    let body = parse_json(&body);
    assert_eq!(body["owner_id"], "alice");
    assert_eq!(body["balance"], 12_500_000);
    assert_eq!(body["display"], "$12.50");
}

#[actix_web::test]
async fn fetch_balance_unknown_account() {
    let _ = env_logger::try_init().ok();
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_wallet().returning(|_| Ok(None));
    let (status, body) = get_request(&user_token("nobody"), "/balance", configure(accounts)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"Account not found."}"#);
}

#[actix_web::test]
async fn database_errors_are_not_leaked() {
    let _ = env_logger::try_init().ok();
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_transactions_for_owner().returning(|_, _, _| {
        Err(smsr_engine::traits::AccountApiError::DatabaseError("disk I/O error at /var/lib/smsr.db".into()))
    });
    let (status, body) = get_request(&user_token("alice"), "/transactions", configure(accounts)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, r#"{"error":"Internal server error."}"#);
}

#[actix_web::test]
async fn transactions_are_paged() {
    let _ = env_logger::try_init().ok();
    let mut accounts = MockAccountManager::new();
    accounts
        .expect_fetch_transactions_for_owner()
        .withf(|owner, limit, offset| owner == "alice" && *limit == 10 && *offset == 20)
        .times(1)
        .returning(|_, _, _| Ok(vec![]));
    let (status, body) =
        get_request(&user_token("alice"), "/transactions?limit=10&offset=20", configure(accounts)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[actix_web::test]
async fn register_then_fetch_resources() {
    let _ = env_logger::try_init().ok();
    let db = new_test_database().await;
    let token = user_token("dave");
    let (status, body) = post_request(&token, "/account", serde_json::json!({}), configure_db(db.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let body = parse_json(&body);
    assert_eq!(body["owner_id"], "dave");
    assert_eq!(body["balance"], 0);

    // Registering again is harmless
    let (status, _) = post_request(&token, "/account", serde_json::json!({}), configure_db(db.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_request(&token, "/resources", configure_db(db)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

fn configure(accounts: MockAccountManager) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.service(MyBalanceRoute::<MockAccountManager>::new())
            .service(MyTransactionsRoute::<MockAccountManager>::new())
            .service(MyResourcesRoute::<MockAccountManager>::new())
            .app_data(web::Data::new(AccountApi::new(accounts)));
    }
}

fn configure_db(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.service(RegisterAccountRoute::<SqliteDatabase>::new())
            .service(MyResourcesRoute::<SqliteDatabase>::new())
            .app_data(web::Data::new(AccountApi::new(db)));
    }
}
