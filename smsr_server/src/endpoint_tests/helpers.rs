use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use log::debug;
use serde_json::Value;
use smsr_common::Secret;

use crate::{
    auth::{JwtClaims, Role, TokenVerifier},
    config::AuthConfig,
};

// Signs tokens for endpoint tests only. DO NOT re-use this secret anywhere.
const TEST_JWT_SECRET: &str = "d1f0c5b2e9a8-endpoint-tests-only";

pub fn get_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: Secret::new(TEST_JWT_SECRET.to_string()),
        max_token_ttl: std::time::Duration::from_secs(3600),
    }
}

pub fn issue_token(owner_id: &str, roles: Vec<Role>, expiry: DateTime<Utc>) -> String {
    let claims = JwtClaims { sub: owner_id.to_string(), email: None, roles, exp: expiry.timestamp() };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()))
        .expect("Failed to sign token")
}

pub fn user_token(owner_id: &str) -> String {
    issue_token(owner_id, vec![Role::User], Utc::now() + Duration::minutes(30))
}

pub fn admin_token(owner_id: &str) -> String {
    issue_token(owner_id, vec![Role::User, Role::Admin], Utc::now() + Duration::minutes(30))
}

/// Sends `req` to an app built by `configure` and returns the status and body. Errors raised by middleware are
/// rendered the same way the server would render them.
pub async fn send(req: TestRequest, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let verifier = web::Data::new(TokenVerifier::new(&get_auth_config()));
    let app = App::new().app_data(verifier).configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = res.into_body().try_into_bytes().unwrap_or_default();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}

pub async fn get_request(
    token: &str,
    path: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let mut req = TestRequest::get().uri(path);
    if !token.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {token}")));
    }
    send(req, configure).await
}

pub async fn post_request(
    token: &str,
    path: &str,
    body: Value,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let mut req = TestRequest::post().uri(path).set_json(body);
    if !token.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {token}")));
    }
    send(req, configure).await
}

pub fn parse_json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}
