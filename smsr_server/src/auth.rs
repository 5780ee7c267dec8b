//! Bearer-token authentication.
//!
//! Access tokens are issued by an external identity provider and signed with a shared HS256 secret. The server only
//! verifies them. The `sub` claim is the owner id of the caller's wallet.
use std::time::Duration;

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpMessage, HttpRequest};
use chrono::Utc;
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The owner id of the caller's wallet
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Expiry, in seconds since the epoch
    pub exp: i64,
}

impl JwtClaims {
    pub fn owner_id(&self) -> &str {
        &self.sub
    }

    pub fn has_roles(&self, roles: &[Role]) -> bool {
        roles.iter().all(|r| self.roles.contains(r))
    }
}

pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
    max_ttl: Duration,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let key = config
            .jwt_secret
            .is_configured()
            .then(|| DecodingKey::from_secret(config.jwt_secret.reveal().as_bytes()));
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self { key, validation, max_ttl: config.max_token_ttl }
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let key = self.key.as_ref().ok_or_else(|| {
            warn!("🔐️ Refusing access token because no JWT secret is configured");
            AuthError::ValidationError("no verification key is configured".into())
        })?;
        let data = decode::<JwtClaims>(token, key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::PoorlyFormattedToken(e.to_string())
            },
            _ => AuthError::ValidationError(e.to_string()),
        })?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::ValidationError("the subject claim is empty".into()));
        }
        let remaining = claims.exp - Utc::now().timestamp();
        if remaining > i64::try_from(self.max_ttl.as_secs()).unwrap_or(i64::MAX) {
            return Err(AuthError::ValidationError(format!("token lifetime of {remaining}s is too long")));
        }
        trace!("🔐️ Access token verified for {}", claims.sub);
        Ok(claims)
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let value = req.headers().get(header::AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::PoorlyFormattedToken("expected a Bearer token".into()))
}

/// Verifies the request's bearer token and caches the claims in the request extensions.
pub fn claims_from_request(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let cached = req.extensions().get::<JwtClaims>().cloned();
    if let Some(claims) = cached {
        return Ok(claims);
    }
    let verifier = req
        .app_data::<web::Data<TokenVerifier>>()
        .ok_or_else(|| ServerError::ConfigurationError("No token verifier has been registered".into()))?;
    let token = bearer_token(req)?;
    let claims = verifier.verify(token).map_err(|e| {
        debug!("🔐️ Access token rejected. {e}");
        e
    })?;
    req.extensions_mut().insert(claims.clone());
    Ok(claims)
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(claims_from_request(req))
    }
}

#[cfg(test)]
mod test {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use smsr_common::Secret;

    use super::*;

    const SECRET: &str = "unit-test-secret";

    fn verifier() -> TokenVerifier {
        let config = AuthConfig { jwt_secret: Secret::new(SECRET.into()), max_token_ttl: Duration::from_secs(3600) };
        TokenVerifier::new(&config)
    }

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let claims = JwtClaims {
            sub: sub.into(),
            email: Some("alice@example.com".into()),
            roles: vec![Role::User],
            exp: Utc::now().timestamp() + exp_offset,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).expect("encode")
    }

    #[test]
    fn valid_token() {
        let claims = verifier().verify(&token(SECRET, "alice", 600)).expect("valid token");
        assert_eq!(claims.owner_id(), "alice");
        assert!(claims.has_roles(&[Role::User]));
        assert!(!claims.has_roles(&[Role::Admin]));
    }

    #[test]
    fn expired_token() {
        let err = verifier().verify(&token(SECRET, "alice", -86_400)).expect_err("expired");
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn wrong_secret() {
        let err = verifier().verify(&token("another-secret", "alice", 600)).expect_err("bad signature");
        assert!(matches!(err, AuthError::ValidationError(_)));
    }

    #[test]
    fn garbage_and_overlong_tokens() {
        let err = verifier().verify("not.a.token").expect_err("garbage");
        assert!(matches!(err, AuthError::PoorlyFormattedToken(_)));
        let err = verifier().verify(&token(SECRET, "alice", 30 * 86_400)).expect_err("too long");
        assert!(matches!(err, AuthError::ValidationError(_)));
        let err = verifier().verify(&token(SECRET, " ", 600)).expect_err("empty subject");
        assert!(matches!(err, AuthError::ValidationError(_)));
    }

    #[test]
    fn unconfigured_secret_refuses_everything() {
        let verifier = TokenVerifier::new(&AuthConfig::default());
        let err = verifier.verify(&token("", "alice", 600)).expect_err("no secret");
        assert!(matches!(err, AuthError::ValidationError(_)));
    }
}
