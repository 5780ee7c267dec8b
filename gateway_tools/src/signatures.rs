//! Webhook signature checks.
//!
//! Every gateway signs its webhook deliveries differently, but all checks share the same rules: a missing
//! signature, or a missing secret on our side, is a failed check. Comparisons never short-circuit on the first
//! differing byte.
use hmac::{digest::InvalidLength, Hmac, Mac};
use log::*;
use sha2::{Sha256, Sha512};
use smsr_common::Secret;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// How a gateway proves that it sent a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Hex-encoded HMAC-SHA512 of the raw body, keyed with the API secret
    HmacSha512Hex,
    /// Hex-encoded HMAC-SHA256 of the raw body, keyed with the API secret
    HmacSha256Hex,
    /// The header echoes a shared secret configured in the gateway dashboard
    SharedHash,
}

/// Whether webhook signatures are checked.
///
/// Production builds can only express [`VerificationStrategy::Enforce`]. The `BypassToken` variant, which also
/// accepts a fixed token in place of a signature, exists only when the crate is compiled with the
/// `signature_bypass` feature.
#[derive(Debug, Clone, Default)]
pub enum VerificationStrategy {
    #[default]
    Enforce,
    #[cfg(feature = "signature_bypass")]
    BypassToken(Secret<String>),
}

impl VerificationStrategy {
    pub fn verify(
        &self,
        scheme: SignatureScheme,
        secret: &Secret<String>,
        payload: &[u8],
        signature: Option<&str>,
    ) -> bool {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("🔐️ Webhook has no signature. Denying.");
            return false;
        };
        #[cfg(feature = "signature_bypass")]
        if let VerificationStrategy::BypassToken(token) = self {
            if token.is_configured() && constant_time_eq(token.reveal().as_bytes(), signature.as_bytes()) {
                warn!("🔐️ Webhook accepted with the bypass token. This must never happen in production.");
                return true;
            }
        }
        if !secret.is_configured() {
            error!("🔐️ No webhook secret is configured. Every webhook will be rejected.");
            return false;
        }
        let valid = match scheme {
            SignatureScheme::HmacSha512Hex => verify_hmac_sha512_hex(secret.reveal(), payload, signature),
            SignatureScheme::HmacSha256Hex => verify_hmac_sha256_hex(secret.reveal(), payload, signature),
            SignatureScheme::SharedHash => constant_time_eq(secret.reveal().as_bytes(), signature.as_bytes()),
        };
        if valid {
            trace!("🔐️ Webhook signature check ✅️");
        } else {
            warn!("🔐️ Invalid webhook signature. Denying.");
        }
        valid
    }
}

pub fn calculate_hmac_sha512_hex(secret: &str, data: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn calculate_hmac_sha256_hex(secret: &str, data: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_hmac_sha512_hex(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else { return false };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

fn verify_hmac_sha256_hex(secret: &str, data: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// Compares two byte strings in time that depends only on their lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
