use serde_json::Value;
use smsr_common::parse_decimal_amount;

use crate::ClientError;

/// The metadata key every gateway client uses to carry the wallet owner through a checkout.
pub const OWNER_METADATA_KEY: &str = "owner_id";

/// Converts an amount reported by a remote API (a JSON number or a numeric string) into integer minor units.
///
/// Digits beyond `decimals` are rounded half-up. Exponent notation is refused rather than guessed at.
pub fn decimal_to_minor_units(value: &Value, decimals: u32) -> Result<i64, ClientError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        v => return Err(ClientError::InvalidCurrencyAmount(v.to_string())),
    };
    if text.contains(['e', 'E']) {
        return Err(ClientError::InvalidCurrencyAmount(text));
    }
    let invalid = |_| ClientError::InvalidCurrencyAmount(text.clone());
    match text.split_once('.') {
        Some((whole, frac)) if frac.len() > decimals as usize => {
            let (kept, rest) = frac.split_at(decimals as usize);
            let truncated = parse_decimal_amount(&format!("{whole}.{kept}"), decimals).map_err(invalid)?;
            let round_up = rest.chars().next().is_some_and(|c| c >= '5');
            if !rest.chars().all(|c| c.is_ascii_digit()) {
                return Err(ClientError::InvalidCurrencyAmount(text.clone()));
            }
            match (round_up, whole.starts_with('-')) {
                (false, _) => Ok(truncated),
                (true, false) => Ok(truncated + 1),
                (true, true) => Ok(truncated - 1),
            }
        },
        _ => parse_decimal_amount(&text, decimals).map_err(invalid),
    }
}

/// Pulls the owner id out of gateway metadata, which some gateways hand back as an object and others as a
/// JSON-encoded string.
pub fn owner_from_metadata(metadata: &Value) -> Option<String> {
    let owner = match metadata {
        Value::Object(map) => map.get(OWNER_METADATA_KEY).and_then(Value::as_str).map(String::from),
        Value::String(s) => serde_json::from_str::<Value>(s).ok().as_ref().and_then(owner_from_metadata),
        _ => None,
    };
    owner.filter(|s| !s.trim().is_empty())
}
