use std::str::FromStr;

use chrono::Utc;
use rand::Rng;

use crate::db_types::GatewayKind;

/// A fresh, unguessable payment reference for a new deposit on the given gateway.
pub fn new_deposit_reference(gateway: GatewayKind) -> String {
    let nonce: u64 = rand::thread_rng().gen();
    format!("dep_{gateway}_{}_{nonce:016x}", Utc::now().timestamp())
}

/// The gateway a deposit reference was issued for, if it is one of ours.
pub fn deposit_reference_gateway(reference: &str) -> Option<GatewayKind> {
    let rest = reference.strip_prefix("dep_")?;
    let (gateway, _) = rest.split_once('_')?;
    GatewayKind::from_str(gateway).ok()
}

/// The placeholder reference a purchase reservation carries until the upstream assigns an order id.
pub fn new_reservation_reference() -> String {
    let nonce: u64 = rand::thread_rng().gen();
    format!("rsv_{nonce:016x}")
}
