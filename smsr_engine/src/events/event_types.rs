use serde::{Deserialize, Serialize};

use crate::db_types::{FailureReason, GatewayKind, MicroUsd, PurchasedResource, Transaction, UnattributedPayment};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCreditedEvent {
    pub transaction: Transaction,
    pub balance: MicroUsd,
}

impl DepositCreditedEvent {
    pub fn new(transaction: Transaction, balance: MicroUsd) -> Self {
        Self { transaction, balance }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub gateway: GatewayKind,
    pub reference: String,
    pub reason: FailureReason,
    /// The failed transaction, if one was on file
    pub transaction: Option<Transaction>,
}

/// Funds were received but no wallet could be credited. Subscribers are expected to alert an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerResolutionFailedEvent {
    pub payment: UnattributedPayment,
}

impl OwnerResolutionFailedEvent {
    pub fn new(payment: UnattributedPayment) -> Self {
        Self { payment }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseCompletedEvent {
    pub transaction: Transaction,
    pub resource: PurchasedResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRefundedEvent {
    pub refund: Transaction,
    pub resource: PurchasedResource,
}

#[derive(Debug, Clone)]
pub enum EventType {
    DepositCredited(DepositCreditedEvent),
    PaymentFailed(PaymentFailedEvent),
    OwnerResolutionFailed(OwnerResolutionFailedEvent),
    PurchaseCompleted(PurchaseCompletedEvent),
    ResourceRefunded(ResourceRefundedEvent),
}
