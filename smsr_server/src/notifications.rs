use futures::future::BoxFuture;
use log::*;
use smsr_engine::events::{
    DepositCreditedEvent,
    EventHandlers,
    EventHooks,
    OwnerResolutionFailedEvent,
    PaymentFailedEvent,
    PurchaseCompletedEvent,
    ResourceRefundedEvent,
};

pub const EVENT_BUFFER_SIZE: usize = 25;

/// Hooks that write every ledger event to the log.
///
/// Unattributed payments are logged at `error` level: the money has arrived, no wallet has been credited, and only an
/// operator can fix it through the admin endpoints.
pub fn create_logging_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks
        .on_deposit_credited(|ev: DepositCreditedEvent| {
            let t = ev.transaction;
            info!(
                "📬️ Deposit [{}:{}] of {} credited to {}. Balance is now {}",
                t.source, t.external_reference, t.amount, t.owner_id, ev.balance
            );
            no_op()
        })
        .on_payment_failed(|ev: PaymentFailedEvent| {
            let owner = ev.transaction.as_ref().map(|t| t.owner_id.as_str()).unwrap_or("an unknown owner");
            info!("📬️ Payment [{}:{}] for {owner} failed: {}", ev.gateway, ev.reference, ev.reason);
            no_op()
        })
        .on_owner_resolution_failed(|ev: OwnerResolutionFailedEvent| {
            let p = ev.payment;
            error!(
                "📬️🚨️ ACTION REQUIRED: payment [{}:{}] of {} {} (customer email: {}) could not be attributed to a \
                 wallet. Reason: {}. Assign it with POST /api/admin/unattributed/{}/assign",
                p.source,
                p.external_reference,
                p.gateway_amount,
                p.currency,
                p.customer_email.as_deref().unwrap_or("none"),
                p.reason,
                p.id
            );
            no_op()
        })
        .on_purchase_completed(|ev: PurchaseCompletedEvent| {
            let r = ev.resource;
            info!(
                "📬️ {} bought {} for {} ({}/{}, upstream order {})",
                r.owner_id, r.resource_value, r.cost, r.service, r.country, r.upstream_id
            );
            no_op()
        })
        .on_resource_refunded(|ev: ResourceRefundedEvent| {
            info!(
                "📬️ Resource #{} for {} refunded: {} returned to the wallet",
                ev.resource.id, ev.resource.owner_id, ev.refund.amount
            );
            no_op()
        });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}
