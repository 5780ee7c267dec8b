use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DepositCreditedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OwnerResolutionFailedEvent,
    PaymentFailedEvent,
    PurchaseCompletedEvent,
    ResourceRefundedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub deposit_credited_producer: Vec<EventProducer<DepositCreditedEvent>>,
    pub payment_failed_producer: Vec<EventProducer<PaymentFailedEvent>>,
    pub owner_resolution_failed_producer: Vec<EventProducer<OwnerResolutionFailedEvent>>,
    pub purchase_completed_producer: Vec<EventProducer<PurchaseCompletedEvent>>,
    pub resource_refunded_producer: Vec<EventProducer<ResourceRefundedEvent>>,
}

pub struct EventHandlers {
    pub on_deposit_credited: Option<EventHandler<DepositCreditedEvent>>,
    pub on_payment_failed: Option<EventHandler<PaymentFailedEvent>>,
    pub on_owner_resolution_failed: Option<EventHandler<OwnerResolutionFailedEvent>>,
    pub on_purchase_completed: Option<EventHandler<PurchaseCompletedEvent>>,
    pub on_resource_refunded: Option<EventHandler<ResourceRefundedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_deposit_credited = hooks.on_deposit_credited.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_failed = hooks.on_payment_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_owner_resolution_failed = hooks.on_owner_resolution_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_purchase_completed = hooks.on_purchase_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_resource_refunded = hooks.on_resource_refunded.map(|f| EventHandler::new(buffer_size, f));
        Self {
            on_deposit_credited,
            on_payment_failed,
            on_owner_resolution_failed,
            on_purchase_completed,
            on_resource_refunded,
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_deposit_credited {
            result.deposit_credited_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_failed {
            result.payment_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_owner_resolution_failed {
            result.owner_resolution_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_purchase_completed {
            result.purchase_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_resource_refunded {
            result.resource_refunded_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_deposit_credited {
            tokio::spawn(async move { handler.start_handler().await });
        }
        if let Some(handler) = self.on_payment_failed {
            tokio::spawn(async move { handler.start_handler().await });
        }
        if let Some(handler) = self.on_owner_resolution_failed {
            tokio::spawn(async move { handler.start_handler().await });
        }
        if let Some(handler) = self.on_purchase_completed {
            tokio::spawn(async move { handler.start_handler().await });
        }
        if let Some(handler) = self.on_resource_refunded {
            tokio::spawn(async move { handler.start_handler().await });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_deposit_credited: Option<Handler<DepositCreditedEvent>>,
    pub on_payment_failed: Option<Handler<PaymentFailedEvent>>,
    pub on_owner_resolution_failed: Option<Handler<OwnerResolutionFailedEvent>>,
    pub on_purchase_completed: Option<Handler<PurchaseCompletedEvent>>,
    pub on_resource_refunded: Option<Handler<ResourceRefundedEvent>>,
}

impl EventHooks {
    pub fn on_deposit_credited<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DepositCreditedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_deposit_credited = Some(Arc::new(f));
        self
    }

    pub fn on_payment_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_failed = Some(Arc::new(f));
        self
    }

    pub fn on_owner_resolution_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OwnerResolutionFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_owner_resolution_failed = Some(Arc::new(f));
        self
    }

    pub fn on_purchase_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PurchaseCompletedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_purchase_completed = Some(Arc::new(f));
        self
    }

    pub fn on_resource_refunded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ResourceRefundedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_resource_refunded = Some(Arc::new(f));
        self
    }
}
