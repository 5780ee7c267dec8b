//! Scriptable, in-process stand-ins for the external collaborators.
//!
//! Both fakes are cheap to clone and every clone shares the same script, so a test can keep a handle to adjust the
//! responses after handing a clone to the API under test.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    db_types::{FailureReason, GatewayKind, MicroUsd, ResourceStatus},
    traits::{
        CheckoutRequest,
        CheckoutSession,
        GatewayError,
        NumberProvider,
        NumberRequest,
        PaymentGateway,
        PaymentGroundTruth,
        ProviderError,
        ProvisionedNumber,
        SettlementStatus,
        SmsMessage,
        UpstreamStatus,
    },
};

//--------------------------------------     FakeGateway       ---------------------------------------------------------

#[derive(Debug, Default)]
struct GatewayScript {
    payments: HashMap<String, Result<PaymentGroundTruth, GatewayError>>,
    checkouts: Vec<CheckoutRequest>,
    checkout_error: Option<GatewayError>,
    lookup_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FakeGateway {
    kind: GatewayKind,
    secret: String,
    script: Arc<Mutex<GatewayScript>>,
    lookups: Arc<AtomicUsize>,
}

impl FakeGateway {
    pub fn new(kind: GatewayKind, secret: &str) -> Self {
        Self {
            kind,
            secret: secret.to_string(),
            script: Arc::new(Mutex::new(GatewayScript::default())),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The signature the fake accepts for `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        format!("{}:{}", self.secret, payload.len())
    }

    pub fn webhook_body(reference: &str) -> Vec<u8> {
        json!({ "event": "charge.success", "data": { "reference": reference } }).to_string().into_bytes()
    }

    fn set(&self, reference: &str, result: Result<PaymentGroundTruth, GatewayError>) {
        self.script.lock().expect("poisoned").payments.insert(reference.to_string(), result);
    }

    pub fn set_paid(&self, reference: &str, amount: i64, currency: &str) -> &Self {
        self.set(reference, Ok(ground_truth(reference, SettlementStatus::Paid, amount, currency)));
        self
    }

    /// Marks the payment paid and attaches the owner token and billing email the gateway would echo back.
    pub fn set_paid_with_customer(
        &self,
        reference: &str,
        amount: i64,
        currency: &str,
        owner_hint: Option<&str>,
        email: Option<&str>,
    ) -> &Self {
        let mut truth = ground_truth(reference, SettlementStatus::Paid, amount, currency);
        truth.owner_hint = owner_hint.map(String::from);
        truth.customer_email = email.map(String::from);
        self.set(reference, Ok(truth));
        self
    }

    pub fn set_pending(&self, reference: &str, amount: i64, currency: &str) -> &Self {
        self.set(reference, Ok(ground_truth(reference, SettlementStatus::Pending, amount, currency)));
        self
    }

    pub fn set_failed(&self, reference: &str, reason: FailureReason) -> &Self {
        self.set(reference, Err(GatewayError::PaymentFailed { reference: reference.to_string(), reason }));
        self
    }

    pub fn set_unavailable(&self, reference: &str) -> &Self {
        self.set(reference, Err(GatewayError::GatewayUnavailable("connection timed out".to_string())));
        self
    }

    pub fn fail_checkouts(&self, error: Option<GatewayError>) {
        self.script.lock().expect("poisoned").checkout_error = error;
    }

    /// Slows every ground-truth lookup down, to widen race windows in concurrency tests.
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        self.script.lock().expect("poisoned").lookup_delay = delay;
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.script.lock().expect("poisoned").checkouts.clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn ground_truth(reference: &str, status: SettlementStatus, amount: i64, currency: &str) -> PaymentGroundTruth {
    PaymentGroundTruth {
        status,
        amount,
        currency: currency.to_ascii_uppercase(),
        reference: reference.to_string(),
        owner_hint: None,
        customer_email: None,
        raw: json!({ "reference": reference, "amount": amount, "currency": currency }),
    }
}

impl PaymentGateway for FakeGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    fn signature_header(&self) -> &'static str {
        "x-fake-signature"
    }

    fn verify_webhook_authenticity(&self, raw_payload: &[u8], signature: Option<&str>) -> bool {
        !self.secret.is_empty() && signature.is_some_and(|s| s == self.sign(raw_payload))
    }

    fn extract_reference(&self, raw_payload: &[u8]) -> Result<String, GatewayError> {
        let body: Value = serde_json::from_slice(raw_payload).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        body["data"]["reference"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse("missing data.reference".to_string()))
    }

    async fn fetch_ground_truth(&self, reference: &str) -> Result<PaymentGroundTruth, GatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let (delay, result) = {
            let script = self.script.lock().expect("poisoned");
            (script.lookup_delay, script.payments.get(reference).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result.unwrap_or_else(|| Err(GatewayError::ReferenceNotFound(reference.to_string())))
    }

    async fn initialize_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let mut script = self.script.lock().expect("poisoned");
        if let Some(e) = script.checkout_error.clone() {
            return Err(e);
        }
        script.checkouts.push(request.clone());
        Ok(CheckoutSession {
            reference: request.reference.clone(),
            checkout_url: format!("https://checkout.example.test/{}", request.reference),
        })
    }
}

//--------------------------------------  FakeNumberProvider   ---------------------------------------------------------

#[derive(Debug)]
struct ProviderScript {
    price: MicroUsd,
    next_error: Option<ProviderError>,
    statuses: HashMap<String, UpstreamStatus>,
    cancelled: Vec<String>,
    refuse_cancel: bool,
    provision_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FakeNumberProvider {
    script: Arc<Mutex<ProviderScript>>,
    orders: Arc<AtomicUsize>,
}

impl FakeNumberProvider {
    pub fn new(price: MicroUsd) -> Self {
        let script = ProviderScript {
            price,
            next_error: None,
            statuses: HashMap::new(),
            cancelled: Vec::new(),
            refuse_cancel: false,
            provision_delay: None,
        };
        Self { script: Arc::new(Mutex::new(script)), orders: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn set_price(&self, price: MicroUsd) {
        self.script.lock().expect("poisoned").price = price;
    }

    /// Every `request_number` call fails with `error` until this is cleared.
    pub fn fail_requests(&self, error: Option<ProviderError>) {
        self.script.lock().expect("poisoned").next_error = error;
    }

    pub fn refuse_cancellations(&self, refuse: bool) {
        self.script.lock().expect("poisoned").refuse_cancel = refuse;
    }

    pub fn set_provision_delay(&self, delay: Option<Duration>) {
        self.script.lock().expect("poisoned").provision_delay = delay;
    }

    pub fn set_status(&self, upstream_id: &str, status: ResourceStatus) {
        let mut script = self.script.lock().expect("poisoned");
        let entry = script
            .statuses
            .entry(upstream_id.to_string())
            .or_insert_with(|| UpstreamStatus { status, messages: vec![] });
        entry.status = status;
    }

    pub fn deliver_sms(&self, upstream_id: &str, text: &str, code: &str) {
        let mut script = self.script.lock().expect("poisoned");
        let entry = script
            .statuses
            .entry(upstream_id.to_string())
            .or_insert_with(|| UpstreamStatus { status: ResourceStatus::Active, messages: vec![] });
        entry.messages.push(SmsMessage {
            sender: Some("Service".to_string()),
            text: text.to_string(),
            code: Some(code.to_string()),
            received_at: Utc::now(),
        });
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.script.lock().expect("poisoned").cancelled.clone()
    }

    /// How many numbers were handed out.
    pub fn orders(&self) -> usize {
        self.orders.load(Ordering::SeqCst)
    }
}

impl NumberProvider for FakeNumberProvider {
    async fn quote_price(&self, _request: &NumberRequest) -> Result<MicroUsd, ProviderError> {
        Ok(self.script.lock().expect("poisoned").price)
    }

    async fn request_number(&self, request: &NumberRequest) -> Result<ProvisionedNumber, ProviderError> {
        let (delay, error, price) = {
            let script = self.script.lock().expect("poisoned");
            (script.provision_delay, script.next_error.clone(), script.price)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = error {
            return Err(e);
        }
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("📞️ Fake provider issuing a {}/{} number", request.service, request.country);
        let upstream_id = format!("order-{n}");
        self.script
            .lock()
            .expect("poisoned")
            .statuses
            .insert(upstream_id.clone(), UpstreamStatus { status: ResourceStatus::Active, messages: vec![] });
        Ok(ProvisionedNumber {
            upstream_id,
            phone_number: format!("+1555{n:07}"),
            wholesale_cost: price,
            expires_at: None,
        })
    }

    async fn check_status(&self, upstream_id: &str) -> Result<UpstreamStatus, ProviderError> {
        self.script
            .lock()
            .expect("poisoned")
            .statuses
            .get(upstream_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(upstream_id.to_string()))
    }

    async fn cancel(&self, upstream_id: &str) -> Result<(), ProviderError> {
        let mut guard = self.script.lock().expect("poisoned");
        let script = &mut *guard;
        if script.refuse_cancel {
            return Err(ProviderError::Rejected("order cannot be cancelled".to_string()));
        }
        match script.statuses.get_mut(upstream_id) {
            Some(s) => {
                s.status = ResourceStatus::Cancelled;
                script.cancelled.push(upstream_id.to_string());
                Ok(())
            },
            None => Err(ProviderError::NotFound(upstream_id.to_string())),
        }
    }
}
