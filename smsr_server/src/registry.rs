use smsr_engine::{db_types::GatewayKind, traits::PaymentGateway};

/// The payment gateways this deployment has credentials for.
pub struct GatewayRegistry<G> {
    gateways: Vec<G>,
}

impl<G: PaymentGateway> GatewayRegistry<G> {
    pub fn new(gateways: Vec<G>) -> Self {
        Self { gateways }
    }

    pub fn get(&self, kind: GatewayKind) -> Option<&G> {
        self.gateways.iter().find(|g| g.kind() == kind)
    }

    /// Looks a gateway up by its route name, e.g. `card`.
    pub fn by_name(&self, name: &str) -> Option<&G> {
        name.parse::<GatewayKind>().ok().and_then(|kind| self.get(kind))
    }

    pub fn all(&self) -> &[G] {
        &self.gateways
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}
