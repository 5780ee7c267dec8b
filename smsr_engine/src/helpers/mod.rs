mod pricing;
mod references;

pub use pricing::apply_markup;
pub use references::{deposit_reference_gateway, new_deposit_reference, new_reservation_reference};
