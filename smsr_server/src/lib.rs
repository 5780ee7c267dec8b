//! # SMS reseller server
//! This crate hosts the HTTP server for the SMS reseller. It is responsible for:
//! * Receiving payment notifications from the gateways, checking their signatures and handing them to the
//!   reconciliation engine.
//! * The customer API: wallet balance, deposits, number purchases and history.
//! * Admin endpoints for exchange rates and the unattributed payments queue.
//! * Background workers that poll pending deposits, live numbers and exchange rates.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/{gateway}`: Payment notifications from the `card`, `bank` and `crypto` gateways.
//! * `/api/...`: Authenticated customer and admin endpoints. See [routes](routes/index.html).

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod notifications;
pub mod registry;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
