//! HTTP adapter for the billing module.

pub mod dto;
mod handlers;
mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::{billing_router, billing_routes};
