//! Billing domain module.
//!
//! The subscription entitlement model: the per-user record mirroring
//! provider truth, the status and plan vocabularies, and billing errors.
//!
//! # Module Structure
//!
//! - `entitlement` - Entitlement record and partial updates
//! - `status` - SubscriptionStatus mirror enum
//! - `plan` - SubscriptionPlan and the static catalog
//! - `errors` - BillingError

mod entitlement;
mod errors;
mod plan;
mod status;

pub use entitlement::{Entitlement, EntitlementUpdate};
pub use errors::BillingError;
pub use plan::{plan_catalog, BillingInterval, PlanDetails, SubscriptionPlan};
pub use status::SubscriptionStatus;
