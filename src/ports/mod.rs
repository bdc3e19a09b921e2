//! Ports - interfaces between the application core and the outside world.
//!
//! Adapters implement these traits; application handlers depend only on
//! the traits, never on concrete implementations.

mod billing_provider;
mod entitlement_store;

pub use billing_provider::{
    BillingProvider, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer,
    PortalSession, ProviderError, ProviderErrorCode, WebhookEvent, WebhookEventData,
    WebhookEventType,
};
pub use entitlement_store::{EntitlementKey, EntitlementStore, TrialGrant};
