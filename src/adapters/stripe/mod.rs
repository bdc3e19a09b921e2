//! Stripe adapter - billing provider implementation.

mod mock_provider;
mod stripe_adapter;
pub mod webhook_types;

pub use mock_provider::MockBillingProvider;
pub use stripe_adapter::{StripeBillingProvider, StripeConfig};
