//! Billing provider port for external payment processing.
//!
//! Defines the contract for the payment gateway integration (Stripe).
//! The provider is the authoritative system for subscription lifecycle;
//! this service mirrors its decisions locally and never collects payment
//! credentials itself.
//!
//! # Design
//!
//! - **Injected, not global**: handlers receive an `Arc<dyn BillingProvider>`,
//!   so tests substitute a fake without module-level patching.
//! - **Decoded at the boundary**: `verify_webhook` authenticates the raw
//!   payload and decodes it once into the closed [`WebhookEvent`] union;
//!   the reconciler pattern-matches variants instead of probing optional
//!   JSON fields.
//! - **Bounded**: implementations time-box every API call and report
//!   timeouts as retryable errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::SubscriptionPlan;
use crate::domain::foundation::UserId;

/// Port for the external billing provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a billing customer for a user.
    ///
    /// Called at most once per user; the returned id is persisted and
    /// reused by all subsequent checkout/portal calls.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, ProviderError>;

    /// Create a hosted checkout session for a paid plan.
    ///
    /// The session carries the user's identity and plan as opaque metadata
    /// so the eventual webhook can be attributed without a secondary
    /// lookup. Does not change local state.
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Create a hosted billing-management session for an existing customer.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, ProviderError>;

    /// Request deferred cancellation; access continues until period end.
    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<(), ProviderError>;

    /// Authenticate a webhook payload and decode it.
    ///
    /// Verification is computed over the exact byte stream; on signature
    /// mismatch no event is produced, no matter how well-formed the
    /// payload looks.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, ProviderError>;
}

/// Request to create a billing customer.
#[derive(Debug, Clone)]
pub struct CreateCustomerRequest {
    /// Internal user id, stored as provider-side metadata.
    pub user_id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Customer in the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Provider's customer id (`cus_...`).
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Provider creation time (Unix seconds).
    pub created_at: i64,
}

/// Request to create a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutRequest {
    pub user_id: UserId,
    /// Existing provider customer id for this user.
    pub customer_id: String,
    pub plan: SubscriptionPlan,
    pub success_url: String,
    pub cancel_url: String,
}

/// Hosted checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session id (`cs_...`).
    pub id: String,
    /// Redirect URL for the user to complete payment.
    pub url: String,
}

/// Hosted billing portal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Reserved prefix of the provider's synthetic connectivity-test events.
const VERIFICATION_EVENT_PREFIX: &str = "evt_test_";

/// Authenticated webhook event, decoded into domain shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Provider event id (`evt_...`). The same id may be delivered more
    /// than once.
    pub id: String,
    pub event_type: WebhookEventType,
    pub data: WebhookEventData,
    /// When the provider created the event (Unix seconds).
    pub created_at: i64,
}

impl WebhookEvent {
    /// Whether this is a synthetic verification event from the provider's
    /// own connectivity tests, answered without reaching the reconciler.
    pub fn is_verification_test(&self) -> bool {
        self.id.starts_with(VERIFICATION_EVENT_PREFIX)
    }
}

/// Recognized webhook event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    /// `checkout.session.completed`
    CheckoutCompleted,
    /// `customer.subscription.updated`
    SubscriptionUpdated,
    /// `customer.subscription.deleted`
    SubscriptionDeleted,
    /// `invoice.payment_failed`
    InvoicePaymentFailed,
    /// Any other authentic event; logged and discarded, never an error.
    Unknown(String),
}

/// Per-kind event payload with a fixed field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventData {
    /// Checkout session object. Carries user identity and plan as metadata
    /// echoed back from session creation.
    Checkout {
        session_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        user_id: Option<String>,
        plan: Option<String>,
    },

    /// Subscription object. No user metadata; keyed by customer id.
    Subscription {
        subscription_id: String,
        customer_id: String,
        /// Provider's own status vocabulary, mapped by the reconciler.
        status: String,
        current_period_end: Option<i64>,
    },

    /// Invoice object. No user metadata; keyed by customer id.
    Invoice {
        invoice_id: String,
        customer_id: String,
        subscription_id: Option<String>,
    },

    /// Raw JSON for unrecognized event types.
    Raw { json: String },
}

/// Errors from billing provider operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
    /// Whether the caller may retry the operation.
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ApiError, message)
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidWebhook, message)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Provider error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Network connectivity issue.
    NetworkError,
    /// The bounded call deadline elapsed.
    Timeout,
    /// API authentication failed.
    AuthenticationError,
    /// Provider rejected the request.
    ApiError,
    /// Webhook signature or payload invalid.
    InvalidWebhook,
}

impl ProviderErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorCode::NetworkError | ProviderErrorCode::Timeout
        )
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::NetworkError => "network_error",
            ProviderErrorCode::Timeout => "timeout",
            ProviderErrorCode::AuthenticationError => "authentication_error",
            ProviderErrorCode::ApiError => "api_error",
            ProviderErrorCode::InvalidWebhook => "invalid_webhook",
        };
        write!(f, "{}", s)
    }
}
