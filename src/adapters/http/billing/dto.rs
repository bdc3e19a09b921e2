//! Request and response DTOs for billing endpoints.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::StatusView;
use crate::domain::billing::{SubscriptionPlan, SubscriptionStatus};
use crate::domain::foundation::Timestamp;

/// GET /api/billing/status response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: SubscriptionStatus,
    pub plan: Option<SubscriptionPlan>,
    pub trial_ends_at: Option<Timestamp>,
    pub subscription_ends_at: Option<Timestamp>,
    pub has_billing_account: bool,
}

impl From<StatusView> for StatusResponse {
    fn from(view: StatusView) -> Self {
        Self {
            status: view.status,
            plan: view.plan,
            trial_ends_at: view.trial_ends_at,
            subscription_ends_at: view.subscription_ends_at,
            has_billing_account: view.has_billing_account,
        }
    }
}

/// POST /api/billing/trial response.
#[derive(Debug, Clone, Serialize)]
pub struct StartTrialResponse {
    pub trial_ends_at: Timestamp,
}

/// POST /api/billing/checkout request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub plan: SubscriptionPlan,
    /// Origin the hosted flow redirects back to.
    pub origin: String,
}

/// POST /api/billing/checkout response.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// POST /api/billing/portal request body.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalRequest {
    pub origin: String,
}

/// POST /api/billing/portal response.
#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// POST /api/billing/cancel response.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub success: bool,
}

/// Webhook acknowledgment for processed or discarded events.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceived {
    pub received: bool,
}

/// Webhook acknowledgment for the provider's connectivity-test events.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookVerified {
    pub verified: bool,
}

/// Error envelope for all billing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
