//! Billing-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | TrialAlreadyUsed | 409 |
//! | NoActiveSubscription | 404 |
//! | NoBillingAccount | 404 |
//! | InvalidPlan | 400 |
//! | InvalidWebhookSignature | 400 |
//! | ProviderFailed | 502 |
//! | ValidationFailed | 400 |
//! | Infrastructure | 500 |

use crate::domain::foundation::DomainError;

/// Billing operation errors.
///
/// Precondition violations are surfaced as named variants and never
/// downgraded to no-ops; `TrialAlreadyUsed` in particular is the only
/// defense against unlimited trial replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// The one-time trial has already been consumed.
    TrialAlreadyUsed,

    /// Cancellation requested without a subscription on file.
    NoActiveSubscription,

    /// Portal requested without a Stripe customer on file.
    NoBillingAccount,

    /// Plan is not purchasable through checkout.
    InvalidPlan(String),

    /// Webhook signature verification failed. Security-relevant.
    InvalidWebhookSignature,

    /// A provider API call failed.
    ProviderFailed { reason: String, retryable: bool },

    /// Request validation failed.
    ValidationFailed { field: String, message: String },

    /// Downstream infrastructure (entitlement store) failure.
    Infrastructure(String),
}

impl BillingError {
    pub fn invalid_plan(plan: impl Into<String>) -> Self {
        BillingError::InvalidPlan(plan.into())
    }

    pub fn provider_failed(reason: impl Into<String>, retryable: bool) -> Self {
        BillingError::ProviderFailed {
            reason: reason.into(),
            retryable,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::TrialAlreadyUsed => {
                "You have already used your free trial.".to_string()
            }
            BillingError::NoActiveSubscription => "No active subscription found".to_string(),
            BillingError::NoBillingAccount => "No billing account found".to_string(),
            BillingError::InvalidPlan(plan) => format!("Plan '{}' cannot be purchased", plan),
            BillingError::InvalidWebhookSignature => "Webhook signature invalid".to_string(),
            BillingError::ProviderFailed { reason, .. } => {
                format!("Billing provider error: {}", reason)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            BillingError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Infrastructure(_) => true,
            BillingError::ProviderFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        BillingError::Infrastructure(err.to_string())
    }
}
