//! HTTP handlers for billing endpoints.
//!
//! These handlers connect axum routes to application layer command/query
//! handlers and translate `BillingError` into HTTP responses.

use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::handlers::billing::{
    BillingPortalCommand, BillingPortalHandler, CancelSubscriptionCommand,
    CancelSubscriptionHandler, CreateCheckoutCommand, CreateCheckoutHandler, GetStatusHandler,
    GetStatusQuery, ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookOutcome,
    StartTrialCommand, StartTrialHandler,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, EntitlementStore};

use super::dto::{
    CancelResponse, CheckoutRequest, CheckoutResponse, ErrorResponse, PortalRequest,
    PortalResponse, StartTrialResponse, StatusResponse, WebhookReceived, WebhookVerified,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for billing endpoints.
///
/// Cloned per request; dependencies are Arc-wrapped port implementations.
#[derive(Clone)]
pub struct BillingAppState {
    pub entitlement_store: Arc<dyn EntitlementStore>,
    pub billing_provider: Arc<dyn BillingProvider>,
}

impl BillingAppState {
    pub fn status_handler(&self) -> GetStatusHandler {
        GetStatusHandler::new(self.entitlement_store.clone())
    }

    pub fn trial_handler(&self) -> StartTrialHandler {
        StartTrialHandler::new(self.entitlement_store.clone())
    }

    pub fn checkout_handler(&self) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            self.entitlement_store.clone(),
            self.billing_provider.clone(),
        )
    }

    pub fn portal_handler(&self) -> BillingPortalHandler {
        BillingPortalHandler::new(
            self.entitlement_store.clone(),
            self.billing_provider.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.entitlement_store.clone(),
            self.billing_provider.clone(),
        )
    }

    pub fn webhook_handler(&self) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(
            self.entitlement_store.clone(),
            self.billing_provider.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// In production this is populated from the session by auth middleware;
/// the header-based extraction here serves development and testing.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let user_id = header("X-User-Id")
            .and_then(|s| s.parse::<UserId>().ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser {
            user_id,
            email: header("X-User-Email"),
            name: header("X-User-Name"),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/status - Current user's subscription status
pub async fn get_status(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .status_handler()
        .handle(GetStatusQuery {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(StatusResponse::from(view)))
}

/// POST /api/billing/trial - Start the one-time free trial
pub async fn start_trial(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state
        .trial_handler()
        .handle(StartTrialCommand {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(StartTrialResponse {
        trial_ends_at: result.trial_ends_at,
    }))
}

/// POST /api/billing/checkout - Start a hosted checkout flow
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state
        .checkout_handler()
        .handle(CreateCheckoutCommand {
            user_id: user.user_id,
            email: user.email,
            name: user.name,
            plan: request.plan,
            origin: request.origin,
        })
        .await?;

    Ok(Json(CheckoutResponse {
        url: result.redirect_url,
    }))
}

/// POST /api/billing/portal - Open the hosted billing portal
pub async fn billing_portal(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<PortalRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let result = state
        .portal_handler()
        .handle(BillingPortalCommand {
            user_id: user.user_id,
            origin: request.origin,
        })
        .await?;

    Ok(Json(PortalResponse {
        url: result.redirect_url,
    }))
}

/// POST /api/billing/cancel - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    state
        .cancel_handler()
        .handle(CancelSubscriptionCommand {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(CancelResponse { success: true }))
}

/// POST /api/billing/webhook - Stripe webhook ingestion
///
/// The body must stay raw bytes: signature verification runs over the
/// exact byte stream, so nothing may parse it first.
pub async fn handle_webhook(
    State(state): State<BillingAppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, BillingApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            BillingError::validation("Stripe-Signature", "Missing Stripe-Signature header")
        })?;

    let outcome = state
        .webhook_handler()
        .handle(ProcessWebhookCommand {
            payload: body.to_vec(),
            signature: signature.to_string(),
        })
        .await?;

    let response = match outcome {
        ProcessWebhookOutcome::VerificationTest => {
            Json(WebhookVerified { verified: true }).into_response()
        }
        _ => Json(WebhookReceived { received: true }).into_response(),
    };
    Ok(response)
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::foundation::DomainError> for BillingApiError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        Self(BillingError::from(err))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            BillingError::TrialAlreadyUsed => (StatusCode::CONFLICT, "TRIAL_ALREADY_USED"),
            BillingError::NoActiveSubscription => {
                (StatusCode::NOT_FOUND, "NO_ACTIVE_SUBSCRIPTION")
            }
            BillingError::NoBillingAccount => (StatusCode::NOT_FOUND, "NO_BILLING_ACCOUNT"),
            BillingError::InvalidPlan(_) => (StatusCode::BAD_REQUEST, "INVALID_PLAN"),
            // The provider treats any 4xx as a permanent rejection; a bad
            // signature must never be retried
            BillingError::InvalidWebhookSignature => {
                (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK_SIGNATURE")
            }
            BillingError::ProviderFailed { .. } => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            BillingError::ValidationFailed { .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED")
            }
            // 5xx tells the provider to redeliver after a store outage
            BillingError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse::new(error_code, self.0.message());
        (status, Json(body)).into_response()
    }
}
