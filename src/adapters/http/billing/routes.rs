//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    billing_portal, cancel_subscription, create_checkout, get_status, handle_webhook, start_trial,
    BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## User Endpoints (require authentication)
/// - `GET /status` - Current subscription status
/// - `POST /trial` - Start the one-time free trial
/// - `POST /checkout` - Start a hosted checkout flow
/// - `POST /portal` - Open the hosted billing portal
/// - `POST /cancel` - Cancel at period end
///
/// ## Webhook Endpoint (no auth, signature verified)
/// - `POST /webhook` - Stripe webhook ingestion
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/trial", post(start_trial))
        .route("/checkout", post(create_checkout))
        .route("/portal", post(billing_portal))
        .route("/cancel", post(cancel_subscription))
        .route("/webhook", post(handle_webhook))
}

/// Create the complete billing module router, mounted at `/api/billing`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new().nest("/api/billing", billing_routes())
}
