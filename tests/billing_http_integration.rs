//! Integration tests for the billing HTTP surface.
//!
//! Drives the real axum router end to end. Webhook tests run against the
//! real Stripe adapter with genuine HMAC-SHA256 signatures so the whole
//! verify-decode-reconcile pipeline is exercised; user-flow tests use the
//! mock provider to observe provider calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use servicesource::adapters::http::{billing_router, BillingAppState};
use servicesource::adapters::stripe::webhook_types::sign_payload;
use servicesource::adapters::stripe::{MockBillingProvider, StripeBillingProvider, StripeConfig};
use servicesource::domain::billing::{
    Entitlement, EntitlementUpdate, SubscriptionPlan, SubscriptionStatus,
};
use servicesource::domain::foundation::{DomainError, Timestamp, UserId};
use servicesource::ports::{EntitlementKey, EntitlementStore, TrialGrant};

const WEBHOOK_SECRET: &str = "whsec_integration_secret";

// =============================================================================
// Test Infrastructure
// =============================================================================

/// In-memory entitlement store mirroring the Postgres adapter's semantics.
struct InMemoryEntitlementStore {
    records: Mutex<HashMap<UserId, Entitlement>>,
}

impl InMemoryEntitlementStore {
    fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, entitlement: Entitlement) {
        self.records
            .lock()
            .unwrap()
            .insert(entitlement.user_id, entitlement);
    }

    fn record(&self, user_id: &UserId) -> Option<Entitlement> {
        self.records.lock().unwrap().get(user_id).cloned()
    }

    fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, user_id: &UserId) -> Result<Entitlement, DomainError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Entitlement::new(*user_id)))
    }

    async fn apply(
        &self,
        key: &EntitlementKey,
        update: EntitlementUpdate,
    ) -> Result<(), DomainError> {
        let mut records = self.records.lock().unwrap();
        match key {
            EntitlementKey::User(user_id) => {
                let entitlement = records
                    .entry(*user_id)
                    .or_insert_with(|| Entitlement::new(*user_id));
                update.apply_to(entitlement);
            }
            EntitlementKey::Customer(customer_id) => {
                if let Some(entitlement) = records
                    .values_mut()
                    .find(|e| e.stripe_customer_id.as_deref() == Some(customer_id))
                {
                    update.apply_to(entitlement);
                }
            }
        }
        Ok(())
    }

    async fn begin_trial(
        &self,
        user_id: &UserId,
        started_at: Timestamp,
        ends_at: Timestamp,
    ) -> Result<TrialGrant, DomainError> {
        let mut records = self.records.lock().unwrap();
        let entitlement = records
            .entry(*user_id)
            .or_insert_with(|| Entitlement::new(*user_id));
        if entitlement.trial_used() {
            return Ok(TrialGrant::AlreadyUsed);
        }
        entitlement.status = SubscriptionStatus::Trialing;
        entitlement.plan = Some(SubscriptionPlan::FreeTrial);
        entitlement.trial_started_at = Some(started_at);
        entitlement.trial_ends_at = Some(ends_at);
        Ok(TrialGrant::Granted)
    }
}

/// Router + store backed by the real Stripe adapter (for webhook tests).
fn stripe_app() -> (Router, Arc<InMemoryEntitlementStore>) {
    let store = Arc::new(InMemoryEntitlementStore::new());
    let provider = Arc::new(StripeBillingProvider::new(StripeConfig::new(
        "sk_test_integration",
        WEBHOOK_SECRET,
    )));
    let app = billing_router().with_state(BillingAppState {
        entitlement_store: store.clone(),
        billing_provider: provider,
    });
    (app, store)
}

/// Router + store + provider double (for user-flow tests).
fn mock_app() -> (Router, Arc<InMemoryEntitlementStore>, Arc<MockBillingProvider>) {
    let store = Arc::new(InMemoryEntitlementStore::new());
    let provider = Arc::new(MockBillingProvider::new());
    let app = billing_router().with_state(BillingAppState {
        entitlement_store: store.clone(),
        billing_provider: provider.clone(),
    });
    (app, store, provider)
}

fn signed_webhook_request(payload: &str) -> Request<Body> {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = sign_payload(WEBHOOK_SECRET, timestamp, payload.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/api/billing/webhook")
        .header("Stripe-Signature", signature)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn authed_request(method: &str, uri: &str, user_id: UserId, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", user_id.to_string())
        .header("X-User-Email", "vet@example.com")
        .header("content-type", "application/json");
    builder
        .body(
            body.map(|b| Body::from(b.to_string()))
                .unwrap_or_else(Body::empty),
        )
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn checkout_completed_payload(user_id: UserId, plan: &str) -> String {
    format!(
        r#"{{
            "id": "evt_1checkout",
            "type": "checkout.session.completed",
            "created": 1704067200,
            "data": {{
                "object": {{
                    "id": "cs_1",
                    "customer": "cus_1",
                    "subscription": "sub_1",
                    "metadata": {{"user_id": "{}", "plan": "{}"}}
                }}
            }},
            "livemode": false
        }}"#,
        user_id, plan
    )
}

fn subscription_payload(event_type: &str, status: &str) -> String {
    format!(
        r#"{{
            "id": "evt_1sub",
            "type": "{}",
            "created": 1704067200,
            "data": {{
                "object": {{
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "{}",
                    "current_period_end": 1706745600
                }}
            }},
            "livemode": false
        }}"#,
        event_type, status
    )
}

// =============================================================================
// Webhook: Signature Enforcement
// =============================================================================

#[tokio::test]
async fn webhook_with_valid_signature_activates_entitlement() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();

    let response = app
        .oneshot(signed_webhook_request(&checkout_completed_payload(
            user_id, "monthly",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);

    let record = store.record(&user_id).unwrap();
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.plan, Some(SubscriptionPlan::Monthly));
    assert_eq!(record.stripe_subscription_id.as_deref(), Some("sub_1"));
}

#[tokio::test]
async fn webhook_with_tampered_signature_never_mutates() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();

    let payload = checkout_completed_payload(user_id, "monthly");
    let timestamp = chrono::Utc::now().timestamp();
    // Signed with the wrong secret
    let signature = sign_payload("whsec_wrong", timestamp, payload.as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/webhook")
        .header("Stripe-Signature", signature)
        .body(Body::from(payload))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();

    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/webhook")
        .body(Body::from(checkout_completed_payload(user_id, "monthly")))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.record_count(), 0);
}

// =============================================================================
// Webhook: Verification Test Events
// =============================================================================

#[tokio::test]
async fn webhook_test_event_answers_verified_without_reconciling() {
    let (app, store) = stripe_app();

    let payload = r#"{
        "id": "evt_test_webhook_ping",
        "type": "checkout.session.completed",
        "created": 1704067200,
        "data": {"object": {"id": "cs_test"}},
        "livemode": false
    }"#;

    let response = app.oneshot(signed_webhook_request(payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["verified"], true);
    assert_eq!(store.record_count(), 0);
}

// =============================================================================
// Webhook: Unknown Events and Idempotency
// =============================================================================

#[tokio::test]
async fn webhook_unknown_event_type_is_acknowledged_not_errored() {
    let (app, store) = stripe_app();

    let payload = r#"{
        "id": "evt_1future",
        "type": "entitlement.grant.updated",
        "created": 1704067200,
        "data": {"object": {"id": "ent_1"}},
        "livemode": false
    }"#;

    let response = app.oneshot(signed_webhook_request(payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn webhook_redelivery_is_idempotent() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();
    let payload = checkout_completed_payload(user_id, "yearly");

    let first = app
        .clone()
        .oneshot(signed_webhook_request(&payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let once = store.record(&user_id).unwrap();

    let second = app.oneshot(signed_webhook_request(&payload)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let twice = store.record(&user_id).unwrap();

    assert_eq!(once.status, twice.status);
    assert_eq!(once.plan, twice.plan);
    assert_eq!(once.stripe_subscription_id, twice.stripe_subscription_id);
}

// =============================================================================
// Webhook: Lifecycle Transitions
// =============================================================================

#[tokio::test]
async fn webhook_payment_failure_then_recovery() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();

    let mut entitlement = Entitlement::new(user_id);
    entitlement.status = SubscriptionStatus::Active;
    entitlement.plan = Some(SubscriptionPlan::Monthly);
    entitlement.stripe_customer_id = Some("cus_1".to_string());
    entitlement.stripe_subscription_id = Some("sub_1".to_string());
    store.insert(entitlement);

    let failed = r#"{
        "id": "evt_1fail",
        "type": "invoice.payment_failed",
        "created": 1704067200,
        "data": {"object": {"id": "in_1", "customer": "cus_1", "subscription": "sub_1"}},
        "livemode": false
    }"#;
    app.clone()
        .oneshot(signed_webhook_request(failed))
        .await
        .unwrap();

    let record = store.record(&user_id).unwrap();
    assert_eq!(record.status, SubscriptionStatus::PastDue);
    assert_eq!(record.plan, Some(SubscriptionPlan::Monthly));

    app.oneshot(signed_webhook_request(&subscription_payload(
        "customer.subscription.updated",
        "active",
    )))
    .await
    .unwrap();

    let recovered = store.record(&user_id).unwrap();
    assert_eq!(recovered.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn webhook_hard_deletion_clears_subscription_id() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();

    let mut entitlement = Entitlement::new(user_id);
    entitlement.status = SubscriptionStatus::Active;
    entitlement.stripe_customer_id = Some("cus_1".to_string());
    entitlement.stripe_subscription_id = Some("sub_1".to_string());
    store.insert(entitlement);

    let response = app
        .oneshot(signed_webhook_request(&subscription_payload(
            "customer.subscription.deleted",
            "canceled",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let record = store.record(&user_id).unwrap();
    assert_eq!(record.status, SubscriptionStatus::Canceled);
    assert!(record.stripe_subscription_id.is_none());
}

// =============================================================================
// User Flows
// =============================================================================

#[tokio::test]
async fn status_starts_as_none() {
    let (app, _store, _provider) = mock_app();
    let user_id = UserId::new();

    let response = app
        .oneshot(authed_request("GET", "/api/billing/status", user_id, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "none");
    assert_eq!(json["plan"], serde_json::Value::Null);
    assert_eq!(json["has_billing_account"], false);
}

#[tokio::test]
async fn status_requires_authentication() {
    let (app, _store, _provider) = mock_app();

    let request = Request::builder()
        .method("GET")
        .uri("/api/billing/status")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trial_is_single_use() {
    let (app, store, _provider) = mock_app();
    let user_id = UserId::new();

    let first = app
        .clone()
        .oneshot(authed_request("POST", "/api/billing/trial", user_id, None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let json = body_json(first).await;
    assert!(json["trial_ends_at"].is_string());

    let after_first = store.record(&user_id).unwrap();

    let second = app
        .oneshot(authed_request("POST", "/api/billing/trial", user_id, None))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    // Unchanged by the rejected attempt
    let after_second = store.record(&user_id).unwrap();
    assert_eq!(after_first.trial_started_at, after_second.trial_started_at);
    assert_eq!(after_first.trial_ends_at, after_second.trial_ends_at);
}

#[tokio::test]
async fn checkout_creates_customer_once() {
    let (app, store, provider) = mock_app();
    let user_id = UserId::new();
    let body = r#"{"plan": "monthly", "origin": "https://app.example.com"}"#;

    let first = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/billing/checkout",
            user_id,
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let json = body_json(first).await;
    assert!(json["url"].as_str().unwrap().contains("checkout.stripe.com"));

    let second = app
        .oneshot(authed_request(
            "POST",
            "/api/billing/checkout",
            user_id,
            Some(body),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    // Customer created on the first call only; the persisted id is reused
    assert_eq!(provider.call_count("create_customer"), 1);
    assert_eq!(provider.call_count("create_checkout_session"), 2);
    assert!(store.record(&user_id).unwrap().has_billing_account());
}

#[tokio::test]
async fn portal_without_billing_account_is_not_found() {
    let (app, _store, _provider) = mock_app();

    let response = app
        .oneshot(authed_request(
            "POST",
            "/api/billing/portal",
            UserId::new(),
            Some(r#"{"origin": "https://app.example.com"}"#),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NO_BILLING_ACCOUNT");
}

#[tokio::test]
async fn cancel_marks_canceled_optimistically() {
    let (app, store, provider) = mock_app();
    let user_id = UserId::new();

    let mut entitlement = Entitlement::new(user_id);
    entitlement.status = SubscriptionStatus::Active;
    entitlement.plan = Some(SubscriptionPlan::Monthly);
    entitlement.stripe_customer_id = Some("cus_1".to_string());
    entitlement.stripe_subscription_id = Some("sub_1".to_string());
    store.insert(entitlement);

    let response = app
        .oneshot(authed_request("POST", "/api/billing/cancel", user_id, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
    assert_eq!(provider.call_count("cancel_at_period_end"), 1);
    assert_eq!(
        store.record(&user_id).unwrap().status,
        SubscriptionStatus::Canceled
    );
}

// =============================================================================
// Full Scenario: Trial Then Upgrade
// =============================================================================

#[tokio::test]
async fn trial_then_checkout_upgrade_end_to_end() {
    let (app, store) = stripe_app();
    let user_id = UserId::new();

    // Start the trial through the API
    let trial = app
        .clone()
        .oneshot(authed_request("POST", "/api/billing/trial", user_id, None))
        .await
        .unwrap();
    assert_eq!(trial.status(), StatusCode::OK);

    let trialing = store.record(&user_id).unwrap();
    assert_eq!(trialing.status, SubscriptionStatus::Trialing);
    assert_eq!(trialing.plan, Some(SubscriptionPlan::FreeTrial));

    // The signed checkout-completed webhook lands later
    let response = app
        .oneshot(signed_webhook_request(&checkout_completed_payload(
            user_id, "monthly",
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let upgraded = store.record(&user_id).unwrap();
    assert_eq!(upgraded.status, SubscriptionStatus::Active);
    assert_eq!(upgraded.plan, Some(SubscriptionPlan::Monthly));
    assert_eq!(upgraded.stripe_subscription_id.as_deref(), Some("sub_1"));
    assert!(upgraded.trial_used());
}
