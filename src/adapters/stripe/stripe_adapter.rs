//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` trait against the Stripe REST API.
//! Handles customer management, checkout and portal sessions, deferred
//! cancellation, and webhook verification.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Timeouts
//!
//! Every API call is bounded by the configured client timeout; a deadline
//! hit surfaces as a retryable `ProviderError::timeout` and commits no
//! local state.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::ports::{
    BillingProvider, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer,
    PortalSession, ProviderError, WebhookEvent, WebhookEventData, WebhookEventType,
};

use super::webhook_types::{
    SignatureHeader, StripeCheckoutSession, StripeCustomer, StripeInvoice, StripePortalSession,
    StripePrice, StripeSubscription, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Default deadline for Stripe API calls.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(15);

/// Product name prefix shown on hosted checkout pages.
const PRODUCT_NAME: &str = "ServiceSource Connect";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for the Stripe API.
    api_base_url: String,

    /// Deadline applied to every API call.
    api_timeout: Duration,
}

impl StripeConfig {
    /// Create a new Stripe configuration with default base URL and timeout.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            api_timeout: DEFAULT_API_TIMEOUT,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the per-call API deadline.
    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }
}

/// Stripe implementation of `BillingProvider`.
pub struct StripeBillingProvider {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingProvider {
    /// Create a new adapter with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .expect("reqwest client construction only fails without a TLS backend");
        Self {
            config,
            http_client,
        }
    }

    /// POST a form-encoded request to the Stripe API and parse the response.
    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::timeout(format!("Stripe call to {} timed out", path))
                } else {
                    ProviderError::network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(%status, path, error = %error_text, "Stripe API call failed");
            return Err(ProviderError::api(format!(
                "Stripe API error ({}): {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            ProviderError::api(format!("Failed to parse Stripe response: {}", e))
        })
    }

    /// Verify a webhook signature using HMAC-SHA256.
    ///
    /// Constant-time comparison prevents timing attacks; the timestamp
    /// window rejects replayed deliveries.
    fn verify_signature(
        &self,
        payload: &[u8],
        header: &SignatureHeader,
    ) -> Result<(), ProviderError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "webhook event too old - possible replay"
            );
            return Err(ProviderError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                "webhook event timestamp in the future"
            );
            return Err(ProviderError::invalid_webhook("Event timestamp in future"));
        }

        let signed_payload = format!(
            "{}.{}",
            header.timestamp,
            String::from_utf8_lossy(payload)
        );

        let mut mac = HmacSha256::new_from_slice(
            self.config.webhook_secret.expose_secret().as_bytes(),
        )
        .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        let expected = mac.finalize().into_bytes();

        if expected.as_slice().ct_eq(&header.v1_signature).unwrap_u8() != 1 {
            tracing::warn!("invalid webhook signature");
            return Err(ProviderError::invalid_webhook("Invalid signature"));
        }

        Ok(())
    }

    /// Decode a verified payload into the port's event union.
    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, ProviderError> {
        let stripe_event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "failed to parse webhook payload");
            ProviderError::invalid_webhook(format!("Invalid JSON: {}", e))
        })?;

        let event_type = match stripe_event.event_type.as_str() {
            "checkout.session.completed" => WebhookEventType::CheckoutCompleted,
            "customer.subscription.updated" => WebhookEventType::SubscriptionUpdated,
            "customer.subscription.deleted" => WebhookEventType::SubscriptionDeleted,
            "invoice.payment_failed" => WebhookEventType::InvoicePaymentFailed,
            other => WebhookEventType::Unknown(other.to_string()),
        };

        let data = extract_event_data(&stripe_event)?;

        Ok(WebhookEvent {
            id: stripe_event.id,
            event_type,
            data,
            created_at: stripe_event.created,
        })
    }
}

/// Extract the per-kind payload from the event envelope.
fn extract_event_data(event: &StripeWebhookEvent) -> Result<WebhookEventData, ProviderError> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: StripeCheckoutSession =
                serde_json::from_value(event.data.object.clone()).map_err(|e| {
                    ProviderError::invalid_webhook(format!("Invalid checkout session: {}", e))
                })?;

            Ok(WebhookEventData::Checkout {
                session_id: session.id,
                customer_id: session.customer,
                subscription_id: session.subscription,
                user_id: session.metadata.get("user_id").cloned(),
                plan: session.metadata.get("plan").cloned(),
            })
        }

        s if s.starts_with("customer.subscription.") => {
            let sub: StripeSubscription = serde_json::from_value(event.data.object.clone())
                .map_err(|e| {
                    ProviderError::invalid_webhook(format!("Invalid subscription: {}", e))
                })?;

            Ok(WebhookEventData::Subscription {
                subscription_id: sub.id,
                customer_id: sub.customer,
                status: sub.status,
                current_period_end: sub.current_period_end,
            })
        }

        s if s.starts_with("invoice.") => {
            let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
                .map_err(|e| ProviderError::invalid_webhook(format!("Invalid invoice: {}", e)))?;

            Ok(WebhookEventData::Invoice {
                invoice_id: invoice.id,
                customer_id: invoice.customer,
                subscription_id: invoice.subscription,
            })
        }

        _ => Ok(WebhookEventData::Raw {
            json: serde_json::to_string(&event.data.object).unwrap_or_default(),
        }),
    }
}

#[async_trait]
impl BillingProvider for StripeBillingProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, ProviderError> {
        let mut params = vec![("metadata[user_id]", request.user_id.to_string())];
        if let Some(email) = &request.email {
            params.push(("email", email.clone()));
        }
        if let Some(name) = &request.name {
            params.push(("name", name.clone()));
        }

        let customer: StripeCustomer = self.post_form("/v1/customers", &params).await?;

        Ok(Customer {
            id: customer.id,
            email: customer.email.or(request.email),
            name: customer.name.or(request.name),
            created_at: customer.created,
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let details = request.plan.details();
        let interval = details.interval.ok_or_else(|| {
            ProviderError::api(format!("Plan {} has no billing interval", request.plan))
        })?;

        // Prices are created per checkout rather than pre-provisioned in
        // the Stripe dashboard, so plan changes ship with the code.
        let price: StripePrice = self
            .post_form(
                "/v1/prices",
                &[
                    ("unit_amount", details.unit_amount_cents.to_string()),
                    ("currency", "usd".to_string()),
                    ("recurring[interval]", interval.as_str().to_string()),
                    (
                        "product_data[name]",
                        format!("{} — {}", PRODUCT_NAME, details.name),
                    ),
                ],
            )
            .await?;

        let session: StripeCheckoutSession = self
            .post_form(
                "/v1/checkout/sessions",
                &[
                    ("customer", request.customer_id.clone()),
                    ("payment_method_types[0]", "card".to_string()),
                    ("line_items[0][price]", price.id),
                    ("line_items[0][quantity]", "1".to_string()),
                    ("mode", "subscription".to_string()),
                    ("allow_promotion_codes", "true".to_string()),
                    ("success_url", request.success_url),
                    ("cancel_url", request.cancel_url),
                    ("client_reference_id", request.user_id.to_string()),
                    ("metadata[user_id]", request.user_id.to_string()),
                    ("metadata[plan]", request.plan.as_str().to_string()),
                ],
            )
            .await?;

        let url = session
            .url
            .ok_or_else(|| ProviderError::api("Checkout session has no hosted URL"))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, ProviderError> {
        let portal: StripePortalSession = self
            .post_form(
                "/v1/billing_portal/sessions",
                &[
                    ("customer", customer_id.to_string()),
                    ("return_url", return_url.to_string()),
                ],
            )
            .await?;

        Ok(PortalSession {
            id: portal.id,
            url: portal.url,
        })
    }

    async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<(), ProviderError> {
        let _: StripeSubscription = self
            .post_form(
                &format!("/v1/subscriptions/{}", subscription_id),
                &[("cancel_at_period_end", "true".to_string())],
            )
            .await?;
        Ok(())
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, ProviderError> {
        // 1. Parse signature header
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "failed to parse Stripe-Signature header");
            ProviderError::invalid_webhook(e.to_string())
        })?;

        // 2. Verify signature over the exact byte stream
        self.verify_signature(payload, &header)?;

        // 3. Decode into the closed event union
        let event = self.parse_event(payload)?;

        tracing::info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            "webhook signature verified"
        );

        Ok(event)
    }
}
