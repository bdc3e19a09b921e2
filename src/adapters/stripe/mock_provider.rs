//! Mock billing provider for tests.
//!
//! Configurable fake implementation of `BillingProvider`: canned responses,
//! error injection, and call tracking. Used by integration tests and
//! available to any consumer that needs a provider double.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::ports::{
    BillingProvider, CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer,
    PortalSession, ProviderError, WebhookEvent,
};

/// Fake billing provider.
///
/// By default every operation succeeds with deterministic fixtures; tests
/// override individual responses or inject an error for the next call.
#[derive(Default)]
pub struct MockBillingProvider {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_customer: Option<Customer>,
    next_checkout: Option<CheckoutSession>,
    next_portal: Option<PortalSession>,
    next_event: Option<WebhookEvent>,
    next_error: Option<ProviderError>,
    calls: Vec<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load the customer returned by the next `create_customer`.
    pub fn set_customer(&self, customer: Customer) {
        self.state.lock().unwrap().next_customer = Some(customer);
    }

    /// Pre-load the session returned by the next `create_checkout_session`.
    pub fn set_checkout(&self, session: CheckoutSession) {
        self.state.lock().unwrap().next_checkout = Some(session);
    }

    /// Pre-load the session returned by the next `create_portal_session`.
    pub fn set_portal(&self, session: PortalSession) {
        self.state.lock().unwrap().next_portal = Some(session);
    }

    /// Pre-load the event returned by the next `verify_webhook`.
    pub fn set_event(&self, event: WebhookEvent) {
        self.state.lock().unwrap().next_event = Some(event);
    }

    /// Fail the next call with the given error.
    pub fn set_error(&self, error: ProviderError) {
        self.state.lock().unwrap().next_error = Some(error);
    }

    /// Names of methods invoked, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of times the named method was invoked.
    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c == &method)
            .count()
    }

    fn record(&self, method: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());
        match state.next_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, ProviderError> {
        self.record("create_customer")?;
        let preset = self.state.lock().unwrap().next_customer.take();
        Ok(preset.unwrap_or(Customer {
            id: format!("cus_mock_{}", request.user_id),
            email: request.email,
            name: request.name,
            created_at: 1704067200,
        }))
    }

    async fn create_checkout_session(
        &self,
        _request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.record("create_checkout_session")?;
        let preset = self.state.lock().unwrap().next_checkout.take();
        Ok(preset.unwrap_or(CheckoutSession {
            id: "cs_mock".to_string(),
            url: "https://checkout.stripe.com/c/pay/cs_mock".to_string(),
        }))
    }

    async fn create_portal_session(
        &self,
        _customer_id: &str,
        _return_url: &str,
    ) -> Result<PortalSession, ProviderError> {
        self.record("create_portal_session")?;
        let preset = self.state.lock().unwrap().next_portal.take();
        Ok(preset.unwrap_or(PortalSession {
            id: "bps_mock".to_string(),
            url: "https://billing.stripe.com/session/bps_mock".to_string(),
        }))
    }

    async fn cancel_at_period_end(&self, _subscription_id: &str) -> Result<(), ProviderError> {
        self.record("cancel_at_period_end")
    }

    async fn verify_webhook(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> Result<WebhookEvent, ProviderError> {
        self.record("verify_webhook")?;
        self.state
            .lock()
            .unwrap()
            .next_event
            .take()
            .ok_or_else(|| ProviderError::invalid_webhook("no event configured"))
    }
}
