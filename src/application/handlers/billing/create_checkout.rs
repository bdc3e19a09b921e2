//! CreateCheckoutHandler - Command handler for starting a paid checkout flow.

use std::sync::Arc;

use crate::domain::billing::{BillingError, EntitlementUpdate, SubscriptionPlan};
use crate::domain::foundation::UserId;
use crate::ports::{
    BillingProvider, CreateCheckoutRequest, CreateCustomerRequest, EntitlementKey,
    EntitlementStore,
};

/// Command to start a checkout flow for a paid plan.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
    pub plan: SubscriptionPlan,
    /// Origin the hosted flow returns to (success and cancel pages).
    pub origin: String,
}

/// Result of successful checkout initiation.
#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    /// Provider-hosted checkout URL to redirect the user to.
    pub redirect_url: String,
}

/// Handler for checkout initiation.
///
/// Creates the Stripe customer lazily on first checkout and persists the id
/// before building the session, so subsequent calls reuse it. Entitlement
/// status is never changed here: checkout can be abandoned or fail, so
/// access is granted only when the corresponding webhook is reconciled.
pub struct CreateCheckoutHandler {
    store: Arc<dyn EntitlementStore>,
    provider: Arc<dyn BillingProvider>,
}

impl CreateCheckoutHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        // 1. Only paid plans go through checkout
        if !cmd.plan.is_paid() {
            return Err(BillingError::invalid_plan(cmd.plan.as_str()));
        }

        // 2. Reuse the existing billing customer, or create one and persist
        //    its id only after the provider confirms it exists
        let entitlement = self.store.get(&cmd.user_id).await?;
        let customer_id = match entitlement.stripe_customer_id {
            Some(id) => id,
            None => {
                let customer = self
                    .provider
                    .create_customer(CreateCustomerRequest {
                        user_id: cmd.user_id,
                        email: cmd.email.clone(),
                        name: cmd.name.clone(),
                    })
                    .await
                    .map_err(|e| BillingError::provider_failed(e.message, e.retryable))?;

                self.store
                    .apply(
                        &EntitlementKey::User(cmd.user_id),
                        EntitlementUpdate::billing_account(customer.id.clone()),
                    )
                    .await?;

                tracing::info!(
                    user_id = %cmd.user_id,
                    customer_id = %customer.id,
                    "billing customer created"
                );
                customer.id
            }
        };

        // 3. Hosted checkout session; the webhook attributes the completed
        //    session back to this user via the metadata it carries
        let session = self
            .provider
            .create_checkout_session(CreateCheckoutRequest {
                user_id: cmd.user_id,
                customer_id,
                plan: cmd.plan,
                success_url: format!(
                    "{}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}",
                    cmd.origin
                ),
                cancel_url: format!("{}/#pricing", cmd.origin),
            })
            .await
            .map_err(|e| BillingError::provider_failed(e.message, e.retryable))?;

        Ok(CreateCheckoutResult {
            redirect_url: session.url,
        })
    }
}
