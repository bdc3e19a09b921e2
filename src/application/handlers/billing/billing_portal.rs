//! BillingPortalHandler - Command handler for opening the self-service portal.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, EntitlementStore};

/// Command to create a billing portal session.
#[derive(Debug, Clone)]
pub struct BillingPortalCommand {
    pub user_id: UserId,
    /// Origin the portal returns to when the user is done.
    pub origin: String,
}

/// Result of successful portal session creation.
#[derive(Debug, Clone)]
pub struct BillingPortalResult {
    pub redirect_url: String,
}

/// Handler for billing portal access.
pub struct BillingPortalHandler {
    store: Arc<dyn EntitlementStore>,
    provider: Arc<dyn BillingProvider>,
}

impl BillingPortalHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(
        &self,
        cmd: BillingPortalCommand,
    ) -> Result<BillingPortalResult, BillingError> {
        let entitlement = self.store.get(&cmd.user_id).await?;

        let customer_id = entitlement
            .stripe_customer_id
            .ok_or(BillingError::NoBillingAccount)?;

        let return_url = format!("{}/dashboard", cmd.origin);
        let session = self
            .provider
            .create_portal_session(&customer_id, &return_url)
            .await
            .map_err(|e| BillingError::provider_failed(e.message, e.retryable))?;

        Ok(BillingPortalResult {
            redirect_url: session.url,
        })
    }
}
