//! CancelSubscriptionHandler - Command handler for deferred cancellation.

use std::sync::Arc;

use crate::domain::billing::{BillingError, EntitlementUpdate};
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, EntitlementKey, EntitlementStore};

/// Command to cancel the current subscription at period end.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

/// Handler for user-requested cancellation.
///
/// The provider is instructed to cancel at the current period's end, so
/// access is not revoked immediately. The local status is marked
/// `canceled` optimistically so the UI reflects intent right away; the
/// authoritative webhook confirmation arrives later and sets the same
/// value, so the two paths cannot conflict.
pub struct CancelSubscriptionHandler {
    store: Arc<dyn EntitlementStore>,
    provider: Arc<dyn BillingProvider>,
}

impl CancelSubscriptionHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(&self, cmd: CancelSubscriptionCommand) -> Result<(), BillingError> {
        let entitlement = self.store.get(&cmd.user_id).await?;

        let subscription_id = entitlement
            .stripe_subscription_id
            .ok_or(BillingError::NoActiveSubscription)?;

        self.provider
            .cancel_at_period_end(&subscription_id)
            .await
            .map_err(|e| BillingError::provider_failed(e.message, e.retryable))?;

        self.store
            .apply(
                &EntitlementKey::User(cmd.user_id),
                EntitlementUpdate::canceled(),
            )
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            subscription_id = %subscription_id,
            "cancellation requested, effective at period end"
        );
        Ok(())
    }
}
