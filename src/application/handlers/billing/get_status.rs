//! GetStatusHandler - Query handler for a user's subscription status.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionPlan, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::EntitlementStore;

/// Query for the current user's subscription status.
#[derive(Debug, Clone)]
pub struct GetStatusQuery {
    pub user_id: UserId,
}

/// Read-only projection of an entitlement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub status: SubscriptionStatus,
    pub plan: Option<SubscriptionPlan>,
    pub trial_ends_at: Option<Timestamp>,
    pub subscription_ends_at: Option<Timestamp>,
    pub has_billing_account: bool,
}

/// Handler for reading subscription status.
pub struct GetStatusHandler {
    store: Arc<dyn EntitlementStore>,
}

impl GetStatusHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: GetStatusQuery) -> Result<StatusView, BillingError> {
        let entitlement = self.store.get(&query.user_id).await?;

        Ok(StatusView {
            status: entitlement.status,
            plan: entitlement.plan,
            trial_ends_at: entitlement.trial_ends_at,
            subscription_ends_at: entitlement.subscription_ends_at,
            has_billing_account: entitlement.has_billing_account(),
        })
    }
}
