//! StartTrialHandler - Command handler for one-time trial activation.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionPlan};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementStore, TrialGrant};

/// Command to start the free trial.
#[derive(Debug, Clone)]
pub struct StartTrialCommand {
    pub user_id: UserId,
}

/// Result of a successful trial activation.
#[derive(Debug, Clone)]
pub struct StartTrialResult {
    pub trial_ends_at: Timestamp,
}

/// Handler for trial activation.
///
/// The precondition (trial never started) and the write are one
/// conditional update in the store, so two near-simultaneous activations
/// cannot both succeed. The failure is surfaced as `TrialAlreadyUsed`,
/// never silently ignored: it is the only defense against unlimited
/// trial replay.
pub struct StartTrialHandler {
    store: Arc<dyn EntitlementStore>,
}

impl StartTrialHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: StartTrialCommand) -> Result<StartTrialResult, BillingError> {
        let trial_days = SubscriptionPlan::FreeTrial.details().trial_days;
        let now = Timestamp::now();
        let trial_ends_at = now.add_days(trial_days);

        match self.store.begin_trial(&cmd.user_id, now, trial_ends_at).await? {
            TrialGrant::Granted => {
                tracing::info!(user_id = %cmd.user_id, %trial_ends_at, "trial activated");
                Ok(StartTrialResult { trial_ends_at })
            }
            TrialGrant::AlreadyUsed => Err(BillingError::TrialAlreadyUsed),
        }
    }
}
