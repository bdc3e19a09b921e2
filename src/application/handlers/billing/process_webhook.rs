//! ProcessWebhookHandler - the reconciler mapping provider events onto
//! local entitlement state.
//!
//! One handler per recognized event type, each performing a self-contained
//! idempotent update: every handler sets absolute fields, so redelivering
//! the same event produces the same final record. Delivery order is not
//! guaranteed and no sequence numbers are compared; a late
//! `customer.subscription.updated` arriving after the matching `deleted`
//! can resurrect the status. That gap is a known limitation of the
//! provider's event model, accepted here rather than papered over.
//!
//! # Keying
//!
//! `checkout.session.completed` carries the local user id as metadata and
//! is keyed by it. Subscription and invoice events carry no user metadata
//! and are keyed by the Stripe customer id instead.

use std::sync::Arc;

use crate::domain::billing::{BillingError, EntitlementUpdate, SubscriptionPlan, SubscriptionStatus};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    BillingProvider, EntitlementKey, EntitlementStore, WebhookEvent, WebhookEventData,
    WebhookEventType,
};

/// Command to process one inbound webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw, unparsed request body. Signature verification is computed over
    /// these exact bytes.
    pub payload: Vec<u8>,
    /// Provider-supplied signature header.
    pub signature: String,
}

/// Outcome of webhook processing. Everything except a store failure is
/// acknowledged to the provider with success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessWebhookOutcome {
    /// Synthetic connectivity-test event; answered without reconciling.
    VerificationTest,
    /// Checkout completed and the entitlement was activated.
    Activated { user_id: UserId },
    /// Provider status change mirrored locally.
    StatusSynced {
        customer_id: String,
        status: SubscriptionStatus,
    },
    /// Provider hard-deleted the subscription.
    SubscriptionDeleted { customer_id: String },
    /// Invoice payment failed; entitlement marked past due.
    PaymentFailed { customer_id: String },
    /// Recognized event missing required fields; logged and accepted.
    Acknowledged,
    /// Unrecognized event type; logged and discarded, never an error.
    Ignored { event_type: String },
}

/// Handler for verified webhook reconciliation.
pub struct ProcessWebhookHandler {
    store: Arc<dyn EntitlementStore>,
    provider: Arc<dyn BillingProvider>,
}

impl ProcessWebhookHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookOutcome, BillingError> {
        // 1. Authenticate before any processing. On mismatch: no mutation,
        //    no matter how well-formed the payload looks.
        let event = self
            .provider
            .verify_webhook(&cmd.payload, &cmd.signature)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "webhook rejected: signature verification failed");
                BillingError::InvalidWebhookSignature
            })?;

        // 2. Provider connectivity tests never reach the reconciler
        if event.is_verification_test() {
            tracing::info!(event_id = %event.id, "verification test event acknowledged");
            return Ok(ProcessWebhookOutcome::VerificationTest);
        }

        // 3. Dispatch by event type
        match &event.event_type {
            WebhookEventType::CheckoutCompleted => self.checkout_completed(&event).await,
            WebhookEventType::SubscriptionUpdated => self.subscription_updated(&event).await,
            WebhookEventType::SubscriptionDeleted => self.subscription_deleted(&event).await,
            WebhookEventType::InvoicePaymentFailed => self.invoice_payment_failed(&event).await,
            WebhookEventType::Unknown(event_type) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event_type,
                    "unhandled event type, discarding"
                );
                Ok(ProcessWebhookOutcome::Ignored {
                    event_type: event_type.clone(),
                })
            }
        }
    }

    async fn checkout_completed(
        &self,
        event: &WebhookEvent,
    ) -> Result<ProcessWebhookOutcome, BillingError> {
        let (user_id, plan, subscription_id) = match &event.data {
            WebhookEventData::Checkout {
                user_id,
                plan,
                subscription_id,
                ..
            } => (
                user_id.as_deref().and_then(|s| s.parse::<UserId>().ok()),
                plan.as_deref().and_then(SubscriptionPlan::parse),
                subscription_id.clone(),
            ),
            _ => {
                return Err(BillingError::infrastructure(
                    "unexpected payload shape for checkout.session.completed",
                ))
            }
        };

        // Only act when the session carries everything needed to attribute
        // and activate; anything less is acknowledged without a write.
        let (user_id, plan, subscription_id) = match (user_id, plan, subscription_id) {
            (Some(user_id), Some(plan), Some(subscription_id)) => (user_id, plan, subscription_id),
            _ => {
                tracing::warn!(
                    event_id = %event.id,
                    "checkout session missing user/plan/subscription, acknowledged without update"
                );
                return Ok(ProcessWebhookOutcome::Acknowledged);
            }
        };

        self.store
            .apply(
                &EntitlementKey::User(user_id),
                EntitlementUpdate::checkout_completed(plan, subscription_id),
            )
            .await?;

        tracing::info!(user_id = %user_id, plan = %plan, "activated subscription");
        Ok(ProcessWebhookOutcome::Activated { user_id })
    }

    async fn subscription_updated(
        &self,
        event: &WebhookEvent,
    ) -> Result<ProcessWebhookOutcome, BillingError> {
        let (customer_id, status, period_end) = match &event.data {
            WebhookEventData::Subscription {
                customer_id,
                status,
                current_period_end,
                ..
            } => (
                customer_id.clone(),
                SubscriptionStatus::from_provider(status),
                current_period_end.and_then(Timestamp::from_unix_secs),
            ),
            _ => {
                return Err(BillingError::infrastructure(
                    "unexpected payload shape for customer.subscription.updated",
                ))
            }
        };

        self.store
            .apply(
                &EntitlementKey::Customer(customer_id.clone()),
                EntitlementUpdate::status_sync(status, period_end),
            )
            .await?;

        tracing::info!(customer_id = %customer_id, status = %status, "subscription status synced");
        Ok(ProcessWebhookOutcome::StatusSynced {
            customer_id,
            status,
        })
    }

    async fn subscription_deleted(
        &self,
        event: &WebhookEvent,
    ) -> Result<ProcessWebhookOutcome, BillingError> {
        let customer_id = match &event.data {
            WebhookEventData::Subscription { customer_id, .. } => customer_id.clone(),
            _ => {
                return Err(BillingError::infrastructure(
                    "unexpected payload shape for customer.subscription.deleted",
                ))
            }
        };

        self.store
            .apply(
                &EntitlementKey::Customer(customer_id.clone()),
                EntitlementUpdate::subscription_deleted(),
            )
            .await?;

        tracing::info!(customer_id = %customer_id, "subscription deleted");
        Ok(ProcessWebhookOutcome::SubscriptionDeleted { customer_id })
    }

    async fn invoice_payment_failed(
        &self,
        event: &WebhookEvent,
    ) -> Result<ProcessWebhookOutcome, BillingError> {
        let customer_id = match &event.data {
            WebhookEventData::Invoice { customer_id, .. } => customer_id.clone(),
            _ => {
                return Err(BillingError::infrastructure(
                    "unexpected payload shape for invoice.payment_failed",
                ))
            }
        };

        self.store
            .apply(
                &EntitlementKey::Customer(customer_id.clone()),
                EntitlementUpdate::payment_failed(),
            )
            .await?;

        tracing::info!(customer_id = %customer_id, "invoice payment failed, marked past due");
        Ok(ProcessWebhookOutcome::PaymentFailed { customer_id })
    }
}
