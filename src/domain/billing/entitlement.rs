//! Entitlement record and partial-update semantics.
//!
//! One record per user, created implicitly with status `none` and never
//! deleted; a user who cancels and later resubscribes reuses the same
//! record. User-initiated operations and webhook reconciliation converge
//! only through this record, so every write is expressed as an
//! [`EntitlementUpdate`] that sets absolute fields, making it commutative
//! under redelivery and safe under reordering.
//!
//! # Invariants
//!
//! - `trial_started_at`/`trial_ends_at` are set at most once, ever
//!   (enforced by the store's conditional trial grant).
//! - `stripe_customer_id`, once set, is never reassigned.
//! - `stripe_subscription_id` is cleared (not just flagged) when the
//!   provider reports hard deletion.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::{SubscriptionPlan, SubscriptionStatus};

/// A user's locally cached access level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: UserId,

    /// Last provider-confirmed (or optimistically set) status.
    pub status: SubscriptionStatus,

    /// Current plan; unset until a trial starts or checkout completes.
    pub plan: Option<SubscriptionPlan>,

    /// When the one-time trial was started. Set at most once.
    pub trial_started_at: Option<Timestamp>,

    /// When the trial window closes. Set at most once.
    pub trial_ends_at: Option<Timestamp>,

    /// Renewal date while active; period-end date while canceled-pending.
    pub subscription_ends_at: Option<Timestamp>,

    /// Stripe customer id, created lazily on first checkout.
    pub stripe_customer_id: Option<String>,

    /// Stripe subscription id; present only while a provider-side
    /// subscription object exists.
    pub stripe_subscription_id: Option<String>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Entitlement {
    /// Fresh record for a user with no subscription history.
    pub fn new(user_id: UserId) -> Self {
        let now = Timestamp::now();
        Self {
            user_id,
            status: SubscriptionStatus::None,
            plan: None,
            trial_started_at: None,
            trial_ends_at: None,
            subscription_ends_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the one-time trial has already been consumed.
    pub fn trial_used(&self) -> bool {
        self.trial_started_at.is_some()
    }

    /// Whether a Stripe customer exists for this user.
    pub fn has_billing_account(&self) -> bool {
        self.stripe_customer_id.is_some()
    }

    /// Whether this record grants access at the given moment.
    ///
    /// `past_due` retains access during the provider's retry grace period;
    /// `canceled` retains access until the recorded period end.
    pub fn has_access(&self, now: Timestamp) -> bool {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::PastDue => true,
            SubscriptionStatus::Trialing => {
                self.trial_ends_at.map_or(true, |end| !now.is_after(&end))
            }
            SubscriptionStatus::Canceled => self
                .subscription_ends_at
                .map_or(false, |end| !now.is_after(&end)),
            SubscriptionStatus::None => false,
        }
    }
}

/// Partial update applied atomically to an entitlement record.
///
/// Unset fields leave the stored value untouched. Every constructor below
/// corresponds to one writer in the system; all of them set absolute
/// values, which is what makes webhook redelivery harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementUpdate {
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<SubscriptionPlan>,
    pub subscription_ends_at: Option<Timestamp>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// When true, `stripe_subscription_id` is set to NULL regardless of the
    /// field above. Used for provider-side hard deletion.
    pub clear_subscription_id: bool,
}

impl EntitlementUpdate {
    /// Checkout confirmed by webhook: subscription id, active, plan.
    pub fn checkout_completed(plan: SubscriptionPlan, subscription_id: impl Into<String>) -> Self {
        Self {
            status: Some(SubscriptionStatus::Active),
            plan: Some(plan),
            stripe_subscription_id: Some(subscription_id.into()),
            ..Self::default()
        }
    }

    /// Provider reported a status change; period end refreshed when carried.
    pub fn status_sync(status: SubscriptionStatus, period_end: Option<Timestamp>) -> Self {
        Self {
            status: Some(status),
            subscription_ends_at: period_end,
            ..Self::default()
        }
    }

    /// Provider hard-deleted the subscription object.
    pub fn subscription_deleted() -> Self {
        Self {
            status: Some(SubscriptionStatus::Canceled),
            clear_subscription_id: true,
            ..Self::default()
        }
    }

    /// Invoice payment failed; status only, plan and ids untouched.
    pub fn payment_failed() -> Self {
        Self {
            status: Some(SubscriptionStatus::PastDue),
            ..Self::default()
        }
    }

    /// User requested cancellation; optimistic local mark, confirmation
    /// arrives later via webhook and sets the same value.
    pub fn canceled() -> Self {
        Self {
            status: Some(SubscriptionStatus::Canceled),
            ..Self::default()
        }
    }

    /// First checkout created a Stripe customer for this user.
    pub fn billing_account(customer_id: impl Into<String>) -> Self {
        Self {
            stripe_customer_id: Some(customer_id.into()),
            ..Self::default()
        }
    }

    /// Merges this update into a record, mirroring the store's SQL.
    ///
    /// In-memory store implementations use this so their merge semantics
    /// cannot drift from the Postgres adapter.
    pub fn apply_to(&self, entitlement: &mut Entitlement) {
        if let Some(status) = self.status {
            entitlement.status = status;
        }
        if let Some(plan) = self.plan {
            entitlement.plan = Some(plan);
        }
        if let Some(ends_at) = self.subscription_ends_at {
            entitlement.subscription_ends_at = Some(ends_at);
        }
        if let Some(customer_id) = &self.stripe_customer_id {
            entitlement.stripe_customer_id = Some(customer_id.clone());
        }
        if self.clear_subscription_id {
            entitlement.stripe_subscription_id = None;
        } else if let Some(subscription_id) = &self.stripe_subscription_id {
            entitlement.stripe_subscription_id = Some(subscription_id.clone());
        }
        entitlement.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Entitlement {
        Entitlement::new(UserId::new())
    }

    // Construction

    #[test]
    fn new_record_has_no_history() {
        let e = fresh();
        assert_eq!(e.status, SubscriptionStatus::None);
        assert!(e.plan.is_none());
        assert!(!e.trial_used());
        assert!(!e.has_billing_account());
        assert!(e.stripe_subscription_id.is_none());
    }

    // Access checks

    #[test]
    fn active_and_past_due_have_access() {
        let mut e = fresh();
        e.status = SubscriptionStatus::Active;
        assert!(e.has_access(Timestamp::now()));
        e.status = SubscriptionStatus::PastDue;
        assert!(e.has_access(Timestamp::now()));
    }

    #[test]
    fn trialing_access_ends_with_trial_window() {
        let now = Timestamp::now();
        let mut e = fresh();
        e.status = SubscriptionStatus::Trialing;
        e.trial_ends_at = Some(now.add_days(7));
        assert!(e.has_access(now));
        assert!(!e.has_access(now.add_days(8)));
    }

    #[test]
    fn canceled_retains_access_until_period_end() {
        let now = Timestamp::now();
        let mut e = fresh();
        e.status = SubscriptionStatus::Canceled;
        e.subscription_ends_at = Some(now.add_days(10));
        assert!(e.has_access(now));
        assert!(!e.has_access(now.add_days(11)));
    }

    #[test]
    fn canceled_without_period_end_has_no_access() {
        let mut e = fresh();
        e.status = SubscriptionStatus::Canceled;
        assert!(!e.has_access(Timestamp::now()));
    }

    #[test]
    fn none_has_no_access() {
        assert!(!fresh().has_access(Timestamp::now()));
    }

    // Update merging

    #[test]
    fn checkout_completed_sets_all_three_fields() {
        let mut e = fresh();
        EntitlementUpdate::checkout_completed(SubscriptionPlan::Monthly, "sub_1").apply_to(&mut e);
        assert_eq!(e.status, SubscriptionStatus::Active);
        assert_eq!(e.plan, Some(SubscriptionPlan::Monthly));
        assert_eq!(e.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn checkout_completed_is_idempotent() {
        let mut once = fresh();
        let update = EntitlementUpdate::checkout_completed(SubscriptionPlan::Yearly, "sub_1");
        update.apply_to(&mut once);

        let mut twice = once.clone();
        update.apply_to(&mut twice);

        assert_eq!(once.status, twice.status);
        assert_eq!(once.plan, twice.plan);
        assert_eq!(once.stripe_subscription_id, twice.stripe_subscription_id);
    }

    #[test]
    fn payment_failed_touches_status_only() {
        let mut e = fresh();
        EntitlementUpdate::checkout_completed(SubscriptionPlan::Monthly, "sub_1").apply_to(&mut e);
        EntitlementUpdate::payment_failed().apply_to(&mut e);

        assert_eq!(e.status, SubscriptionStatus::PastDue);
        assert_eq!(e.plan, Some(SubscriptionPlan::Monthly));
        assert_eq!(e.stripe_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn subscription_deleted_clears_the_id() {
        let mut e = fresh();
        EntitlementUpdate::checkout_completed(SubscriptionPlan::Monthly, "sub_1").apply_to(&mut e);
        EntitlementUpdate::subscription_deleted().apply_to(&mut e);

        assert_eq!(e.status, SubscriptionStatus::Canceled);
        assert!(e.stripe_subscription_id.is_none());
    }

    #[test]
    fn status_sync_refreshes_period_end_only_when_carried() {
        let now = Timestamp::now();
        let mut e = fresh();
        e.subscription_ends_at = Some(now);

        EntitlementUpdate::status_sync(SubscriptionStatus::Active, None).apply_to(&mut e);
        assert_eq!(e.subscription_ends_at, Some(now));

        let later = now.add_days(30);
        EntitlementUpdate::status_sync(SubscriptionStatus::Active, Some(later)).apply_to(&mut e);
        assert_eq!(e.subscription_ends_at, Some(later));
    }

    #[test]
    fn billing_account_does_not_touch_status() {
        let mut e = fresh();
        EntitlementUpdate::billing_account("cus_1").apply_to(&mut e);
        assert_eq!(e.status, SubscriptionStatus::None);
        assert_eq!(e.stripe_customer_id.as_deref(), Some("cus_1"));
    }
}
