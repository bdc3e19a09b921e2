//! Subscription plans and the static plan catalog.
//!
//! The catalog is read-only configuration consumed by the checkout flow;
//! it is not part of the reconciliation state machine.

use serde::{Deserialize, Serialize};

/// Subscription plan identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    FreeTrial,
    Monthly,
    Yearly,
}

impl SubscriptionPlan {
    /// Canonical string form, used in the database and checkout metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::FreeTrial => "free_trial",
            SubscriptionPlan::Monthly => "monthly",
            SubscriptionPlan::Yearly => "yearly",
        }
    }

    /// Parses the canonical string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free_trial" => Some(SubscriptionPlan::FreeTrial),
            "monthly" => Some(SubscriptionPlan::Monthly),
            "yearly" => Some(SubscriptionPlan::Yearly),
            _ => None,
        }
    }

    /// Whether this plan is purchased through checkout (vs. the free trial).
    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionPlan::FreeTrial)
    }

    /// Catalog entry for this plan.
    pub fn details(&self) -> &'static PlanDetails {
        match self {
            SubscriptionPlan::FreeTrial => &CATALOG[0],
            SubscriptionPlan::Monthly => &CATALOG[1],
            SubscriptionPlan::Yearly => &CATALOG[2],
        }
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing interval for a recurring plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    /// Stripe's `recurring[interval]` value.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

/// Static catalog entry for a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetails {
    pub plan: SubscriptionPlan,
    pub name: &'static str,
    pub description: &'static str,
    /// Unit price in cents; 0 for the trial.
    pub unit_amount_cents: i64,
    /// Billing interval; `None` for the trial.
    pub interval: Option<BillingInterval>,
    /// Trial length in days; 0 for paid plans.
    pub trial_days: i64,
    pub features: &'static [&'static str],
}

/// ServiceSource Connect subscription tiers.
static CATALOG: [PlanDetails; 3] = [
    PlanDetails {
        plan: SubscriptionPlan::FreeTrial,
        name: "Free Trial",
        description: "Full access for 7 days — no credit card required",
        unit_amount_cents: 0,
        interval: None,
        trial_days: 7,
        features: &[
            "Access all resource categories",
            "Search across all 50 states",
            "AI resource matching assistant",
            "Save up to 5 resources",
            "View VA lender directory",
        ],
    },
    PlanDetails {
        plan: SubscriptionPlan::Monthly,
        name: "Monthly",
        description: "Full access billed monthly",
        unit_amount_cents: 2500,
        interval: Some(BillingInterval::Month),
        trial_days: 0,
        features: &[
            "Everything in Free Trial",
            "Unlimited saved resources",
            "Weekly email digest",
            "Resource ratings & reviews",
            "Interactive resource map",
            "Priority support",
        ],
    },
    PlanDetails {
        plan: SubscriptionPlan::Yearly,
        name: "Yearly",
        description: "Full access billed annually — save $150/year",
        unit_amount_cents: 15000,
        interval: Some(BillingInterval::Year),
        trial_days: 0,
        features: &[
            "Everything in Monthly",
            "2 months free vs monthly billing",
            "Early access to new features",
            "Dedicated support channel",
        ],
    },
];

/// All catalog entries, in display order.
pub fn plan_catalog() -> &'static [PlanDetails] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_as_str() {
        for plan in [
            SubscriptionPlan::FreeTrial,
            SubscriptionPlan::Monthly,
            SubscriptionPlan::Yearly,
        ] {
            assert_eq!(SubscriptionPlan::parse(plan.as_str()), Some(plan));
        }
    }

    #[test]
    fn parse_rejects_unknown_plans() {
        assert_eq!(SubscriptionPlan::parse("weekly"), None);
        assert_eq!(SubscriptionPlan::parse(""), None);
    }

    #[test]
    fn only_trial_is_unpaid() {
        assert!(!SubscriptionPlan::FreeTrial.is_paid());
        assert!(SubscriptionPlan::Monthly.is_paid());
        assert!(SubscriptionPlan::Yearly.is_paid());
    }

    #[test]
    fn trial_has_seven_days_and_no_interval() {
        let details = SubscriptionPlan::FreeTrial.details();
        assert_eq!(details.trial_days, 7);
        assert!(details.interval.is_none());
        assert_eq!(details.unit_amount_cents, 0);
    }

    #[test]
    fn paid_plans_have_prices_and_intervals() {
        let monthly = SubscriptionPlan::Monthly.details();
        assert_eq!(monthly.unit_amount_cents, 2500);
        assert_eq!(monthly.interval, Some(BillingInterval::Month));

        let yearly = SubscriptionPlan::Yearly.details();
        assert_eq!(yearly.unit_amount_cents, 15000);
        assert_eq!(yearly.interval, Some(BillingInterval::Year));
    }

    #[test]
    fn catalog_covers_every_plan_once() {
        let catalog = plan_catalog();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog[0].plan, SubscriptionPlan::FreeTrial);
        assert_eq!(catalog[1].plan, SubscriptionPlan::Monthly);
        assert_eq!(catalog[2].plan, SubscriptionPlan::Yearly);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SubscriptionPlan::FreeTrial).unwrap();
        assert_eq!(json, "\"free_trial\"");
    }
}
