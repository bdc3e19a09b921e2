//! Subscription status mirror of provider truth.
//!
//! The status stored locally is always the last provider event applied, not
//! a derived value. There is deliberately no transition gating here: webhook
//! delivery is at-least-once and unordered, so every write must be legal
//! from every prior state (last writer wins).

use serde::{Deserialize, Serialize};

/// Locally cached subscription status.
///
/// Mirrors the billing provider's view of the user. `None` doubles as the
/// initial state for a fresh account and the mapping target for provider
/// status values this service does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No subscription on record.
    None,

    /// Inside a trial window (free trial or provider-side trial).
    Trialing,

    /// Paid and current.
    Active,

    /// Payment failed, provider is retrying. Access retained in grace.
    PastDue,

    /// Cancellation requested or confirmed. Access continues until the
    /// recorded period end.
    Canceled,
}

impl SubscriptionStatus {
    /// Maps the provider's own status vocabulary onto the local enum.
    ///
    /// Anything unrecognized collapses to `None` rather than erroring, so a
    /// new provider status can never wedge reconciliation.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "canceled" => SubscriptionStatus::Canceled,
            "past_due" => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::None,
        }
    }

    /// Canonical string form, matching the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Parses the database representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SubscriptionStatus::None),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
