//! Entitlement store port.
//!
//! The single shared mutable resource in the billing subsystem: the
//! user-initiated path and the webhook path converge only here, so every
//! write is a single atomic partial update. No component holds a lock
//! across an external network call.
//!
//! # Keying
//!
//! User-initiated writes are keyed by [`UserId`]. Provider-originated
//! writes are keyed by the Stripe customer id, because subscription and
//! invoice events do not carry user metadata. This split is inherent to
//! the provider's event model and is preserved deliberately.

use async_trait::async_trait;

use crate::domain::billing::{Entitlement, EntitlementUpdate};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Identity a write is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementKey {
    /// Local user identity (user-initiated operations, checkout metadata).
    User(UserId),
    /// Stripe customer id (subscription and invoice events).
    Customer(String),
}

/// Outcome of a conditional trial grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialGrant {
    /// Trial fields were written; this was the first activation.
    Granted,
    /// A trial was already started for this user; nothing was mutated.
    AlreadyUsed,
}

/// Repository port for entitlement records.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Read a user's entitlement.
    ///
    /// Records are created implicitly at registration; a user the store has
    /// never seen resolves to a fresh `none` record rather than an error.
    async fn get(&self, user_id: &UserId) -> Result<Entitlement, DomainError>;

    /// Apply a partial update as one atomic write.
    ///
    /// Two concurrent writers must never interleave a partial record. A
    /// customer-keyed update that matches no record is a no-op: the event
    /// refers to a customer this deployment does not know.
    async fn apply(
        &self,
        key: &EntitlementKey,
        update: EntitlementUpdate,
    ) -> Result<(), DomainError>;

    /// Grant the one-time trial if and only if it was never started.
    ///
    /// Precondition check and write must be effectively atomic per user
    /// (single conditional update, not read-then-write with a gap); two
    /// near-simultaneous activations must not both succeed.
    async fn begin_trial(
        &self,
        user_id: &UserId,
        started_at: Timestamp,
        ends_at: Timestamp,
    ) -> Result<TrialGrant, DomainError>;
}
