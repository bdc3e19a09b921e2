//! PostgreSQL implementation of EntitlementStore.
//!
//! Every write is a single UPDATE statement so concurrent writers on the
//! user-initiated and webhook paths can never interleave a partial record.
//! The trial grant folds its precondition into the statement's WHERE
//! clause; the row count tells the caller whether the grant happened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{Entitlement, EntitlementUpdate, SubscriptionPlan, SubscriptionStatus};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{EntitlementKey, EntitlementStore, TrialGrant};

/// PostgreSQL implementation of the EntitlementStore port.
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    /// Creates a store backed by the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the implicit `none` record if the user has none yet.
    async fn ensure_record(&self, user_id: &UserId) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

/// Database row representation of an entitlement.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    user_id: Uuid,
    status: String,
    plan: Option<String>,
    trial_started_at: Option<DateTime<Utc>>,
    trial_ends_at: Option<DateTime<Utc>>,
    subscription_ends_at: Option<DateTime<Utc>>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for Entitlement {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid status value: {}", row.status),
            )
        })?;
        let plan = row
            .plan
            .as_deref()
            .map(|p| {
                SubscriptionPlan::parse(p).ok_or_else(|| {
                    DomainError::new(
                        ErrorCode::DatabaseError,
                        format!("Invalid plan value: {}", p),
                    )
                })
            })
            .transpose()?;

        Ok(Entitlement {
            user_id: UserId::from_uuid(row.user_id),
            status,
            plan,
            trial_started_at: row.trial_started_at.map(Timestamp::from_datetime),
            trial_ends_at: row.trial_ends_at.map(Timestamp::from_datetime),
            subscription_ends_at: row.subscription_ends_at.map(Timestamp::from_datetime),
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Database error: {}", e))
}

const SELECT_COLUMNS: &str = "user_id, status, plan, trial_started_at, trial_ends_at, \
     subscription_ends_at, stripe_customer_id, stripe_subscription_id, created_at, updated_at";

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn get(&self, user_id: &UserId) -> Result<Entitlement, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(&format!(
            "SELECT {} FROM entitlements WHERE user_id = $1",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => row.try_into(),
            // Entitlements exist implicitly; an unseen user is a fresh record
            None => Ok(Entitlement::new(*user_id)),
        }
    }

    async fn apply(
        &self,
        key: &EntitlementKey,
        update: EntitlementUpdate,
    ) -> Result<(), DomainError> {
        let status = update.status.map(|s| s.as_str());
        let plan = update.plan.map(|p| p.as_str());
        let ends_at = update.subscription_ends_at.map(|t| *t.as_datetime());

        let result = match key {
            EntitlementKey::User(user_id) => {
                self.ensure_record(user_id).await?;
                sqlx::query(
                    r#"
                    UPDATE entitlements SET
                        status = COALESCE($2, status),
                        plan = COALESCE($3, plan),
                        subscription_ends_at = COALESCE($4, subscription_ends_at),
                        stripe_customer_id = COALESCE($5, stripe_customer_id),
                        stripe_subscription_id = CASE
                            WHEN $6 THEN NULL
                            ELSE COALESCE($7, stripe_subscription_id)
                        END,
                        updated_at = now()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id.as_uuid())
                .bind(status)
                .bind(plan)
                .bind(ends_at)
                .bind(&update.stripe_customer_id)
                .bind(update.clear_subscription_id)
                .bind(&update.stripe_subscription_id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?
            }
            EntitlementKey::Customer(customer_id) => sqlx::query(
                r#"
                UPDATE entitlements SET
                    status = COALESCE($2, status),
                    plan = COALESCE($3, plan),
                    subscription_ends_at = COALESCE($4, subscription_ends_at),
                    stripe_customer_id = COALESCE($5, stripe_customer_id),
                    stripe_subscription_id = CASE
                        WHEN $6 THEN NULL
                        ELSE COALESCE($7, stripe_subscription_id)
                    END,
                    updated_at = now()
                WHERE stripe_customer_id = $1
                "#,
            )
            .bind(customer_id)
            .bind(status)
            .bind(plan)
            .bind(ends_at)
            .bind(&update.stripe_customer_id)
            .bind(update.clear_subscription_id)
            .bind(&update.stripe_subscription_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?,
        };

        if result.rows_affected() == 0 {
            // Only reachable for customer-keyed writes: an event for a
            // customer this deployment does not know. Accepted, not an error.
            if let EntitlementKey::Customer(customer_id) = key {
                tracing::warn!(
                    customer_id = %customer_id,
                    "entitlement update matched no record, skipping"
                );
            }
        }

        Ok(())
    }

    async fn begin_trial(
        &self,
        user_id: &UserId,
        started_at: Timestamp,
        ends_at: Timestamp,
    ) -> Result<TrialGrant, DomainError> {
        self.ensure_record(user_id).await?;

        // The precondition lives in the WHERE clause, so two concurrent
        // activations race on one conditional UPDATE and only one wins.
        let result = sqlx::query(
            r#"
            UPDATE entitlements SET
                status = 'trialing',
                plan = 'free_trial',
                trial_started_at = $2,
                trial_ends_at = $3,
                updated_at = now()
            WHERE user_id = $1 AND trial_started_at IS NULL
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(started_at.as_datetime())
        .bind(ends_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 1 {
            Ok(TrialGrant::Granted)
        } else {
            Ok(TrialGrant::AlreadyUsed)
        }
    }
}
