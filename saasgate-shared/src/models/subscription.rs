/// Subscription model and database operations
///
/// One row per user, created lazily on the first checkout or portal request and
/// never deleted. Status and plan are written only by the entitlement ledger.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE subscriptions (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
///     stripe_customer_id VARCHAR(255),
///     stripe_subscription_id VARCHAR(255),
///     price_id VARCHAR(255),
///     plan_id VARCHAR(64) NOT NULL DEFAULT '',
///     status subscription_status NOT NULL DEFAULT 'incomplete',
///     cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
///     current_period_start TIMESTAMPTZ,
///     current_period_end TIMESTAMPTZ,
///     trial_end TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, stripe_customer_id, stripe_subscription_id, \
     price_id, plan_id, status, cancel_at_period_end, current_period_start, current_period_end, \
     trial_end, created_at, updated_at";

/// Billing-processor subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }

    /// Parses a processor status string
    ///
    /// Statuses this system does not model (e.g. `paused`) map to `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Some(SubscriptionStatus::IncompleteExpired),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "unpaid" => Some(SubscriptionStatus::Unpaid),
            _ => None,
        }
    }

    /// Whether this status promotes the user to the subscribed plan
    pub fn grants_plan(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    /// Whether this status demotes the user to the default tier
    ///
    /// `past_due` neither grants nor revokes: the tier is left as is while the
    /// processor retries payment.
    pub fn revokes_plan(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled
                | SubscriptionStatus::Incomplete
                | SubscriptionStatus::IncompleteExpired
                | SubscriptionStatus::Unpaid
        )
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        SubscriptionStatus::Incomplete
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub price_id: Option<String>,
    /// Internal plan id; empty when the price is unknown
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Returns the user's subscription, creating an empty one if needed
    ///
    /// Relies on the unique `user_id` constraint, so concurrent callers end up
    /// with the same row.
    pub async fn get_or_create(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        let query = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1");
        sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Locks the subscription row for the rest of the transaction
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query =
            format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE");

        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn find_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1");

        sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_stripe_subscription_id(
        pool: &PgPool,
        stripe_subscription_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE stripe_subscription_id = $1"
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(stripe_subscription_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_stripe_customer_id(
        pool: &PgPool,
        stripe_customer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE stripe_customer_id = $1"
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(stripe_customer_id)
            .fetch_optional(pool)
            .await
    }

    /// Stores the processor customer id on a locked row
    pub async fn set_customer_id(
        conn: &mut PgConnection,
        id: Uuid,
        stripe_customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET stripe_customer_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(stripe_customer_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Links processor ids, keeping existing values where the new ones are absent
    pub async fn link_processor_ids(
        pool: &PgPool,
        id: Uuid,
        stripe_customer_id: Option<&str>,
        stripe_subscription_id: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE subscriptions
            SET stripe_customer_id = COALESCE($2, stripe_customer_id),
                stripe_subscription_id = COALESCE($3, stripe_subscription_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .bind(stripe_customer_id)
            .bind(stripe_subscription_id)
            .fetch_one(pool)
            .await
    }

    /// Records the optimistic result of a checkout session
    pub async fn record_pending_checkout(
        pool: &PgPool,
        id: Uuid,
        stripe_subscription_id: &str,
        price_id: &str,
        plan_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET stripe_subscription_id = $2, price_id = $3, plan_id = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(stripe_subscription_id)
        .bind(price_id)
        .bind(plan_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Persists every synchronized field of an in-memory subscription
    pub async fn save_state(&self, pool: &PgPool) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE subscriptions
            SET stripe_customer_id = $2,
                stripe_subscription_id = $3,
                price_id = $4,
                plan_id = $5,
                status = $6,
                cancel_at_period_end = $7,
                current_period_start = $8,
                current_period_end = $9,
                trial_end = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Subscription>(&query)
            .bind(self.id)
            .bind(&self.stripe_customer_id)
            .bind(&self.stripe_subscription_id)
            .bind(&self.price_id)
            .bind(&self.plan_id)
            .bind(self.status)
            .bind(self.cancel_at_period_end)
            .bind(self.current_period_start)
            .bind(self.current_period_end)
            .bind(self.trial_end)
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SubscriptionStatus; 7] = [
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::IncompleteExpired,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::Unpaid,
    ];

    #[test]
    fn test_status_parse_matches_as_str() {
        for status in ALL {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("paused"), None);
        assert_eq!(SubscriptionStatus::parse(""), None);
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::IncompleteExpired).unwrap();
        assert_eq!(json, "\"incomplete_expired\"");

        let parsed: SubscriptionStatus = serde_json::from_str("\"past_due\"").unwrap();
        assert_eq!(parsed, SubscriptionStatus::PastDue);
    }

    #[test]
    fn test_grant_and_revoke_are_disjoint() {
        for status in ALL {
            assert!(!(status.grants_plan() && status.revokes_plan()), "{status}");
        }
        assert!(!SubscriptionStatus::PastDue.grants_plan());
        assert!(!SubscriptionStatus::PastDue.revokes_plan());
    }

    #[test]
    fn test_default_status_is_incomplete() {
        assert_eq!(SubscriptionStatus::default(), SubscriptionStatus::Incomplete);
    }
}
