/// Entitlement ledger
///
/// The subscription row is the source of truth for a user's plan; the
/// `users.user_type` column is a cache of it and is written here and nowhere
/// else.
///
/// # Applying processor data
///
/// [`SubscriptionUpdate::merge`] is a pure function of (current row, payload):
///
/// | Field                   | Payload present         | Payload absent        |
/// |-------------------------|-------------------------|-----------------------|
/// | status                  | parsed (unknown → incomplete) | `incomplete`    |
/// | price / plan            | price, plan from catalog (unknown → `""`) | kept |
/// | cancel_at_period_end    | value                   | `false`               |
/// | period start/end, trial | converted from epoch    | kept                  |
/// | processor ids           | value                   | kept                  |
///
/// After every merge the tier is recomputed from the stored status alone, so
/// replaying an event changes nothing and events may arrive in any order; the
/// last one applied wins.

use super::processor::{BillingProcessor, CheckoutRequest, NewCustomer, ProcessorSubscription};
use super::{BillingError, PlanCatalog};
use crate::models::subscription::{Subscription, SubscriptionStatus};
use crate::models::user::User;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Redirect targets handed to the processor
#[derive(Debug, Clone)]
pub struct BillingUrls {
    pub checkout_success: String,
    pub checkout_cancel: String,
    pub portal_return: String,
}

/// Normalized view of a processor subscription payload
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
}

fn from_epoch(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

impl SubscriptionUpdate {
    pub fn from_processor(data: &ProcessorSubscription) -> Self {
        let status = match data.status.as_deref() {
            None => SubscriptionStatus::Incomplete,
            Some(raw) => SubscriptionStatus::parse(raw).unwrap_or_else(|| {
                tracing::warn!(status = raw, "Unmodelled subscription status, treating as incomplete");
                SubscriptionStatus::Incomplete
            }),
        };

        Self {
            stripe_subscription_id: data.id.clone().filter(|id| !id.is_empty()),
            stripe_customer_id: data
                .customer
                .as_ref()
                .map(|c| c.id().to_string())
                .filter(|id| !id.is_empty()),
            status,
            price_id: data.first_price_id().map(str::to_string),
            cancel_at_period_end: data.cancel_at_period_end.unwrap_or(false),
            current_period_start: from_epoch(data.period_start()),
            current_period_end: from_epoch(data.period_end()),
            trial_end: from_epoch(data.trial_end),
        }
    }

    /// Returns `current` with this update applied
    pub fn merge(&self, current: &Subscription, catalog: &PlanCatalog) -> Subscription {
        let mut next = current.clone();

        if let Some(id) = &self.stripe_subscription_id {
            next.stripe_subscription_id = Some(id.clone());
        }
        if let Some(id) = &self.stripe_customer_id {
            next.stripe_customer_id = Some(id.clone());
        }

        next.status = self.status;

        if let Some(price_id) = &self.price_id {
            next.price_id = Some(price_id.clone());
            next.plan_id = catalog
                .plan_for_price(price_id)
                .map(str::to_string)
                .unwrap_or_default();
        }

        next.cancel_at_period_end = self.cancel_at_period_end;

        if self.current_period_start.is_some() {
            next.current_period_start = self.current_period_start;
        }
        if self.current_period_end.is_some() {
            next.current_period_end = self.current_period_end;
        }
        if self.trial_end.is_some() {
            next.trial_end = self.trial_end;
        }

        next
    }
}

/// What the cascade does to the user's tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierChange {
    Promote(String),
    Demote(String),
    Keep,
}

/// Derives the tier change from a subscription's stored state
pub fn tier_change(subscription: &Subscription, catalog: &PlanCatalog) -> TierChange {
    if subscription.status.grants_plan() {
        if subscription.plan_id.is_empty() {
            TierChange::Keep
        } else {
            TierChange::Promote(subscription.plan_id.clone())
        }
    } else if subscription.status.revokes_plan() {
        TierChange::Demote(catalog.default_tier().to_string())
    } else {
        TierChange::Keep
    }
}

#[derive(Clone)]
pub struct EntitlementLedger {
    db: PgPool,
    catalog: Arc<PlanCatalog>,
    processor: Arc<dyn BillingProcessor>,
    urls: BillingUrls,
}

impl EntitlementLedger {
    pub fn new(
        db: PgPool,
        catalog: Arc<PlanCatalog>,
        processor: Arc<dyn BillingProcessor>,
        urls: BillingUrls,
    ) -> Self {
        Self {
            db,
            catalog,
            processor,
            urls,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub(crate) fn processor(&self) -> &dyn BillingProcessor {
        self.processor.as_ref()
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.db
    }

    pub async fn subscription_for(&self, user_id: Uuid) -> Result<Option<Subscription>, BillingError> {
        Ok(Subscription::find_by_user(&self.db, user_id).await?)
    }

    /// Merges processor data into `current`, persists it and cascades the tier
    pub async fn apply_subscription_data(
        &self,
        current: &Subscription,
        data: &ProcessorSubscription,
    ) -> Result<Subscription, BillingError> {
        let merged = SubscriptionUpdate::from_processor(data).merge(current, &self.catalog);
        let saved = merged.save_state(&self.db).await?;

        tracing::info!(
            user_id = %saved.user_id,
            status = %saved.status,
            plan_id = %saved.plan_id,
            "Subscription state applied"
        );

        self.cascade_tier(&saved).await?;
        Ok(saved)
    }

    async fn cascade_tier(&self, subscription: &Subscription) -> Result<(), BillingError> {
        let tier = match tier_change(subscription, &self.catalog) {
            TierChange::Promote(tier) | TierChange::Demote(tier) => tier,
            TierChange::Keep => return Ok(()),
        };

        if User::set_user_type(&self.db, subscription.user_id, &tier).await? {
            tracing::info!(user_id = %subscription.user_id, tier = %tier, "User tier changed");
        }
        Ok(())
    }

    /// Returns the user's processor customer id, creating the customer on first use
    ///
    /// The subscription row stays locked while the processor call runs, so a
    /// concurrent first request waits and then reuses the stored id. The
    /// idempotency key covers a retry after a lost response.
    pub async fn ensure_customer(&self, user: &User) -> Result<(Subscription, String), BillingError> {
        let subscription = Subscription::get_or_create(&self.db, user.id).await?;
        if let Some(customer_id) = subscription.stripe_customer_id.clone() {
            return Ok((subscription, customer_id));
        }

        let mut tx = self.db.begin().await?;
        let locked = Subscription::find_for_update(&mut *tx, subscription.id)
            .await?
            .ok_or(BillingError::Database(sqlx::Error::RowNotFound))?;

        if let Some(customer_id) = locked.stripe_customer_id.clone() {
            tx.commit().await?;
            return Ok((locked, customer_id));
        }

        let customer = self
            .processor
            .create_customer(&NewCustomer {
                email: &user.email,
                name: user.full_name(),
                user_id: user.id.to_string(),
                idempotency_key: format!("customer-{}", user.id),
            })
            .await?;

        Subscription::set_customer_id(&mut *tx, locked.id, &customer.id).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, customer_id = %customer.id, "Billing customer created");

        let mut subscription = locked;
        subscription.stripe_customer_id = Some(customer.id.clone());
        Ok((subscription, customer.id))
    }

    /// Opens a checkout session for `plan_id` and returns its URL
    ///
    /// When the session already names a subscription, its id and the plan are
    /// recorded right away; the webhook confirms or corrects them later.
    pub async fn create_checkout(&self, user: &User, plan_id: &str) -> Result<String, BillingError> {
        let price_id = self
            .catalog
            .price_for(plan_id)
            .ok_or_else(|| BillingError::UnknownPlan(plan_id.to_string()))?
            .to_string();

        let (subscription, customer_id) = self.ensure_customer(user).await?;

        let session = self
            .processor
            .create_checkout_session(&CheckoutRequest {
                customer_id: &customer_id,
                price_id: &price_id,
                plan_id,
                user_id: user.id.to_string(),
                success_url: &self.urls.checkout_success,
                cancel_url: &self.urls.checkout_cancel,
            })
            .await?;

        if let Some(pending) = &session.subscription {
            let plan = self.catalog.plan_for_price(&price_id).unwrap_or_default();
            Subscription::record_pending_checkout(
                &self.db,
                subscription.id,
                pending.id(),
                &price_id,
                plan,
            )
            .await?;
        }

        tracing::info!(user_id = %user.id, plan_id, session_id = %session.id, "Checkout session created");

        session
            .url
            .ok_or_else(|| BillingError::UnexpectedResponse("checkout session without url".into()))
    }

    /// Opens a billing-portal session and returns its URL
    pub async fn create_portal(&self, user: &User) -> Result<String, BillingError> {
        let (_, customer_id) = self.ensure_customer(user).await?;

        let session = self
            .processor
            .create_portal_session(&customer_id, &self.urls.portal_return)
            .await?;

        Ok(session.url)
    }
}
