/// Billing-processor port
///
/// The ledger talks to the processor only through [`BillingProcessor`]. Wire
/// types mirror the processor's JSON closely enough to deserialize both API
/// responses and webhook objects; every field a partial payload may omit is
/// optional.

use super::BillingError;
use async_trait::async_trait;
use serde::Deserialize;

/// Input for creating a processor customer
#[derive(Debug, Clone)]
pub struct NewCustomer<'a> {
    pub email: &'a str,
    pub name: Option<String>,
    pub user_id: String,
    /// Deduplicates retries of the same creation on the processor side
    pub idempotency_key: String,
}

/// Input for opening a subscription checkout
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub plan_id: &'a str,
    pub user_id: String,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub subscription: Option<ExpandableId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// A reference that the processor may send as a bare id or an expanded object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpandableId {
    Id(String),
    Object { id: String },
}

impl ExpandableId {
    pub fn id(&self) -> &str {
        match self {
            ExpandableId::Id(id) => id,
            ExpandableId::Object { id } => id,
        }
    }
}

/// Subscription object, from an API fetch or a `customer.subscription.*` event
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorSubscription {
    pub id: Option<String>,
    pub customer: Option<ExpandableId>,
    pub status: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItem {
    pub price: Option<PriceRef>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceRef {
    pub id: Option<String>,
}

impl ProcessorSubscription {
    /// Price of the first line item
    pub fn first_price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()?
            .price
            .as_ref()?
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Period start, falling back to the first line item
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.items.data.first()?.current_period_start)
    }

    /// Period end, falling back to the first line item
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first()?.current_period_end)
    }
}

#[async_trait]
pub trait BillingProcessor: Send + Sync {
    async fn create_customer(
        &self,
        customer: &NewCustomer<'_>,
    ) -> Result<ProcessorCustomer, BillingError>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BillingError>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProcessorSubscription, BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_from_full_object() {
        let sub: ProcessorSubscription = serde_json::from_value(json!({
            "id": "sub_123",
            "object": "subscription",
            "customer": "cus_123",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
            "trial_end": null,
            "items": {"object": "list", "data": [{"price": {"id": "price_pro"}}]}
        }))
        .unwrap();

        assert_eq!(sub.id.as_deref(), Some("sub_123"));
        assert_eq!(sub.customer.as_ref().map(|c| c.id()), Some("cus_123"));
        assert_eq!(sub.first_price_id(), Some("price_pro"));
        assert_eq!(sub.period_start(), Some(1_700_000_000));
        assert_eq!(sub.trial_end, None);
    }

    #[test]
    fn test_subscription_minimal_object() {
        let sub: ProcessorSubscription = serde_json::from_value(json!({"id": "sub_1"})).unwrap();
        assert!(sub.status.is_none());
        assert!(sub.first_price_id().is_none());
        assert!(sub.period_end().is_none());
    }

    #[test]
    fn test_period_falls_back_to_first_item() {
        let sub: ProcessorSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "items": {"data": [{
                "price": {"id": "price_basic"},
                "current_period_start": 10,
                "current_period_end": 20
            }]}
        }))
        .unwrap();

        assert_eq!(sub.period_start(), Some(10));
        assert_eq!(sub.period_end(), Some(20));
    }

    #[test]
    fn test_expanded_customer() {
        let sub: ProcessorSubscription =
            serde_json::from_value(json!({"customer": {"id": "cus_9", "object": "customer"}}))
                .unwrap();
        assert_eq!(sub.customer.unwrap().id(), "cus_9");
    }
}
