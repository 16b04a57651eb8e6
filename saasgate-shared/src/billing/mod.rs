/// Subscription billing
///
/// - [`processor`]: the billing-processor port and its wire types
/// - [`stripe`]: Stripe implementation of the port
/// - [`ledger`]: the entitlement ledger (subscription state and plan tier cascade)
/// - [`webhook`]: signature verification and event reconciliation
///
/// Plan prices and limits live in an immutable [`PlanCatalog`] built once from
/// configuration and shared with the ledger and the app-limit checks.

pub mod ledger;
pub mod processor;
pub mod stripe;
pub mod webhook;

use std::collections::HashMap;

/// Error type for billing operations
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The processor could not be reached or returned an error status
    #[error("Billing processor error: {0}")]
    ExternalService(String),

    /// The processor answered with a shape we cannot use
    #[error("Unexpected billing processor response: {0}")]
    UnexpectedResponse(String),

    /// The requested plan has no price
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
struct PlanEntry {
    price_id: Option<String>,
    app_limit: i64,
}

/// Static price and limit tables
///
/// # Example
///
/// ```
/// use saasgate_shared::billing::PlanCatalog;
///
/// let catalog = PlanCatalog::new("basic")
///     .with_plan("basic", Some("price_basic".to_string()), 3)
///     .with_plan("pro", Some("price_pro".to_string()), 50);
///
/// assert_eq!(catalog.price_for("pro"), Some("price_pro"));
/// assert_eq!(catalog.plan_for_price("price_basic"), Some("basic"));
/// assert_eq!(catalog.limit_for("pro"), 50);
/// assert_eq!(catalog.limit_for("unknown"), 0);
/// ```
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<String, PlanEntry>,
    default_tier: String,
}

impl PlanCatalog {
    pub fn new(default_tier: impl Into<String>) -> Self {
        Self {
            plans: HashMap::new(),
            default_tier: default_tier.into(),
        }
    }

    /// Adds or replaces a plan
    pub fn with_plan(
        mut self,
        plan_id: impl Into<String>,
        price_id: Option<String>,
        app_limit: i64,
    ) -> Self {
        self.plans.insert(
            plan_id.into(),
            PlanEntry {
                price_id: price_id.filter(|p| !p.is_empty()),
                app_limit,
            },
        );
        self
    }

    /// Tier assigned at registration and on demotion
    pub fn default_tier(&self) -> &str {
        &self.default_tier
    }

    pub fn contains(&self, plan_id: &str) -> bool {
        self.plans.contains_key(plan_id)
    }

    pub fn price_for(&self, plan_id: &str) -> Option<&str> {
        self.plans.get(plan_id)?.price_id.as_deref()
    }

    /// Maps a processor price back to a plan id
    pub fn plan_for_price(&self, price_id: &str) -> Option<&str> {
        self.plans
            .iter()
            .find(|(_, entry)| entry.price_id.as_deref() == Some(price_id))
            .map(|(plan, _)| plan.as_str())
    }

    /// Owned-app limit for a tier; unknown tiers get 0
    pub fn limit_for(&self, tier: &str) -> i64 {
        self.plans.get(tier).map(|e| e.app_limit).unwrap_or(0)
    }

    /// Plan ids in name order
    pub fn plan_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.plans.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new("basic")
            .with_plan("basic", Some("price_basic".to_string()), 3)
            .with_plan("pro", Some("price_pro".to_string()), 50)
    }

    #[test]
    fn test_price_lookup_both_ways() {
        let catalog = catalog();
        assert_eq!(catalog.price_for("basic"), Some("price_basic"));
        assert_eq!(catalog.plan_for_price("price_pro"), Some("pro"));
        assert_eq!(catalog.plan_for_price("price_other"), None);
        assert_eq!(catalog.price_for("enterprise"), None);
    }

    #[test]
    fn test_limits() {
        let catalog = catalog();
        assert_eq!(catalog.limit_for("basic"), 3);
        assert_eq!(catalog.limit_for("pro"), 50);
        assert_eq!(catalog.limit_for(""), 0);
    }

    #[test]
    fn test_empty_price_is_no_price() {
        let catalog = PlanCatalog::new("basic").with_plan("basic", Some(String::new()), 3);
        assert!(catalog.contains("basic"));
        assert_eq!(catalog.price_for("basic"), None);
        assert_eq!(catalog.plan_for_price(""), None);
    }

    #[test]
    fn test_plan_ids_sorted() {
        assert_eq!(catalog().plan_ids(), vec!["basic", "pro"]);
        assert_eq!(catalog().default_tier(), "basic");
    }
}
