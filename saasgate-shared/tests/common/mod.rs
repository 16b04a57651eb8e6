//! Shared helpers for database-backed tests
//!
//! Tests connect to `DATABASE_URL` and are skipped when it is unset.
//! Run with: cargo test -p saasgate-shared -- --test-threads=1

#![allow(dead_code)]

use async_trait::async_trait;
use saasgate_shared::billing::processor::{
    BillingProcessor, CheckoutRequest, CheckoutSession, NewCustomer, PortalSession,
    ProcessorCustomer, ProcessorSubscription,
};
use saasgate_shared::billing::{BillingError, PlanCatalog};
use saasgate_shared::db::migrations::run_migrations;
use saasgate_shared::db::pool::{create_pool, DatabaseConfig};
use saasgate_shared::models::user::{CreateUser, User};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Connects and migrates, or returns `None` when no database is configured
pub async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };

    let pool = create_pool(DatabaseConfig {
        url,
        max_connections: 10,
        ..Default::default()
    })
    .await
    .expect("Failed to create pool");

    run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

pub fn catalog() -> PlanCatalog {
    PlanCatalog::new("basic")
        .with_plan("basic", Some("price_basic".to_string()), 3)
        .with_plan("pro", Some("price_pro".to_string()), 50)
}

/// Inserts an active user with a unique email
pub async fn create_user(pool: &PgPool, tier: &str) -> User {
    let user = User::create(
        pool,
        CreateUser {
            email: format!("user-{}@example.com", Uuid::new_v4()),
            password_hash: "not-a-real-hash".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            user_type: tier.to_string(),
        },
    )
    .await
    .expect("Failed to create user");

    User::activate(pool, user.id).await.expect("Failed to activate user");
    User::find_by_id(pool, user.id)
        .await
        .expect("Failed to reload user")
        .expect("User vanished")
}

/// In-memory payment processor
#[derive(Default)]
pub struct FakeProcessor {
    pub customers_created: AtomicUsize,
    pub customer_delay: Option<Duration>,
    pub subscriptions: Mutex<HashMap<String, ProcessorSubscription>>,
}

impl FakeProcessor {
    pub fn with_customer_delay(delay: Duration) -> Self {
        Self {
            customer_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn put_subscription(&self, value: serde_json::Value) {
        let data: ProcessorSubscription =
            serde_json::from_value(value).expect("Invalid subscription fixture");
        let id = data.id.clone().expect("Fixture needs an id");
        self.subscriptions.lock().unwrap().insert(id, data);
    }
}

#[async_trait]
impl BillingProcessor for FakeProcessor {
    async fn create_customer(
        &self,
        customer: &NewCustomer<'_>,
    ) -> Result<ProcessorCustomer, BillingError> {
        if let Some(delay) = self.customer_delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessorCustomer {
            id: format!("cus_{}_{}", customer.user_id.replace('-', ""), n),
        })
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, BillingError> {
        Ok(CheckoutSession {
            id: "cs_test".to_string(),
            url: Some(format!("https://checkout.test/{}", request.price_id)),
            subscription: None,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        Ok(PortalSession {
            id: "bps_test".to_string(),
            url: format!("https://portal.test/{}", customer_id),
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProcessorSubscription, BillingError> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| BillingError::ExternalService(format!("No such subscription: {}", subscription_id)))
    }
}
