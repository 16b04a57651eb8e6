//! Common test utilities for API integration tests
//!
//! - Test database setup (skipped when `DATABASE_URL` is unset)
//! - Router built with in-memory billing processor and email sender
//! - Request helpers and account setup
//!
//! Run with: cargo test -p saasgate-api -- --test-threads=1

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use saasgate_api::app::{build_router, AppState};
use saasgate_api::config::{
    ApiConfig, Config, CookieConfig, DatabaseConfig, EmailConfig, FrontendConfig, JwtConfig,
    PlansConfig, StripeConfig, ThrottleConfig, PLAN_BASIC,
};
use saasgate_shared::billing::processor::{
    BillingProcessor, CheckoutRequest, CheckoutSession, NewCustomer, PortalSession,
    ProcessorCustomer, ProcessorSubscription,
};
use saasgate_shared::billing::BillingError;
use saasgate_shared::db::migrations::run_migrations;
use saasgate_shared::email::{EmailError, EmailMessage, EmailSender};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::Service as _;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const PASSWORD: &str = "correct-horse-battery";

/// Email sender that keeps every message
#[derive(Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailSender {
    pub fn sent_to(&self, email: &str) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Billing processor that never leaves the process
#[derive(Default)]
pub struct FakeProcessor {
    pub customers_created: AtomicUsize,
}

#[async_trait]
impl BillingProcessor for FakeProcessor {
    async fn create_customer(
        &self,
        customer: &NewCustomer<'_>,
    ) -> Result<ProcessorCustomer, BillingError> {
        self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessorCustomer {
            id: format!("cus_{}", customer.user_id.replace('-', "")),
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
        Err(BillingError::ExternalService(format!(
            "No such subscription: {}",
            subscription_id
        )))
    }
}

/// Configuration for tests; throttles are high enough not to interfere
pub fn test_config(database_url: String) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            production: false,
            cors_origins: vec!["http://localhost:3000".to_string()],
        },
        database: DatabaseConfig {
            url: database_url,
            max_connections: 10,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-that-is-at-least-32-characters".to_string(),
            access_lifetime_minutes: 5,
            refresh_lifetime_days: 7,
            rotate_refresh_tokens: true,
            action_token_ttl_hours: 24,
        },
        cookie: CookieConfig {
            name: "refresh_token".to_string(),
            secure: false,
            domain: None,
        },
        frontend: FrontendConfig {
            url: "http://localhost:3000".to_string(),
            checkout_success_url: "http://localhost:3000/billing/success".to_string(),
            checkout_cancel_url: "http://localhost:3000/billing/cancel".to_string(),
            portal_return_url: "http://localhost:3000/billing/portal/return".to_string(),
        },
        stripe: StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            price_basic_id: "price_basic".to_string(),
            price_pro_id: "price_pro".to_string(),
        },
        plans: PlansConfig {
            default_tier: PLAN_BASIC.to_string(),
            limit_basic: 3,
            limit_pro: 50,
        },
        email: EmailConfig {
            api_key: None,
            from: "test@saasgate.local".to_string(),
        },
        throttle: ThrottleConfig {
            login_per_minute: 10_000,
            register_per_minute: 10_000,
            password_reset_per_minute: 10_000,
        },
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub mailer: Arc<RecordingEmailSender>,
    pub processor: Arc<FakeProcessor>,
}

impl TestContext {
    /// Returns `None` when no database is configured
    pub async fn new() -> Option<Self> {
        Self::with_config(|_| {}).await
    }

    /// Builds a context after letting the caller adjust the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping API test");
            return None;
        };

        let mut config = test_config(url);
        adjust(&mut config);

        let db = PgPool::connect(&config.database.url)
            .await
            .expect("Failed to connect to database");
        run_migrations(&db).await.expect("Failed to run migrations");

        let mailer = Arc::new(RecordingEmailSender::default());
        let processor = Arc::new(FakeProcessor::default());

        let state = AppState::new(db.clone(), config, processor.clone(), mailer.clone());
        let app = build_router(state);

        Some(TestContext {
            db,
            app,
            mailer,
            processor,
        })
    }

    /// Sends a request through the router
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().call(request).await.unwrap()
    }

    pub async fn post_json(&self, uri: &str, body: Value, bearer: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, bearer: &str) -> Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn delete(&self, uri: &str, bearer: &str) -> Response<Body> {
        let request = Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Registers through the API and returns the verification (uid, token)
    pub async fn register(&self, email: &str) -> (String, String) {
        let response = self
            .post_json(
                "/api/auth/register",
                json!({
                    "email": email,
                    "password": PASSWORD,
                    "first_name": "Test",
                    "last_name": "User"
                }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let message = self
            .mailer
            .sent_to(email)
            .pop()
            .expect("No verification email sent");
        link_params(&message.text)
    }

    /// Registers and verifies an account, returning the user id
    pub async fn create_active_user(&self, email: &str) -> Uuid {
        let (uid, token) = self.register(email).await;
        let response = self
            .post_json(
                "/api/auth/verify-email",
                json!({ "uid": uid, "token": token }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        uid.parse().unwrap()
    }

    /// Logs in and returns (access token, Set-Cookie header)
    pub async fn login(&self, email: &str) -> (String, String) {
        let response = self
            .post_json(
                "/api/auth/login",
                json!({ "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = set_cookie(&response).expect("Login did not set a cookie");
        let body = body_json(response).await;
        (body["access"].as_str().unwrap().to_string(), cookie)
    }

    /// Creates an active user and returns (user id, access token, email)
    pub async fn signed_in_user(&self) -> (Uuid, String, String) {
        let email = unique_email();
        let id = self.create_active_user(&email).await;
        let (access, _) = self.login(&email).await;
        (id, access, email)
    }

    pub async fn make_staff(&self, user_id: Uuid) {
        sqlx::query("UPDATE users SET is_staff = TRUE WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await
            .unwrap();
    }
}

pub fn unique_email() -> String {
    format!("user-{}@example.com", Uuid::new_v4())
}

/// Extracts `uid` and `token` from a link in an email body
pub fn link_params(text: &str) -> (String, String) {
    let query = text
        .split_whitespace()
        .find(|word| word.contains("uid="))
        .and_then(|link| link.split_once('?'))
        .map(|(_, query)| query)
        .expect("No link in email");

    let mut uid = None;
    let mut token = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("uid", value)) => uid = Some(value.to_string()),
            Some(("token", value)) => token = Some(value.to_string()),
            _ => {}
        }
    }
    (uid.unwrap(), token.unwrap())
}

pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `name=value` part of a Set-Cookie header
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&body).unwrap()
}
