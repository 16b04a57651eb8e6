/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use saasgate_api::{app::AppState, config::Config};
/// use saasgate_shared::billing::stripe::StripeClient;
/// use saasgate_shared::email::LogEmailSender;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let processor = Arc::new(StripeClient::new(&config.stripe.secret_key, &config.stripe.api_base));
/// let state = AppState::new(pool, config, processor, Arc::new(LogEmailSender));
/// let app = saasgate_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        rate_limit::{throttle, Throttles},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use chrono::Duration;
use saasgate_shared::auth::action_token::ActionTokenSigner;
use saasgate_shared::auth::flow::AuthFlow;
use saasgate_shared::auth::middleware::jwt_auth_middleware;
use saasgate_shared::auth::session::{TokenService, TokenSettings};
use saasgate_shared::billing::ledger::EntitlementLedger;
use saasgate_shared::billing::processor::BillingProcessor;
use saasgate_shared::billing::webhook::WebhookReconciler;
use saasgate_shared::billing::PlanCatalog;
use saasgate_shared::email::EmailSender;
use saasgate_shared::quota::AppQuota;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every field
/// is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Price and limit tables
    pub catalog: Arc<PlanCatalog>,

    pub tokens: Arc<TokenService>,

    pub auth: AuthFlow,

    pub ledger: EntitlementLedger,

    pub webhooks: WebhookReconciler,

    pub quota: AppQuota,

    pub throttles: Throttles,
}

impl AppState {
    /// Wires the domain services from configuration and the two outbound ports
    pub fn new(
        db: PgPool,
        config: Config,
        processor: Arc<dyn BillingProcessor>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let catalog = Arc::new(config.plan_catalog());

        let tokens = TokenService::new(TokenSettings {
            secret: config.jwt.secret.clone(),
            access_lifetime: Duration::minutes(config.jwt.access_lifetime_minutes),
            refresh_lifetime: Duration::days(config.jwt.refresh_lifetime_days),
            rotate_refresh_tokens: config.jwt.rotate_refresh_tokens,
        });

        let signer = ActionTokenSigner::new(
            &config.jwt.secret,
            Duration::hours(config.jwt.action_token_ttl_hours),
        );

        let auth = AuthFlow::new(
            db.clone(),
            tokens.clone(),
            signer,
            mailer,
            config.frontend.url.clone(),
            catalog.default_tier(),
        );

        let ledger = EntitlementLedger::new(
            db.clone(),
            catalog.clone(),
            processor,
            config.billing_urls(),
        );

        let webhooks = WebhookReconciler::new(ledger.clone(), config.stripe.webhook_secret.clone());
        let quota = AppQuota::new(db.clone(), catalog.clone());

        let throttles = Throttles::new(
            config.throttle.login_per_minute,
            config.throttle.register_per_minute,
            config.throttle.password_reset_per_minute,
        );

        Self {
            db,
            config: Arc::new(config),
            catalog,
            tokens: Arc::new(tokens),
            auth,
            ledger,
            webhooks,
            quota,
            throttles,
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /api
/// ├── GET  /health
/// ├── /auth
/// │   ├── POST /register            (throttled)
/// │   ├── POST /verify-email
/// │   ├── POST /login               (throttled)
/// │   ├── POST /token/refresh
/// │   ├── POST /logout              (bearer)
/// │   ├── POST /forgot-password     (throttled)
/// │   └── POST /reset-password      (throttled)
/// ├── /subscriptions
/// │   ├── POST /stripe/webhook      (signature)
/// │   ├── POST /stripe/checkout     (bearer)
/// │   ├── POST /stripe/portal       (bearer)
/// │   └── GET  /me                  (bearer)
/// ├── /apps                         (bearer)
/// │   ├── GET|POST /
/// │   ├── GET|PUT|PATCH|DELETE /:id
/// │   └── /:id/collaborators
/// │       ├── GET|POST /
/// │       └── DELETE /:user_id
/// └── /admin/users                  (bearer, staff)
///     ├── GET /
///     └── GET|PATCH /:id
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication and throttling (per-route)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let bearer = from_fn_with_state(state.tokens.clone(), jwt_auth_middleware);
    let throttles = &state.throttles;

    let auth_routes = Router::new()
        .route(
            "/register",
            post(routes::auth::register)
                .layer(from_fn_with_state(throttles.register.clone(), throttle)),
        )
        .route("/verify-email", post(routes::auth::verify_email))
        .route(
            "/login",
            post(routes::auth::login).layer(from_fn_with_state(throttles.login.clone(), throttle)),
        )
        .route("/token/refresh", post(routes::auth::refresh))
        .route(
            "/logout",
            post(routes::auth::logout).layer(bearer.clone()),
        )
        .route(
            "/forgot-password",
            post(routes::auth::forgot_password)
                .layer(from_fn_with_state(throttles.password_reset.clone(), throttle)),
        )
        .route(
            "/reset-password",
            post(routes::auth::reset_password)
                .layer(from_fn_with_state(throttles.password_reset.clone(), throttle)),
        );

    let subscription_routes = Router::new()
        .route("/stripe/checkout", post(routes::subscriptions::create_checkout))
        .route("/stripe/portal", post(routes::subscriptions::create_portal))
        .route("/me", get(routes::subscriptions::my_subscription))
        .route_layer(bearer.clone())
        .route("/stripe/webhook", post(routes::subscriptions::webhook));

    let app_routes = Router::new()
        .route("/", get(routes::apps::list_apps).post(routes::apps::create_app))
        .route(
            "/:id",
            get(routes::apps::get_app)
                .put(routes::apps::update_app)
                .patch(routes::apps::update_app)
                .delete(routes::apps::delete_app),
        )
        .route(
            "/:id/collaborators",
            get(routes::collaborators::list_collaborators)
                .post(routes::collaborators::add_collaborator),
        )
        .route(
            "/:id/collaborators/:user_id",
            axum::routing::delete(routes::collaborators::remove_collaborator),
        )
        .route_layer(bearer.clone());

    let admin_routes = Router::new()
        .route("/users", get(routes::admin::list_users))
        .route(
            "/users/:id",
            get(routes::admin::get_user).patch(routes::admin::update_user),
        )
        .route_layer(bearer);

    let api_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/auth", auth_routes)
        .nest("/subscriptions", subscription_routes)
        .nest("/apps", app_routes)
        .nest("/admin", admin_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .nest("/api", api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}
