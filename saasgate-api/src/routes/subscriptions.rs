/// Subscription endpoints
///
/// # Endpoints
///
/// - `POST /api/subscriptions/stripe/checkout` - Start a checkout for a plan
/// - `POST /api/subscriptions/stripe/portal` - Open the billing portal
/// - `GET /api/subscriptions/me` - Current subscription, or `null`
/// - `POST /api/subscriptions/stripe/webhook` - Processor events (signature-verified)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::State,
    http::HeaderMap,
    Extension, Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use saasgate_shared::auth::middleware::AuthContext;
use saasgate_shared::billing::webhook::WebhookOutcome;
use saasgate_shared::models::subscription::{Subscription, SubscriptionStatus};
use saasgate_shared::models::user::User;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Header carrying `t=<unix>,v1=<hex>`
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub portal_url: String,
}

/// Subscription as shown to its owner
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionView {
    pub status: SubscriptionStatus,
    pub plan_id: String,
    pub price_id: Option<String>,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub stripe_subscription_id: Option<String>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        SubscriptionView {
            status: sub.status,
            plan_id: sub.plan_id,
            price_id: sub.price_id,
            cancel_at_period_end: sub.cancel_at_period_end,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            trial_end: sub.trial_end,
            stripe_subscription_id: sub.stripe_subscription_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MySubscriptionResponse {
    pub subscription: Option<SubscriptionView>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Loads the caller; a token for a deleted user is treated as unauthenticated
async fn current_user(state: &AppState, auth: &AuthContext) -> ApiResult<User> {
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))
}

/// Start a checkout session
///
/// # Errors
///
/// - `400`: plan not in the catalog
/// - `502`: billing processor failure
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    req.validate()?;

    let user = current_user(&state, &auth).await?;
    let checkout_url = state.ledger.create_checkout(&user, &req.plan_id).await?;

    Ok(Json(CheckoutResponse { checkout_url }))
}

pub async fn create_portal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<PortalResponse>> {
    let user = current_user(&state, &auth).await?;
    let portal_url = state.ledger.create_portal(&user).await?;

    Ok(Json(PortalResponse { portal_url }))
}

pub async fn my_subscription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MySubscriptionResponse>> {
    let subscription = state.ledger.subscription_for(auth.user_id).await?;

    Ok(Json(MySubscriptionResponse {
        subscription: subscription.map(SubscriptionView::from),
    }))
}

/// Processor webhook
///
/// Verifies the signature over the raw body before parsing. Unknown event
/// types and events with no local record are acknowledged with 200.
///
/// # Errors
///
/// - `400`: missing or invalid signature, unparseable payload
/// - `502`: the processor could not be reached while fetching the subscription
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.handle(&body, signature).await?;

    match &outcome {
        WebhookOutcome::Applied(sub) => {
            tracing::debug!(user_id = %sub.user_id, status = %sub.status, "Webhook applied")
        }
        WebhookOutcome::Unmatched => tracing::info!("Webhook had no matching subscription"),
        WebhookOutcome::Linked | WebhookOutcome::Ignored => {}
    }

    Ok(Json(WebhookAck { received: true }))
}
