/// Error handling for the API server
///
/// All handlers return `Result<T, ApiError>`; every shared-crate error converts
/// into an `ApiError`, which renders as
/// `{"error": code, "message": text, "details"?: [...]}`.
///
/// # Example
///
/// ```
/// use saasgate_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::{json, Value};
///
/// async fn handler(name: String) -> ApiResult<Json<Value>> {
///     if name.is_empty() {
///         return Err(ApiError::field("name", "This field may not be blank."));
///     }
///     Ok(Json(json!({ "name": name })))
/// }
/// ```

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use saasgate_shared::auth::authorization::AuthzError;
use saasgate_shared::auth::flow::{AuthFlowError, EMAIL_UNIQUE_CONSTRAINT};
use saasgate_shared::auth::middleware::AuthError;
use saasgate_shared::auth::password::PasswordError;
use saasgate_shared::auth::session::TokenError;
use saasgate_shared::billing::webhook::WebhookError;
use saasgate_shared::billing::BillingError;
use saasgate_shared::quota::QuotaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Constraint on `(apps.owner_id, apps.name)`
pub const APP_NAME_UNIQUE_CONSTRAINT: &str = "apps_owner_name_key";

/// Code carried by plan-limit rejections
pub const APP_LIMIT_REACHED_CODE: &str = "APP_LIMIT_REACHED";

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Field-level validation failure (400)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Plan limit reached (403)
    AppLimitReached { tier: String, limit: i64 },

    /// Not found (404)
    NotFound(String),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    InternalError(String),

    /// Billing processor failure (502)
    BadGateway(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, message: String) -> Self {
        Self {
            error: error.to_string(),
            message,
            details: None,
            code: None,
            limit: None,
            tier: None,
        }
    }
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::AppLimitReached { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::AppLimitReached { tier, .. } => {
                write!(f, "App limit reached for plan {}.", tier)
            }
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (body, retry_after) = match self {
            ApiError::BadRequest(msg) => (ErrorResponse::new("bad_request", msg), None),
            ApiError::ValidationError(errors) => {
                let message = match errors.as_slice() {
                    [only] => only.message.clone(),
                    _ => "Request validation failed".to_string(),
                };
                let mut body = ErrorResponse::new("validation_error", message);
                body.details = Some(errors);
                (body, None)
            }
            ApiError::Unauthorized(msg) => (ErrorResponse::new("unauthorized", msg), None),
            ApiError::Forbidden(msg) => (ErrorResponse::new("forbidden", msg), None),
            ApiError::AppLimitReached { tier, limit } => {
                let mut body = ErrorResponse::new(
                    "app_limit_reached",
                    format!("App limit reached for plan {}.", tier),
                );
                body.code = Some(APP_LIMIT_REACHED_CODE.to_string());
                body.limit = Some(limit);
                body.tier = Some(tier);
                (body, None)
            }
            ApiError::NotFound(msg) => (ErrorResponse::new("not_found", msg), None),
            ApiError::RateLimitExceeded {
                retry_after,
                message,
            } => (
                ErrorResponse::new("rate_limit_exceeded", message),
                Some(retry_after),
            ),
            ApiError::InternalError(msg) => {
                // Logged here, never shown to clients
                tracing::error!("Internal error: {}", msg);
                (
                    ErrorResponse::new("internal_error", "An internal error occurred".to_string()),
                    None,
                )
            }
            ApiError::BadGateway(msg) => {
                tracing::error!("Billing processor error: {}", msg);
                (
                    ErrorResponse::new(
                        "external_service_error",
                        "The billing service is unavailable. Please try again later.".to_string(),
                    ),
                    None,
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Not found.".to_string()),
            sqlx::Error::Database(db_err) => match db_err.constraint() {
                Some(APP_NAME_UNIQUE_CONSTRAINT) => {
                    ApiError::field("name", "You already have an app with this name.")
                }
                Some(EMAIL_UNIQUE_CONSTRAINT) => {
                    ApiError::field("email", "A user with that email already exists.")
                }
                _ => ApiError::InternalError(format!("Database error: {}", db_err)),
            },
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert request validation failures
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(errors)
    }
}

/// Convert bearer-authentication errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.message())
    }
}

/// Convert authorization errors
///
/// Non-members see the app as missing.
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember(_) => ApiError::NotFound("Not found.".to_string()),
            AuthzError::InsufficientRole { .. } | AuthzError::NotStaff => ApiError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ),
            AuthzError::DatabaseError(err) => err.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert token errors (refresh and logout bodies)
impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid | TokenError::Expired | TokenError::Blacklisted => {
                ApiError::BadRequest("Token is invalid or expired.".to_string())
            }
            TokenError::Signing(msg) => ApiError::InternalError(format!("Token signing failed: {}", msg)),
            TokenError::Database(err) => err.into(),
        }
    }
}

impl From<AuthFlowError> for ApiError {
    fn from(err: AuthFlowError) -> Self {
        match err {
            AuthFlowError::EmailTaken => ApiError::field("email", err.to_string()),
            AuthFlowError::WeakPassword { field, message } => ApiError::field(field, message),
            AuthFlowError::InvalidUser
            | AuthFlowError::UserDisabled
            | AuthFlowError::InvalidOrExpiredToken
            | AuthFlowError::InvalidCredentials
            | AuthFlowError::NotVerified
            | AuthFlowError::MissingToken => ApiError::BadRequest(err.to_string()),
            AuthFlowError::Token(err) => err.into(),
            AuthFlowError::Password(err) => err.into(),
            AuthFlowError::Database(err) => err.into(),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::ExternalService(_) | BillingError::UnexpectedResponse(_) => {
                ApiError::BadGateway(err.to_string())
            }
            BillingError::UnknownPlan(_) => ApiError::field("plan_id", "Unknown plan."),
            BillingError::Database(err) => err.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidPayload(msg) => {
                tracing::warn!(error = %msg, "Rejected webhook payload");
                ApiError::BadRequest("Invalid payload.".to_string())
            }
            WebhookError::InvalidSignature(msg) => {
                tracing::warn!(error = %msg, "Rejected webhook signature");
                ApiError::BadRequest("Invalid signature.".to_string())
            }
            WebhookError::Billing(err) => err.into(),
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::AppLimitReached { tier, limit, .. } => {
                ApiError::AppLimitReached { tier, limit }
            }
            QuotaError::OwnerNotFound(_) => {
                ApiError::Unauthorized("User not found.".to_string())
            }
            QuotaError::DatabaseError(err) => err.into(),
        }
    }
}
