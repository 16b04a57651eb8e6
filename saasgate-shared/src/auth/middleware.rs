/// Authentication middleware for Axum
///
/// Validates `Authorization: Bearer <access token>` and adds an
/// [`AuthContext`] to the request extensions. Access tokens are verified
/// without a database lookup.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Extension, Router};
/// use saasgate_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
/// use saasgate_shared::auth::session::TokenService;
/// use std::sync::Arc;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, user {}!", auth.user_id)
/// }
///
/// fn router(tokens: Arc<TokenService>) -> Router {
///     Router::new()
///         .route("/protected", get(handler))
///         .layer(middleware::from_fn_with_state(tokens, jwt_auth_middleware))
/// }
/// ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::Claims;
use super::session::{TokenError, TokenService};

/// Authentication context added to request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// ID of the access token used
    pub token_id: Uuid,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub,
            token_id: claims.jti,
        }
    }
}

/// Error type for authentication middleware
#[derive(Debug)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Invalid authorization header format
    InvalidFormat(String),

    /// Token validation failed
    InvalidToken(String),
}

impl AuthError {
    pub fn message(&self) -> String {
        match self {
            AuthError::MissingCredentials => {
                "Authentication credentials were not provided.".to_string()
            }
            AuthError::InvalidFormat(msg) | AuthError::InvalidToken(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": "unauthorized",
            "message": self.message(),
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Extracts and verifies the bearer token from request headers
pub fn authenticate(tokens: &TokenService, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    let claims = tokens.verify_access_token(token).map_err(|e| match e {
        TokenError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    Ok(AuthContext::from_claims(&claims))
}

/// JWT authentication middleware
///
/// Returns 401 if the header is missing, malformed, or carries an invalid or
/// expired access token.
pub async fn jwt_auth_middleware(
    State(tokens): State<Arc<TokenService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_context = authenticate(&tokens, req.headers())?;
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
