/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/auth/register` - Create an inactive account and mail a verification link
/// - `POST /api/auth/verify-email` - Activate an account
/// - `POST /api/auth/login` - Get an access token; the refresh token goes in a cookie
/// - `POST /api/auth/token/refresh` - Exchange a refresh token (body or cookie)
/// - `POST /api/auth/logout` - Clear the cookie and revoke the refresh token
/// - `POST /api/auth/forgot-password` - Mail a reset link
/// - `POST /api/auth/reset-password` - Set a new password
///
/// The refresh token is never returned in a response body.

use crate::{
    app::AppState,
    config::CookieConfig,
    error::ApiResult,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use saasgate_shared::auth::flow::Registration;
use saasgate_shared::auth::middleware::AuthContext;
use saasgate_shared::auth::session::{IssuedToken, TokenPair};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub first_name: Option<String>,

    #[serde(default)]
    #[validate(length(max = 150, message = "Ensure this field has no more than 150 characters."))]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,

    pub password: String,
}

/// Refresh and logout body; the cookie is used when `refresh` is absent
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub uid: String,

    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Access-token response
#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: String,

    /// Seconds until the access token expires
    pub expires_in: i64,
}

impl From<&IssuedToken> for AccessResponse {
    fn from(token: &IssuedToken) -> Self {
        AccessResponse {
            access: token.token.clone(),
            expires_in: token.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: &'static str,
}

/// Builds the http-only refresh cookie
pub fn refresh_cookie(config: &CookieConfig, token: &IssuedToken) -> Cookie<'static> {
    let mut cookie = Cookie::build((config.name.clone(), token.token.clone()))
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(token.expires_in));

    if let Some(domain) = &config.domain {
        cookie = cookie.domain(domain.clone());
    }

    cookie.build()
}

/// Cookie matching the refresh cookie's path and domain, for removal
fn removal_cookie(config: &CookieConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(config.name.clone()).path("/");

    if let Some(domain) = &config.domain {
        cookie = cookie.domain(domain.clone());
    }

    cookie.build()
}

fn with_tokens(state: &AppState, jar: CookieJar, pair: &TokenPair) -> (CookieJar, Json<AccessResponse>) {
    let jar = jar.add(refresh_cookie(&state.config.cookie, &pair.refresh));
    (jar, Json(AccessResponse::from(&pair.access)))
}

/// Body token first, then the cookie
fn presented_refresh_token(state: &AppState, jar: &CookieJar, body: Option<RefreshRequest>) -> Option<String> {
    body.and_then(|b| b.refresh)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            jar.get(&state.config.cookie.name)
                .map(|c| c.value().to_string())
        })
}

/// Register a new user
///
/// # Response
///
/// `201 {"detail": "Verification email sent."}`
///
/// # Errors
///
/// - `400`: validation failed or the email is taken
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<DetailResponse>)> {
    req.validate()?;

    state
        .auth
        .register(Registration {
            email: req.email,
            password: req.password,
            first_name: req.first_name.unwrap_or_default(),
            last_name: req.last_name.unwrap_or_default(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DetailResponse {
            detail: "Verification email sent.",
        }),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<Json<DetailResponse>> {
    state.auth.verify_email(&req.uid, &req.token).await?;

    Ok(Json(DetailResponse {
        detail: "Email verified.",
    }))
}

/// Login with email and password
///
/// # Response
///
/// `200 {"access": "...", "expires_in": 300}` plus a `Set-Cookie` carrying the
/// refresh token.
///
/// # Errors
///
/// - `400`: invalid credentials, unverified or disabled account
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<AccessResponse>)> {
    req.validate()?;

    let pair = state.auth.login(&req.email, &req.password).await?;
    Ok(with_tokens(&state, jar, &pair))
}

/// Exchange a refresh token for a new access token
///
/// # Errors
///
/// - `400`: no token found, or the token is invalid, expired or revoked
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<(CookieJar, Json<AccessResponse>)> {
    let token = presented_refresh_token(&state, &jar, body.map(|Json(b)| b));

    let pair = state.auth.refresh(token.as_deref()).await?;
    Ok(with_tokens(&state, jar, &pair))
}

/// Logout
///
/// Always clears the cookie and answers 204; revocation is best effort.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> (CookieJar, StatusCode) {
    let token = presented_refresh_token(&state, &jar, body.map(|Json(b)| b));
    let jar = jar.remove(removal_cookie(&state.config.cookie));

    state.auth.logout(token.as_deref()).await;
    tracing::info!(user_id = %auth.user_id, "User logged out");

    (jar, StatusCode::NO_CONTENT)
}

/// Request a password reset link
///
/// Answers the same whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<DetailResponse>> {
    req.validate()?;

    state.auth.forgot_password(&req.email).await?;

    Ok(Json(DetailResponse {
        detail: "If the account exists, an email has been sent.",
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<DetailResponse>> {
    req.validate()?;

    state
        .auth
        .reset_password(&req.uid, &req.token, &req.new_password)
        .await?;

    Ok(Json(DetailResponse {
        detail: "Password has been reset.",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie_config(domain: Option<&str>) -> CookieConfig {
        CookieConfig {
            name: "refresh_token".to_string(),
            secure: true,
            domain: domain.map(str::to_string),
        }
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let token = IssuedToken {
            token: "abc".to_string(),
            expires_in: 604_800,
        };
        let cookie = refresh_cookie(&cookie_config(Some("example.com")), &token);

        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(604_800)));
    }

    #[test]
    fn test_register_validation() {
        let req = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            first_name: None,
            last_name: None,
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_refresh_request_defaults() {
        let req: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(req.refresh.is_none());
    }
}
