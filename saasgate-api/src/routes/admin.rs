/// Staff-only user management
///
/// # Endpoints
///
/// - `GET /api/admin/users?email=&user_type=&is_disabled_by_admin=&subscription_status=`
/// - `GET /api/admin/users/:id`
/// - `PATCH /api/admin/users/:id` `{"is_disabled_by_admin": true}`
///
/// The plan tier is read-only here; only the entitlement ledger writes it.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use saasgate_shared::auth::authorization::require_staff;
use saasgate_shared::auth::middleware::AuthContext;
use saasgate_shared::models::user::{User, UserFilter, UserOverview};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub is_disabled_by_admin: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Json<Vec<UserOverview>>> {
    require_staff(&state.db, auth.user_id).await?;

    let users = User::list_overview(&state.db, &filter).await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserOverview>> {
    require_staff(&state.db, auth.user_id).await?;

    let user = User::find_overview(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found.".to_string()))?;

    Ok(Json(user))
}

/// Disable or re-enable an account
///
/// A disabled user can no longer log in or refresh tokens.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserOverview>> {
    require_staff(&state.db, auth.user_id).await?;

    User::set_disabled_by_admin(&state.db, id, req.is_disabled_by_admin)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found.".to_string()))?;

    tracing::info!(
        user_id = %id,
        disabled = req.is_disabled_by_admin,
        staff_id = %auth.user_id,
        "Admin updated user"
    );

    let user = User::find_overview(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found.".to_string()))?;

    Ok(Json(user))
}
