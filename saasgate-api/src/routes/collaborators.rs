/// Collaborator endpoints (app owner only)
///
/// # Endpoints
///
/// - `GET /api/apps/:id/collaborators` - List members with their roles
/// - `POST /api/apps/:id/collaborators` - Add a member by email
/// - `DELETE /api/apps/:id/collaborators/:user_id` - Remove a non-owner member
///
/// An app always has exactly one owner; the owner membership can be neither
/// added nor removed here.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use saasgate_shared::auth::authorization::{require_permission, AppPermission};
use saasgate_shared::auth::middleware::AuthContext;
use saasgate_shared::models::app_user::{AppRole, AppUser, Collaborator};
use saasgate_shared::models::user::User;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddCollaboratorRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,

    #[serde(default)]
    pub role: AppRole,
}

pub async fn list_collaborators(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(app_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Collaborator>>> {
    require_permission(&state.db, app_id, auth.user_id, AppPermission::ManageCollaborators)
        .await?;

    let collaborators = AppUser::list_collaborators(&state.db, app_id).await?;
    Ok(Json(collaborators))
}

/// Add a collaborator
///
/// # Errors
///
/// - `400`: role `owner`, unknown email, or already a member
/// - `403`: caller is not the owner
/// - `404`: caller is not a member
pub async fn add_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(app_id): Path<Uuid>,
    Json(req): Json<AddCollaboratorRequest>,
) -> ApiResult<(StatusCode, Json<Collaborator>)> {
    req.validate()?;

    require_permission(&state.db, app_id, auth.user_id, AppPermission::ManageCollaborators)
        .await?;

    if req.role == AppRole::Owner {
        return Err(ApiError::field("role", "An app can only have one owner."));
    }

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::field("email", "User not found."))?;

    if AppUser::find(&state.db, app_id, user.id).await?.is_some() {
        return Err(ApiError::field("email", "User already a collaborator."));
    }

    let mut conn = state.db.acquire().await?;
    let membership = match AppUser::create(&mut *conn, app_id, user.id, req.role).await {
        Ok(membership) => membership,
        // Lost a race with a concurrent add
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(ApiError::field("email", "User already a collaborator."));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        app_id = %app_id,
        user_id = %user.id,
        role = %membership.role,
        added_by = %auth.user_id,
        "Collaborator added"
    );

    Ok((
        StatusCode::CREATED,
        Json(Collaborator {
            user_id: user.id,
            email: user.email,
            role: membership.role,
            invited_at: membership.invited_at,
        }),
    ))
}

/// Remove a collaborator
///
/// # Errors
///
/// - `400`: the target is the owner
/// - `404`: no such membership
pub async fn remove_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((app_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, app_id, auth.user_id, AppPermission::ManageCollaborators)
        .await?;

    let membership = AppUser::find(&state.db, app_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found.".to_string()))?;

    if membership.role == AppRole::Owner {
        return Err(ApiError::BadRequest("Cannot remove owner.".to_string()));
    }

    if !AppUser::delete_non_owner(&state.db, app_id, user_id).await? {
        return Err(ApiError::NotFound("Not found.".to_string()));
    }

    tracing::info!(app_id = %app_id, user_id = %user_id, removed_by = %auth.user_id, "Collaborator removed");
    Ok(StatusCode::NO_CONTENT)
}
