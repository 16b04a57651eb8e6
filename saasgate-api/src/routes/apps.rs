/// App endpoints
///
/// Every app is visible only to its members; non-members get 404.
///
/// | Method          | Path            | Minimum role |
/// |-----------------|-----------------|--------------|
/// | `GET`           | `/api/apps`     | member       |
/// | `POST`          | `/api/apps`     | (plan limit) |
/// | `GET`           | `/api/apps/:id` | viewer       |
/// | `PUT`, `PATCH`  | `/api/apps/:id` | editor       |
/// | `DELETE`        | `/api/apps/:id` | owner        |

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
use saasgate_shared::models::app::{App, CreateApp, MemberApp, UpdateApp};
use saasgate_shared::models::app_user::AppRole;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update; omitted fields are kept
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAppRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

fn member_view(app: App, role: AppRole) -> MemberApp {
    MemberApp {
        id: app.id,
        name: app.name,
        description: app.description,
        created_at: app.created_at,
        updated_at: app.updated_at,
        role,
    }
}

/// List the caller's apps, newest first
pub async fn list_apps(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<MemberApp>>> {
    let apps = App::list_for_member(&state.db, auth.user_id).await?;
    Ok(Json(apps))
}

/// Create an app owned by the caller
///
/// # Errors
///
/// - `400`: validation failed, or the caller already has an app with this name
/// - `403`: plan limit reached (`code = "APP_LIMIT_REACHED"`)
pub async fn create_app(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateAppRequest>,
) -> ApiResult<(StatusCode, Json<MemberApp>)> {
    req.validate()?;

    let app = state
        .quota
        .create_app(
            auth.user_id,
            CreateApp {
                name: req.name,
                description: req.description.unwrap_or_default(),
            },
        )
        .await?;

    tracing::info!(app_id = %app.id, user_id = %auth.user_id, "App created");

    Ok((StatusCode::CREATED, Json(member_view(app, AppRole::Owner))))
}

pub async fn get_app(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MemberApp>> {
    require_permission(&state.db, id, auth.user_id, AppPermission::Read).await?;

    let app = App::find_for_member(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found.".to_string()))?;

    Ok(Json(app))
}

/// Update name and/or description (owner or editor)
pub async fn update_app(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAppRequest>,
) -> ApiResult<Json<MemberApp>> {
    req.validate()?;

    let role = require_permission(&state.db, id, auth.user_id, AppPermission::Update).await?;

    let app = App::update(
        &state.db,
        id,
        UpdateApp {
            name: req.name,
            description: req.description,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Not found.".to_string()))?;

    Ok(Json(member_view(app, role)))
}

/// Delete an app with all its memberships (owner only)
pub async fn delete_app(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, id, auth.user_id, AppPermission::Delete).await?;

    if !App::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Not found.".to_string()));
    }

    tracing::info!(app_id = %id, user_id = %auth.user_id, "App deleted");
    Ok(StatusCode::NO_CONTENT)
}
