/// Authorization helpers and permission checks
///
/// # Permission Model
///
/// 1. **App membership**: a user sees an app only through an `app_users` row;
///    non-members are told the app does not exist
/// 2. **Role-based permissions**: `viewer` < `editor` < `owner`
/// 3. **Staff**: the admin surface requires `users.is_staff`
///
/// # Example
///
/// ```no_run
/// use saasgate_shared::auth::authorization::{require_permission, AppPermission};
/// use saasgate_shared::auth::middleware::AuthContext;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// async fn check_permissions(
///     pool: &PgPool,
///     auth: &AuthContext,
///     app_id: Uuid,
/// ) -> Result<(), Box<dyn std::error::Error>> {
///     // Editors and owners may update
///     require_permission(pool, app_id, auth.user_id, AppPermission::Update).await?;
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::app_user::{AppRole, AppUser};
use crate::models::user::User;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// User is not a member of the app
    #[error("Not a member of app {0}")]
    NotMember(Uuid),

    /// User doesn't have required role
    #[error("Insufficient permissions: requires {required}, has {actual}")]
    InsufficientRole { required: AppRole, actual: AppRole },

    /// User is not staff
    #[error("Staff access required")]
    NotStaff,

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Permission types for app authorization checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPermission {
    /// Read permission (Viewer+)
    Read,

    /// Update permission (Editor+)
    Update,

    /// Delete the app (Owner only)
    Delete,

    /// Add or remove collaborators (Owner only)
    ManageCollaborators,
}

impl AppPermission {
    /// Gets the minimum role required for this permission
    pub fn min_role(&self) -> AppRole {
        match self {
            AppPermission::Read => AppRole::Viewer,
            AppPermission::Update => AppRole::Editor,
            AppPermission::Delete | AppPermission::ManageCollaborators => AppRole::Owner,
        }
    }
}

/// Checks a role against a permission without touching the database
pub fn check_role(app_id: Uuid, role: Option<AppRole>, permission: AppPermission) -> Result<AppRole, AuthzError> {
    let role = role.ok_or(AuthzError::NotMember(app_id))?;
    let required = permission.min_role();

    if !role.has_permission(&required) {
        return Err(AuthzError::InsufficientRole {
            required,
            actual: role,
        });
    }

    Ok(role)
}

/// Checks that a user holds a permission on an app
///
/// Returns the user's role on success.
///
/// # Errors
///
/// - `NotMember` if the user has no membership (or the app does not exist)
/// - `InsufficientRole` if the role is too low
pub async fn require_permission(
    pool: &PgPool,
    app_id: Uuid,
    user_id: Uuid,
    permission: AppPermission,
) -> Result<AppRole, AuthzError> {
    let role = AppUser::get_role(pool, app_id, user_id).await?;
    check_role(app_id, role, permission)
}

/// Loads the user and checks the staff flag
pub async fn require_staff(pool: &PgPool, user_id: Uuid) -> Result<User, AuthzError> {
    match User::find_by_id(pool, user_id).await? {
        Some(user) if user.is_staff => Ok(user),
        _ => Err(AuthzError::NotStaff),
    }
}
