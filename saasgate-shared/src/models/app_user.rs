/// App membership model and database operations
///
/// Links a user to an app with a role. Roles are ordered
/// (`viewer` < `editor` < `owner`) and every app keeps exactly one owner
/// membership: it is created together with the app and can never be removed.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE app_role AS ENUM ('owner', 'editor', 'viewer');
///
/// CREATE TABLE app_users (
///     app_id UUID NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role app_role NOT NULL DEFAULT 'viewer',
///     invited_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (app_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Role of a user within an app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "app_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    /// Full control: update, delete, manage collaborators
    Owner,

    /// Read and update
    Editor,

    /// Read-only
    Viewer,
}

impl Default for AppRole {
    fn default() -> Self {
        AppRole::Viewer
    }
}

impl AppRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRole::Owner => "owner",
            AppRole::Editor => "editor",
            AppRole::Viewer => "viewer",
        }
    }

    /// Checks if this role is at least as privileged as `required`
    pub fn has_permission(&self, required: &AppRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    fn permission_level(&self) -> u8 {
        match self {
            AppRole::Owner => 3,
            AppRole::Editor => 2,
            AppRole::Viewer => 1,
        }
    }
}

impl std::fmt::Display for AppRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AppUser {
    pub app_id: Uuid,
    pub user_id: Uuid,
    pub role: AppRole,
    pub invited_at: DateTime<Utc>,
}

/// Membership joined with the member's email, as shown to app owners
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Collaborator {
    pub user_id: Uuid,
    pub email: String,
    pub role: AppRole,
    pub invited_at: DateTime<Utc>,
}

impl AppUser {
    /// Adds a membership
    ///
    /// # Errors
    ///
    /// Fails with the primary-key constraint when the user is already a
    /// member, or `app_users_single_owner_idx` on a second owner.
    pub async fn create(
        conn: &mut PgConnection,
        app_id: Uuid,
        user_id: Uuid,
        role: AppRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AppUser>(
            r#"
            INSERT INTO app_users (app_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING app_id, user_id, role, invited_at
            "#,
        )
        .bind(app_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(conn)
        .await
    }

    pub async fn find(
        pool: &PgPool,
        app_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AppUser>(
            r#"
            SELECT app_id, user_id, role, invited_at
            FROM app_users
            WHERE app_id = $1 AND user_id = $2
            "#,
        )
        .bind(app_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn get_role(
        pool: &PgPool,
        app_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AppRole>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT role FROM app_users
            WHERE app_id = $1 AND user_id = $2
            "#,
        )
        .bind(app_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists an app's members with their emails, oldest invitation first
    pub async fn list_collaborators(
        pool: &PgPool,
        app_id: Uuid,
    ) -> Result<Vec<Collaborator>, sqlx::Error> {
        sqlx::query_as::<_, Collaborator>(
            r#"
            SELECT au.user_id, u.email, au.role, au.invited_at
            FROM app_users au
            JOIN users u ON u.id = au.user_id
            WHERE au.app_id = $1
            ORDER BY au.invited_at ASC
            "#,
        )
        .bind(app_id)
        .fetch_all(pool)
        .await
    }

    /// Deletes a non-owner membership
    ///
    /// The `role <> 'owner'` guard keeps the owner row even if a caller skips
    /// the role check. Returns whether a row was removed.
    pub async fn delete_non_owner(
        pool: &PgPool,
        app_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM app_users WHERE app_id = $1 AND user_id = $2 AND role <> 'owner'",
        )
        .bind(app_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
