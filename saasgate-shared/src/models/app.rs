/// App model and database operations
///
/// Apps are owned resources shared through [`super::app_user`] memberships.
/// `(owner_id, name)` is unique.

use super::app_user::AppRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct App {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// App as seen by one member, including that member's role
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberApp {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub role: AppRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApp {
    pub name: String,
    pub description: String,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateApp {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl App {
    /// Inserts the app row; the caller adds the owner membership in the same transaction
    pub async fn create(
        conn: &mut PgConnection,
        owner_id: Uuid,
        data: CreateApp,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, App>(
            r#"
            INSERT INTO apps (owner_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, owner_id, name, description, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(data.name)
        .bind(data.description)
        .fetch_one(conn)
        .await
    }

    /// Number of apps owned by a user
    pub async fn count_owned(conn: &mut PgConnection, owner_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM apps WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(conn)
            .await?;

        Ok(count)
    }

    /// Loads an app together with the caller's role, `None` for non-members
    pub async fn find_for_member(
        pool: &PgPool,
        app_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberApp>, sqlx::Error> {
        sqlx::query_as::<_, MemberApp>(
            r#"
            SELECT a.id, a.name, a.description, a.created_at, a.updated_at, au.role
            FROM apps a
            JOIN app_users au ON au.app_id = a.id
            WHERE a.id = $1 AND au.user_id = $2
            "#,
        )
        .bind(app_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists every app the user belongs to, newest first
    pub async fn list_for_member(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<MemberApp>, sqlx::Error> {
        sqlx::query_as::<_, MemberApp>(
            r#"
            SELECT a.id, a.name, a.description, a.created_at, a.updated_at, au.role
            FROM apps a
            JOIN app_users au ON au.app_id = a.id
            WHERE au.user_id = $1
            ORDER BY a.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateApp,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, App>(
            r#"
            UPDATE apps
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, owner_id, name, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .fetch_optional(pool)
        .await
    }

    /// Deletes an app and, by cascade, its memberships
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM apps WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_app_default_changes_nothing() {
        let update = UpdateApp::default();
        assert!(update.name.is_none());
        assert!(update.description.is_none());
    }

    #[test]
    fn test_member_app_serializes_role() {
        let app = MemberApp {
            id: Uuid::new_v4(),
            name: "Dashboard".to_string(),
            description: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            role: AppRole::Editor,
        };

        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["role"], "editor");
        assert_eq!(json["name"], "Dashboard");
    }
}
