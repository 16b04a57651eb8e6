/// User model and database operations
///
/// Users register inactive, become active after email verification and carry a
/// denormalized plan tier (`user_type`) that mirrors their subscription.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL,              -- unique on LOWER(email)
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(150) NOT NULL DEFAULT '',
///     last_name VARCHAR(150) NOT NULL DEFAULT '',
///     is_active BOOLEAN NOT NULL DEFAULT FALSE,
///     is_disabled_by_admin BOOLEAN NOT NULL DEFAULT FALSE,
///     is_staff BOOLEAN NOT NULL DEFAULT FALSE,
///     user_type VARCHAR(64) NOT NULL DEFAULT 'basic',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Tier writes
///
/// `user_type` is only written by the entitlement ledger (see
/// [`crate::billing::ledger`]); the setter is crate-private so neither the
/// resource layer nor admin tooling can touch it.
///
/// # Example
///
/// ```no_run
/// use saasgate_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let user = User::create(
///     &pool,
///     CreateUser {
///         email: "user@example.com".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///         first_name: "Ada".to_string(),
///         last_name: "Lovelace".to_string(),
///         user_type: "basic".to_string(),
///     },
/// )
/// .await?;
///
/// assert!(!user.is_active);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, is_active, \
     is_disabled_by_admin, is_staff, user_type, created_at, updated_at, last_login_at";

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Email address, unique case-insensitively
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    /// False until the email address is verified
    pub is_active: bool,

    /// Set by staff; blocks login, verification and password reset
    pub is_disabled_by_admin: bool,

    /// Grants access to the admin API
    pub is_staff: bool,

    /// Current plan tier (mirrors the subscription)
    pub user_type: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Display name sent to the billing processor, `None` when both parts are blank
    pub fn full_name(&self) -> Option<String> {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,

    /// Argon2id password hash (never plaintext)
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    /// Initial plan tier, normally the catalog's default tier
    pub user_type: String,
}

/// Filters accepted by the admin user listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    /// Case-insensitive substring match on email
    pub email: Option<String>,

    /// Exact plan tier
    pub user_type: Option<String>,

    pub is_disabled_by_admin: Option<bool>,

    /// Exact subscription status (users without a subscription never match)
    pub subscription_status: Option<crate::models::subscription::SubscriptionStatus>,
}

/// User row joined with subscription and ownership data for the admin API
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserOverview {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
    pub is_active: bool,
    pub is_disabled_by_admin: bool,
    pub subscription_status: Option<crate::models::subscription::SubscriptionStatus>,
    pub subscription_plan: Option<String>,
    pub owned_app_count: i64,
}

impl User {
    /// Creates a new, inactive user
    ///
    /// # Errors
    ///
    /// Returns a database error carrying the `users_email_lower_key` constraint
    /// when the email is already registered.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, user_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.user_type)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by email, ignoring case
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");

        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Loads a user and locks its row until the surrounding transaction ends
    ///
    /// Used to serialize per-owner operations such as the app-limit check.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(user)
    }

    /// Marks the user active
    ///
    /// Returns `false` when the user was already active (or missing), in which
    /// case nothing is written.
    pub async fn activate(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_active = TRUE, updated_at = NOW()
            WHERE id = $1 AND is_active = FALSE
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the password hash
    pub async fn set_password_hash(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sets or clears the admin-disabled flag
    pub async fn set_disabled_by_admin(
        pool: &PgPool,
        id: Uuid,
        disabled: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users
            SET is_disabled_by_admin = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(disabled)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Writes the plan tier
    ///
    /// Only the entitlement ledger calls this. Returns `false` when the tier
    /// already had the requested value.
    pub(crate) async fn set_user_type(
        pool: &PgPool,
        id: Uuid,
        user_type: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET user_type = $2, updated_at = NOW()
            WHERE id = $1 AND user_type <> $2
            "#,
        )
        .bind(id)
        .bind(user_type)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a successful login
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users with their subscription state and owned-app count
    ///
    /// Every filter is optional; results are ordered newest first.
    pub async fn list_overview(
        pool: &PgPool,
        filter: &UserFilter,
    ) -> Result<Vec<UserOverview>, sqlx::Error> {
        let email_pattern = filter
            .email
            .as_ref()
            .map(|email| format!("%{}%", escape_like(email)));

        let rows = sqlx::query_as::<_, UserOverview>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name, u.user_type,
                   u.is_active, u.is_disabled_by_admin,
                   s.status AS subscription_status,
                   s.plan_id AS subscription_plan,
                   (SELECT COUNT(*) FROM apps a WHERE a.owner_id = u.id) AS owned_app_count
            FROM users u
            LEFT JOIN subscriptions s ON s.user_id = u.id
            WHERE ($1::TEXT IS NULL OR u.email ILIKE $1)
              AND ($2::TEXT IS NULL OR u.user_type = $2)
              AND ($3::BOOLEAN IS NULL OR u.is_disabled_by_admin = $3)
              AND ($4::subscription_status IS NULL OR s.status = $4)
            ORDER BY u.created_at DESC
            "#,
        )
        .bind(email_pattern)
        .bind(filter.user_type.as_deref())
        .bind(filter.is_disabled_by_admin)
        .bind(filter.subscription_status)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Loads the admin overview for a single user
    pub async fn find_overview(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<UserOverview>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserOverview>(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name, u.user_type,
                   u.is_active, u.is_disabled_by_admin,
                   s.status AS subscription_status,
                   s.plan_id AS subscription_plan,
                   (SELECT COUNT(*) FROM apps a WHERE a.owner_id = u.id) AS owned_app_count
            FROM users u
            LEFT JOIN subscriptions s ON s.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Deletes a user (cascades to subscription, apps and memberships)
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            is_active: false,
            is_disabled_by_admin: false,
            is_staff: false,
            user_type: "basic".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_full_name() {
        let mut user = sample_user();
        assert_eq!(user.full_name().as_deref(), Some("Ada Lovelace"));

        user.last_name.clear();
        assert_eq!(user.full_name().as_deref(), Some("Ada"));

        user.first_name.clear();
        assert_eq!(user.full_name(), None);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "ada@example.com");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_user_filter_default_is_empty() {
        let filter = UserFilter::default();
        assert!(filter.email.is_none());
        assert!(filter.user_type.is_none());
        assert!(filter.is_disabled_by_admin.is_none());
        assert!(filter.subscription_status.is_none());
    }
}
