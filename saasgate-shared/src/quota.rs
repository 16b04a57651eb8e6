/// Plan-limit enforcement for app creation
///
/// Each tier allows a fixed number of owned apps, taken from the
/// [`PlanCatalog`]. Creation locks the owner's user row, counts, compares and
/// inserts in one transaction, so two concurrent creations for the same owner
/// are serialized and cannot both pass a stale count.
///
/// # Example
///
/// ```no_run
/// use saasgate_shared::billing::PlanCatalog;
/// use saasgate_shared::models::app::CreateApp;
/// use saasgate_shared::quota::AppQuota;
/// use sqlx::PgPool;
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, owner_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let catalog = Arc::new(PlanCatalog::new("basic").with_plan("basic", None, 3));
/// let quota = AppQuota::new(pool, catalog);
///
/// let app = quota
///     .create_app(owner_id, CreateApp { name: "Dashboard".into(), description: String::new() })
///     .await?;
/// # Ok(())
/// # }
/// ```

use crate::billing::PlanCatalog;
use crate::models::app::{App, CreateApp};
use crate::models::app_user::{AppRole, AppUser};
use crate::models::user::User;
use sqlx::PgPool;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Quota enforcement error
#[derive(Debug)]
pub enum QuotaError {
    /// Owner already has as many apps as the tier allows
    AppLimitReached {
        tier: String,
        limit: i64,
        current: i64,
    },

    /// Owner does not exist
    OwnerNotFound(Uuid),

    /// Database error
    DatabaseError(sqlx::Error),
}

impl fmt::Display for QuotaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaError::AppLimitReached { tier, .. } => {
                write!(f, "App limit reached for plan {}.", tier)
            }
            QuotaError::OwnerNotFound(id) => write!(f, "User not found: {}", id),
            QuotaError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for QuotaError {}

impl From<sqlx::Error> for QuotaError {
    fn from(err: sqlx::Error) -> Self {
        QuotaError::DatabaseError(err)
    }
}

/// Result of a limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCheckResult {
    pub allowed: bool,
    pub current: i64,
    pub limit: i64,
    pub remaining: i64,
}

impl QuotaCheckResult {
    pub fn allowed(current: i64, limit: i64) -> Self {
        QuotaCheckResult {
            allowed: true,
            current,
            limit,
            remaining: (limit - current).max(0),
        }
    }

    pub fn exceeded(current: i64, limit: i64) -> Self {
        QuotaCheckResult {
            allowed: false,
            current,
            limit,
            remaining: 0,
        }
    }
}

/// Compares an owned-app count against the tier's limit
pub fn check_app_limit(owned: i64, tier: &str, catalog: &PlanCatalog) -> QuotaCheckResult {
    let limit = catalog.limit_for(tier);

    if owned >= limit {
        QuotaCheckResult::exceeded(owned, limit)
    } else {
        QuotaCheckResult::allowed(owned, limit)
    }
}

/// App creation gated by the owner's plan
#[derive(Clone)]
pub struct AppQuota {
    db: PgPool,
    catalog: Arc<PlanCatalog>,
}

impl AppQuota {
    pub fn new(db: PgPool, catalog: Arc<PlanCatalog>) -> Self {
        AppQuota { db, catalog }
    }

    /// Creates an app and its owner membership if the owner is under the limit
    ///
    /// # Errors
    ///
    /// - `AppLimitReached` when the owner is at or over the tier's limit
    /// - `DatabaseError` for storage failures, including a duplicate
    ///   `(owner, name)` pair (constraint `apps_owner_name_key`)
    pub async fn create_app(&self, owner_id: Uuid, data: CreateApp) -> Result<App, QuotaError> {
        let mut tx = self.db.begin().await?;

        let owner = User::find_for_update(&mut *tx, owner_id)
            .await?
            .ok_or(QuotaError::OwnerNotFound(owner_id))?;

        let owned = App::count_owned(&mut *tx, owner_id).await?;
        let check = check_app_limit(owned, &owner.user_type, &self.catalog);

        if !check.allowed {
            tracing::info!(
                user_id = %owner_id,
                tier = %owner.user_type,
                current = check.current,
                limit = check.limit,
                "App limit reached"
            );
            return Err(QuotaError::AppLimitReached {
                tier: owner.user_type,
                limit: check.limit,
                current: check.current,
            });
        }

        let app = App::create(&mut *tx, owner_id, data).await?;
        AppUser::create(&mut *tx, app.id, owner_id, AppRole::Owner).await?;
        tx.commit().await?;

        tracing::info!(user_id = %owner_id, app_id = %app.id, "App created");
        Ok(app)
    }
}
