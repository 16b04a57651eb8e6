/// Schema migrations
///
/// Migrations live in `migrations/` at the workspace root as reversible
/// `{version}_{name}.up.sql` / `.down.sql` pairs and are embedded at compile
/// time.
///
/// # Example
///
/// ```no_run
/// use saasgate_shared::db::migrations::run_migrations;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// run_migrations(&pool).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::{migrate::Migrator, postgres::PgPool};
use tracing::{info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// Migration status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Number of migrations recorded as applied
    pub applied_migrations: usize,

    /// Number of migrations embedded in the binary
    pub known_migrations: usize,

    /// Latest applied version
    pub latest_version: Option<i64>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.applied_migrations >= self.known_migrations
    }
}

/// Applies all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!(known = MIGRATOR.iter().count(), "Running database migrations");

    MIGRATOR.run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        e
    })?;

    info!("Database migrations complete");
    Ok(())
}

/// Reports how many migrations are applied
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let known_migrations = MIGRATOR.iter().filter(|m| !m.migration_type.is_down_migration()).count();

    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(MigrationStatus {
            applied_migrations: 0,
            known_migrations,
            latest_version: None,
        });
    }

    let (count, latest_version): (i64, Option<i64>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = true",
    )
    .fetch_one(pool)
    .await?;

    Ok(MigrationStatus {
        applied_migrations: count as usize,
        known_migrations,
        latest_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_present() {
        assert!(MIGRATOR.iter().count() >= 4);
    }

    #[test]
    fn test_up_to_date() {
        let status = MigrationStatus {
            applied_migrations: 4,
            known_migrations: 4,
            latest_version: Some(4),
        };
        assert!(status.is_up_to_date());

        let status = MigrationStatus {
            applied_migrations: 2,
            ..status
        };
        assert!(!status.is_up_to_date());
    }
}
