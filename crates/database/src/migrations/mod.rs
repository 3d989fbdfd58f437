use crate::pool::DbPool;
use anyhow::{Context, Result};
use refinery::load_sql_migrations;
use std::path::PathBuf;
use tracing::info;

const MIGRATIONS_DIR: &str = "crates/database/src/migrations/sql";

/// Locate the SQL migrations relative to the working directory, falling back
/// to this crate's source tree when run from elsewhere (tests, `cargo run -p`)
fn migrations_path() -> Result<PathBuf> {
    let from_cwd = std::env::current_dir()
        .context("Failed to get current directory")?
        .join(MIGRATIONS_DIR);

    if from_cwd.is_dir() {
        return Ok(from_cwd);
    }

    Ok(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/migrations/sql"))
}

/// Run database migrations
pub async fn run(pool: &DbPool) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .context("Failed to get database connection for migrations")?;

    let path = migrations_path()?;
    let migrations =
        load_sql_migrations(&path).context(format!("Failed to load migrations from {path:?}"))?;

    let migration_report = refinery::Runner::new(&migrations)
        .run_async(&mut **client)
        .await
        .context("Failed to run migrations")?;

    for migration in migration_report.applied_migrations() {
        info!(migration = %migration.name(), "Applied migration");
    }

    info!("All migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_loadable() {
        let path = migrations_path().unwrap();
        let migrations = load_sql_migrations(&path).unwrap();

        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name(), "oauth_users");
        assert_eq!(migrations[0].version(), 1);
    }
}
