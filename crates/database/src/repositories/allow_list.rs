use super::utils::map_db_error;
use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use services::auth::AllowListValidator;
use services::common::RepositoryError;
use tracing::info;

/// Allow-list stored in the `allowed_emails` table; lookups ignore case
pub struct PgAllowListRepository {
    pool: DbPool,
}

impl PgAllowListRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Add an email; `false` if it was already listed
    pub async fn add(&self, email: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let inserted = client
            .execute(
                "INSERT INTO allowed_emails (email) VALUES ($1) ON CONFLICT DO NOTHING",
                &[&email.trim()],
            )
            .await
            .map_err(map_db_error)?;

        if inserted == 1 {
            info!(email = %email, "Email added to allow list");
        }
        Ok(inserted == 1)
    }

    /// Remove an email; `false` if it was not listed
    pub async fn remove(&self, email: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let deleted = client
            .execute(
                "DELETE FROM allowed_emails WHERE lower(email) = lower($1)",
                &[&email.trim()],
            )
            .await
            .map_err(map_db_error)?;

        if deleted > 0 {
            info!(email = %email, "Email removed from allow list");
        }
        Ok(deleted > 0)
    }
}

#[async_trait]
impl AllowListValidator for PgAllowListRepository {
    async fn is_allowed(&self, email: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM allowed_emails WHERE lower(email) = lower($1))",
                &[&email],
            )
            .await
            .map_err(map_db_error)?;

        row.try_get::<_, bool>(0)
            .context("Failed to read allow list lookup")
    }
}
