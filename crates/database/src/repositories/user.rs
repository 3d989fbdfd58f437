use super::utils::map_db_error;
use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::auth::{PersistedToken, PersistedUser, UpsertOutcome, UserRepository};
use services::common::RepositoryError;
use tokio_postgres::Row;
use tracing::debug;

/// Users and their bearer tokens, keyed by provider subject id
pub struct PgUserRepository {
    pool: DbPool,
}

impl PgUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_token(row: &Row) -> Result<PersistedToken> {
        Ok(PersistedToken {
            token_id: row.try_get("token_id").context("Failed to read token_id")?,
            created_at: row
                .try_get::<_, DateTime<Utc>>("created_at")
                .context("Failed to read token created_at")?,
        })
    }

    fn row_to_user(row: &Row, tokens: Vec<PersistedToken>) -> Result<PersistedUser> {
        Ok(PersistedUser {
            id: row.try_get("id").context("Failed to read user id")?,
            name: row.try_get("name").context("Failed to read user name")?,
            tokens,
            created_at: row
                .try_get::<_, DateTime<Utc>>("created_at")
                .context("Failed to read user created_at")?,
        })
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<PersistedUser>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let Some(user_row) = client
            .query_opt(
                "SELECT id, name, created_at FROM users WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(map_db_error)?
        else {
            return Ok(None);
        };

        let token_rows = client
            .query(
                "SELECT token_id, created_at FROM user_tokens WHERE user_id = $1 ORDER BY seq",
                &[&id],
            )
            .await
            .map_err(map_db_error)?;

        let tokens = token_rows
            .iter()
            .map(Self::row_to_token)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self::row_to_user(&user_row, tokens)?))
    }

    async fn create(&self, id: &str, name: &str, token_id: &str) -> Result<PersistedUser> {
        let mut client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let transaction = client.transaction().await.map_err(map_db_error)?;

        let user_row = transaction
            .query_one(
                "INSERT INTO users (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
                &[&id, &name],
            )
            .await
            .map_err(map_db_error)?;

        let token_row = transaction
            .query_one(
                r#"
                INSERT INTO user_tokens (token_id, user_id)
                VALUES ($1, $2)
                RETURNING token_id, created_at
                "#,
                &[&token_id, &id],
            )
            .await
            .map_err(map_db_error)?;

        transaction.commit().await.map_err(map_db_error)?;

        debug!(sub = %id, "Created user");
        Self::row_to_user(&user_row, vec![Self::row_to_token(&token_row)?])
    }

    async fn append_token(&self, id: &str, token_id: &str) -> Result<bool> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let inserted = client
            .execute(
                r#"
                INSERT INTO user_tokens (token_id, user_id)
                SELECT $1, id FROM users WHERE id = $2
                "#,
                &[&token_id, &id],
            )
            .await
            .map_err(map_db_error)?;

        Ok(inserted == 1)
    }

    async fn upsert_with_token(&self, id: &str, name: &str, token_id: &str) -> Result<UpsertOutcome> {
        let mut client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")
            .map_err(RepositoryError::PoolError)?;

        let transaction = client.transaction().await.map_err(map_db_error)?;

        // A concurrent insert of the same id blocks on the primary key until the
        // other transaction commits, then turns into a no-op here
        let created = transaction
            .execute(
                "INSERT INTO users (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
                &[&id, &name],
            )
            .await
            .map_err(map_db_error)?;

        transaction
            .execute(
                "INSERT INTO user_tokens (token_id, user_id) VALUES ($1, $2)",
                &[&token_id, &id],
            )
            .await
            .map_err(map_db_error)?;

        transaction.commit().await.map_err(map_db_error)?;

        if created == 1 {
            debug!(sub = %id, "Created user with first token");
            Ok(UpsertOutcome::Created)
        } else {
            debug!(sub = %id, "Appended token to user");
            Ok(UpsertOutcome::Appended)
        }
    }
}
