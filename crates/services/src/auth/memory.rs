use super::ports::{PersistedToken, PersistedUser, UpsertOutcome, UserRepository};
use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Process-local user store. A single lock covers every read-modify-write,
/// so concurrent upserts for one id can never both take the create branch.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, PersistedUser>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.lock().await.len()
    }
}

fn token(token_id: &str) -> PersistedToken {
    PersistedToken {
        token_id: token_id.to_string(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<PersistedUser>> {
        Ok(self.users.lock().await.get(id).cloned())
    }

    async fn create(&self, id: &str, name: &str, token_id: &str) -> anyhow::Result<PersistedUser> {
        let mut users = self.users.lock().await;
        if users.contains_key(id) {
            bail!("user {id} already exists");
        }

        let user = PersistedUser {
            id: id.to_string(),
            name: name.to_string(),
            tokens: vec![token(token_id)],
            created_at: Utc::now(),
        };
        users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    async fn append_token(&self, id: &str, token_id: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().await;
        match users.get_mut(id) {
            Some(user) => {
                user.tokens.push(token(token_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_with_token(
        &self,
        id: &str,
        name: &str,
        token_id: &str,
    ) -> anyhow::Result<UpsertOutcome> {
        let mut users = self.users.lock().await;
        match users.get_mut(id) {
            Some(user) => {
                user.tokens.push(token(token_id));
                Ok(UpsertOutcome::Appended)
            }
            None => {
                users.insert(
                    id.to_string(),
                    PersistedUser {
                        id: id.to_string(),
                        name: name.to_string(),
                        tokens: vec![token(token_id)],
                        created_at: Utc::now(),
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }
}
