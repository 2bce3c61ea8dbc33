use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{datetime, AddUser, Constraint, Repository, StoreError, User};

/// In-process repository with the same uniqueness and timestamp rules as the
/// SQLite store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    email_index: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check(ctx: &CancellationToken) -> Result<(), StoreError> {
    if ctx.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl Repository for MemoryStore {
    async fn insert_user(
        &self,
        ctx: &CancellationToken,
        params: AddUser,
    ) -> Result<User, StoreError> {
        check(ctx)?;
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&params.user_id) {
            return Err(StoreError::Conflict {
                constraint: Constraint::UserId,
            });
        }
        if tables.email_index.contains_key(&params.email) {
            return Err(StoreError::Conflict {
                constraint: Constraint::Email,
            });
        }

        let user = User {
            user_id: params.user_id,
            email: params.email,
            password_hash: params.password_hash,
            created_at: datetime::now_micros(),
        };
        tables
            .email_index
            .insert(user.email.clone(), user.user_id.clone());
        tables.users.insert(user.user_id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, ctx: &CancellationToken, user_id: &str) -> Result<User, StoreError> {
        check(ctx)?;
        let tables = self.tables.read().await;
        tables
            .users
            .get(user_id)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn get_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<User, StoreError> {
        check(ctx)?;
        let tables = self.tables.read().await;
        tables
            .email_index
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }
}
