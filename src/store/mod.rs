//! User persistence.
//!
//! [`Repository`] is the only contract the auth service depends on.
//! [`SqliteStore`] backs it with the read/write pools from [`crate::db`];
//! [`MemoryStore`] is a map-backed stand-in for tests.

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub mod datetime;
mod error;
mod memory;
mod sqlite;
mod types;

pub use error::{Constraint, StoreError};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, TxQueries};
pub use types::{AddUser, User};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Inserts a user and returns the stored row, `created_at` included.
    /// A duplicate email or id is `StoreError::Conflict`.
    async fn insert_user(&self, ctx: &CancellationToken, params: AddUser)
        -> Result<User, StoreError>;

    /// `StoreError::UserNotFound` when no row has this id.
    async fn get_user(&self, ctx: &CancellationToken, user_id: &str) -> Result<User, StoreError>;

    /// `StoreError::UserNotFound` when no row has this email.
    async fn get_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<User, StoreError>;
}

/// Runs `fut` unless `ctx` is cancelled first; a cancelled call drops the
/// in-flight future and reports `StoreError::Cancelled`.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StoreError::Cancelled),
        res = fut => res,
    }
}
