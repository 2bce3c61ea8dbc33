use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{pool::PoolConnection, FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{cancellable, datetime, AddUser, Repository, StoreError, User};
use crate::db::Pools;

const BEGIN: &str = "BEGIN";
const COMMIT: &str = "COMMIT";

// Parameters are numbered; the comment on each bind names the column it fills.
const INSERT_USER: &str = r#"
insert into users
  (user_id, email, password_hash, created_at)
values
  (?1, ?2, ?3, ?4)
returning
  user_id, email, password_hash, created_at
"#;

const GET_USER: &str = r#"
select
  user_id, email, password_hash, created_at
from users
where user_id = ?1
"#;

const GET_USER_BY_EMAIL: &str = r#"
select
  user_id, email, password_hash, created_at
from users
where email = ?1
"#;

#[derive(FromRow)]
struct UserRow {
    user_id: String,
    email: String,
    password_hash: String,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let created_at = datetime::decode(&row.created_at).map_err(|e| StoreError::Corrupt {
            column: "created_at",
            reason: e.to_string(),
        })?;
        Ok(User {
            user_id: row.user_id,
            email: row.email,
            password_hash: row.password_hash,
            created_at,
        })
    }
}

async fn insert_user_on(conn: &mut SqliteConnection, params: AddUser) -> Result<User, StoreError> {
    let created_at = datetime::encode(datetime::now_micros());
    let row = sqlx::query_as::<_, UserRow>(INSERT_USER)
        .bind(params.user_id) // ?1 user_id
        .bind(params.email) // ?2 email
        .bind(params.password_hash) // ?3 password_hash
        .bind(created_at) // ?4 created_at
        .fetch_one(conn)
        .await
        .map_err(|e| StoreError::from_sqlx(INSERT_USER, e))?;
    let user = User::try_from(row)?;
    debug!(user_id = %user.user_id, "user row inserted");
    Ok(user)
}

async fn get_user_on(
    conn: &mut SqliteConnection,
    query: &'static str,
    key: String,
) -> Result<User, StoreError> {
    sqlx::query_as::<_, UserRow>(query)
        .bind(key) // ?1 user_id or email
        .fetch_optional(conn)
        .await
        .map_err(|e| StoreError::from_sqlx(query, e))?
        .ok_or(StoreError::UserNotFound)?
        .try_into()
}

/// Pool-backed repository. Standalone reads use the read pool, standalone
/// writes and every transaction use the single-connection write pool.
#[derive(Clone)]
pub struct SqliteStore {
    pools: Pools,
}

impl SqliteStore {
    pub fn new(pools: Pools) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// Runs `f` inside one write transaction. Reads and writes made through
    /// the `TxQueries` handle all see the transaction's own changes.
    ///
    /// Commits when `f` succeeds. Otherwise rolls back and returns `f`'s
    /// error, or `StoreError::Rollback` carrying both errors when the rollback
    /// fails as well. If `ctx` is cancelled before the commit nothing is
    /// persisted and the result is `StoreError::Cancelled`. Once COMMIT has
    /// been issued the token is no longer consulted, so the result always
    /// matches what landed on disk.
    pub async fn exec_tx<T, F>(&self, ctx: &CancellationToken, f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'q> FnOnce(&'q TxQueries) -> BoxFuture<'q, Result<T, StoreError>> + Send,
    {
        let tx = cancellable(ctx, async {
            self.pools
                .write()
                .begin()
                .await
                .map_err(|e| StoreError::from_sqlx(BEGIN, e))
        })
        .await?;

        let queries = TxQueries { tx: Mutex::new(tx) };
        let outcome = cancellable(ctx, f(&queries)).await;
        let tx = queries.tx.into_inner();

        match outcome {
            Ok(value) if !ctx.is_cancelled() => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::from_sqlx(COMMIT, e))?;
                Ok(value)
            }
            Ok(_) => Err(rollback(tx, StoreError::Cancelled).await),
            Err(cause) => {
                warn!(error = %cause, "transaction failed; rolling back");
                Err(rollback(tx, cause).await)
            }
        }
    }
}

// The connection goes back to its pool when the guard drops, on every path.
async fn acquire(
    pool: &SqlitePool,
    query: &'static str,
) -> Result<PoolConnection<Sqlite>, StoreError> {
    pool.acquire()
        .await
        .map_err(|e| StoreError::from_sqlx(query, e))
}

async fn rollback(tx: Transaction<'static, Sqlite>, cause: StoreError) -> StoreError {
    match tx.rollback().await {
        Ok(()) => cause,
        Err(rollback) => StoreError::Rollback {
            cause: Box::new(cause),
            rollback,
        },
    }
}

#[async_trait]
impl Repository for SqliteStore {
    async fn insert_user(
        &self,
        ctx: &CancellationToken,
        params: AddUser,
    ) -> Result<User, StoreError> {
        cancellable(ctx, async {
            let mut conn = acquire(self.pools.write(), INSERT_USER).await?;
            insert_user_on(&mut conn, params).await
        })
        .await
    }

    async fn get_user(&self, ctx: &CancellationToken, user_id: &str) -> Result<User, StoreError> {
        cancellable(ctx, async {
            let mut conn = acquire(self.pools.read(), GET_USER).await?;
            get_user_on(&mut conn, GET_USER, user_id.to_owned()).await
        })
        .await
    }

    async fn get_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<User, StoreError> {
        cancellable(ctx, async {
            let mut conn = acquire(self.pools.read(), GET_USER_BY_EMAIL).await?;
            get_user_on(&mut conn, GET_USER_BY_EMAIL, email.to_owned()).await
        })
        .await
    }
}

/// Repository view pinned to one open transaction.
pub struct TxQueries {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl Repository for TxQueries {
    async fn insert_user(
        &self,
        ctx: &CancellationToken,
        params: AddUser,
    ) -> Result<User, StoreError> {
        cancellable(ctx, async {
            let mut tx = self.tx.lock().await;
            insert_user_on(&mut **tx, params).await
        })
        .await
    }

    async fn get_user(&self, ctx: &CancellationToken, user_id: &str) -> Result<User, StoreError> {
        cancellable(ctx, async {
            let mut tx = self.tx.lock().await;
            get_user_on(&mut **tx, GET_USER, user_id.to_owned()).await
        })
        .await
    }

    async fn get_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<User, StoreError> {
        cancellable(ctx, async {
            let mut tx = self.tx.lock().await;
            get_user_on(&mut **tx, GET_USER_BY_EMAIL, email.to_owned()).await
        })
        .await
    }
}
