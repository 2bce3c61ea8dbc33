use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Connection, SqliteConnection, SqlitePool,
};
use tracing::info;

use crate::config::{DatabaseConfig, PoolConfig};
use crate::store::StoreError;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const SQLITE_VERSION: &str = "select sqlite_version()";
const COMPILE_OPTIONS: &str = "PRAGMA compile_options";

/// Version and build flags of the SQLite library linked into the binary.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub sqlite_version: String,
    pub compile_options: Vec<String>,
}

/// Asks a throwaway in-memory database which SQLite this binary carries.
pub async fn engine_info() -> Result<EngineInfo, StoreError> {
    let mut conn = SqliteConnection::connect("sqlite::memory:")
        .await
        .map_err(|source| StoreError::Open { source })?;
    let sqlite_version = sqlx::query_scalar::<_, String>(SQLITE_VERSION)
        .fetch_one(&mut conn)
        .await
        .map_err(|e| StoreError::from_sqlx(SQLITE_VERSION, e))?;
    let compile_options = sqlx::query_scalar::<_, String>(COMPILE_OPTIONS)
        .fetch_all(&mut conn)
        .await
        .map_err(|e| StoreError::from_sqlx(COMPILE_OPTIONS, e))?;
    Ok(EngineInfo {
        sqlite_version,
        compile_options,
    })
}

/// Two pools over one SQLite file: a single-connection writer and a wide
/// reader. WAL lets readers run while the writer holds a transaction.
#[derive(Clone)]
pub struct Pools {
    read: SqlitePool,
    write: SqlitePool,
}

impl Pools {
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = connect_options(config);

        // Writer first: it creates the file and switches it to WAL.
        let write = pool_options(&config.write)
            .connect_with(options.clone())
            .await
            .map_err(|source| StoreError::Open { source })?;
        let read = pool_options(&config.read)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Open { source })?;

        info!(
            path = %config.path.display(),
            read_max = config.read.max_connections,
            read_min = config.read.min_connections,
            "database pools opened"
        );
        Ok(Self { read, write })
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read
    }

    pub fn write(&self) -> &SqlitePool {
        &self.write
    }

    /// Applies the embedded `users` schema through the writer.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&self.write)
            .await
            .map_err(|source| StoreError::Migrate { source })?;
        info!("database migrations applied");
        Ok(())
    }

    /// Runs every down migration that has been applied, newest first.
    pub async fn revert(&self) -> Result<(), StoreError> {
        MIGRATOR
            .undo(&self.write, 0)
            .await
            .map_err(|source| StoreError::Migrate { source })?;
        info!("database migrations reverted");
        Ok(())
    }

    pub async fn close(&self) {
        self.write.close().await;
        self.read.close().await;
        info!("database pools closed");
    }
}

fn connect_options(config: &DatabaseConfig) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(config.create_if_missing)
        .busy_timeout(config.busy_timeout)
        .journal_mode(SqliteJournalMode::Wal)
        .pragma("journal_size_limit", "200000000")
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .pragma("temp_store", "MEMORY")
        .pragma("cache_size", "-16000")
}

fn pool_options(pool: &PoolConfig) -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(pool.max_connections)
        .min_connections(pool.min_connections)
        .idle_timeout(pool.idle_timeout)
        .acquire_timeout(pool.acquire_timeout)
}
