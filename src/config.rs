use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("{key}={value:?} is not valid")]
    Invalid { key: &'static str, value: String },
    #[error("{pool} pool: {reason}")]
    Pool { pool: &'static str, reason: String },
}

/// Limits for one sqlx pool.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Writes are serialized through exactly one connection.
    pub fn writer(idle_timeout: Duration, acquire_timeout: Duration) -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            idle_timeout,
            acquire_timeout,
        }
    }

    pub fn reader(idle_timeout: Duration, acquire_timeout: Duration) -> Self {
        Self {
            max_connections: 120,
            min_connections: 20,
            idle_timeout,
            acquire_timeout,
        }
    }

    fn validate(&self, pool: &'static str) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Pool {
                pool,
                reason: "max_connections must be at least 1".into(),
            });
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Pool {
                pool,
                reason: format!(
                    "min_connections {} exceeds max_connections {}",
                    self.min_connections, self.max_connections
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub create_if_missing: bool,
    pub busy_timeout: Duration,
    pub read: PoolConfig,
    pub write: PoolConfig,
}

impl DatabaseConfig {
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(10_000);

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
            read: PoolConfig::reader(Self::DEFAULT_IDLE_TIMEOUT, Self::DEFAULT_ACQUIRE_TIMEOUT),
            write: PoolConfig::writer(Self::DEFAULT_IDLE_TIMEOUT, Self::DEFAULT_ACQUIRE_TIMEOUT),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.read.validate("read")?;
        self.write.validate("write")?;
        if self.write.max_connections != 1 {
            return Err(ConfigError::Pool {
                pool: "write",
                reason: "write pool must hold exactly one connection".into(),
            });
        }
        Ok(())
    }
}

/// argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct HasherConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 2,
            output_len: 32,
        }
    }
}

impl HasherConfig {
    /// Cheap parameters so tests don't spend seconds hashing.
    pub fn for_tests() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub hasher: HasherConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("DB_FILEPATH").ok_or(ConfigError::Missing("DB_FILEPATH"))?;

        let idle_timeout = Duration::from_secs(parse_or(&lookup, "DB_IDLE_TIMEOUT_SECS", 300)?);
        let acquire_timeout =
            Duration::from_secs(parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 30)?);

        let mut database = DatabaseConfig::new(path);
        database.busy_timeout = Duration::from_millis(parse_or(&lookup, "DB_BUSY_TIMEOUT_MS", 10_000)?);
        database.read = PoolConfig {
            max_connections: parse_or(&lookup, "DB_READ_MAX_CONNECTIONS", 120)?,
            min_connections: parse_or(&lookup, "DB_READ_MIN_CONNECTIONS", 20)?,
            idle_timeout,
            acquire_timeout,
        };
        database.write = PoolConfig::writer(idle_timeout, acquire_timeout);
        database.validate()?;

        let defaults = HasherConfig::default();
        let hasher = HasherConfig {
            memory_kib: parse_or(&lookup, "ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_or(&lookup, "ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parse_or(&lookup, "ARGON2_PARALLELISM", defaults.parallelism)?,
            output_len: defaults.output_len,
        };

        let port = match lookup("APP_PORT").or_else(|| lookup("PORT")) {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                key: "APP_PORT",
                value: v,
            })?,
            None => 8080,
        };

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            database,
            hasher,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "APP_HOST",
            value: raw,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn requires_db_filepath() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DB_FILEPATH")));
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("DB_FILEPATH", "/tmp/monolith.db")]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.database.read.max_connections, 120);
        assert_eq!(cfg.database.read.min_connections, 20);
        assert_eq!(cfg.database.write.max_connections, 1);
        assert_eq!(cfg.database.write.min_connections, 1);
        assert_eq!(cfg.database.read.idle_timeout, Duration::from_secs(300));
        assert_eq!(cfg.database.busy_timeout, Duration::from_millis(10_000));
        assert_eq!(cfg.hasher.memory_kib, 65536);
        assert_eq!(cfg.hasher.iterations, 1);
        assert_eq!(cfg.hasher.parallelism, 2);
        assert_eq!(cfg.addr().unwrap().port(), 8080);
    }

    #[test]
    fn port_falls_back_to_port_var() {
        let cfg = load(&[("DB_FILEPATH", "x.db"), ("PORT", "9000")]).unwrap();
        assert_eq!(cfg.port, 9000);
        let cfg = load(&[("DB_FILEPATH", "x.db"), ("PORT", "9000"), ("APP_PORT", "9100")]).unwrap();
        assert_eq!(cfg.port, 9100);
    }

    #[test]
    fn rejects_bad_numbers_and_pool_limits() {
        let err = load(&[("DB_FILEPATH", "x.db"), ("ARGON2_ITERATIONS", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ARGON2_ITERATIONS", .. }));

        let err = load(&[("DB_FILEPATH", "x.db"), ("DB_READ_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Pool { pool: "read", .. }));

        let err = load(&[
            ("DB_FILEPATH", "x.db"),
            ("DB_READ_MAX_CONNECTIONS", "4"),
            ("DB_READ_MIN_CONNECTIONS", "5"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Pool { pool: "read", .. }));
    }

    #[test]
    fn write_pool_is_pinned_to_one_connection() {
        let mut db = DatabaseConfig::new("x.db");
        db.write.max_connections = 4;
        assert!(matches!(db.validate(), Err(ConfigError::Pool { pool: "write", .. })));
    }
}
