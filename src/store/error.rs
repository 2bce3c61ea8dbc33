use sqlx::error::ErrorKind as SqlxErrorKind;
use thiserror::Error;

use crate::error::ErrorKind;

/// Which uniqueness constraint an insert tripped over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Email,
    UserId,
    Other(String),
}

impl Constraint {
    // SQLite reports e.g. "UNIQUE constraint failed: users.email".
    fn from_message(message: &str) -> Self {
        let columns = message.rsplit(':').next().unwrap_or_default().trim();
        match columns {
            "users.email" => Constraint::Email,
            "users.user_id" => Constraint::UserId,
            other => Constraint::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Email => f.write_str("email"),
            Constraint::UserId => f.write_str("user_id"),
            Constraint::Other(columns) => f.write_str(columns),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,
    #[error("[sqlite3:users] unique constraint violated on {constraint}")]
    Conflict { constraint: Constraint },
    #[error("[sqlite3] database busy query={query:?}: {source}")]
    Busy {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("[sqlite3] corrupt {column} value: {reason}")]
    Corrupt { column: &'static str, reason: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("[sqlite3] query failed query={query:?}: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("[sqlite3] tx rollback failed: {cause}: {rollback}")]
    Rollback {
        cause: Box<StoreError>,
        #[source]
        rollback: sqlx::Error,
    },
    #[error("[sqlite3] failed to open database: {source}")]
    Open {
        #[source]
        source: sqlx::Error,
    },
    #[error("[sqlite3] migration failed: {source}")]
    Migrate {
        #[source]
        source: sqlx::migrate::MigrateError,
    },
}

impl StoreError {
    /// Classifies a driver error raised while running `query`. The query text
    /// is kept for diagnosis; bound values never are.
    pub(crate) fn from_sqlx(query: &'static str, source: sqlx::Error) -> Self {
        match &source {
            sqlx::Error::PoolTimedOut => return StoreError::Busy { query, source },
            sqlx::Error::Database(db) => {
                if db.kind() == SqlxErrorKind::UniqueViolation {
                    return StoreError::Conflict {
                        constraint: Constraint::from_message(db.message()),
                    };
                }
                if db.code().as_deref().is_some_and(is_busy_code) {
                    return StoreError::Busy { query, source };
                }
            }
            _ => {}
        }
        StoreError::Query { query, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::UserNotFound => ErrorKind::NotFound,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::Busy { .. } => ErrorKind::Transient,
            StoreError::Corrupt { .. } => ErrorKind::CorruptData,
            StoreError::Cancelled => ErrorKind::Cancelled,
            StoreError::Query { .. }
            | StoreError::Rollback { .. }
            | StoreError::Open { .. }
            | StoreError::Migrate { .. } => ErrorKind::Internal,
        }
    }
}

// Extended result codes keep the primary code in the low byte:
// SQLITE_BUSY = 5, SQLITE_LOCKED = 6.
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_is_read_from_sqlite_message() {
        assert_eq!(
            Constraint::from_message("UNIQUE constraint failed: users.email"),
            Constraint::Email
        );
        assert_eq!(
            Constraint::from_message("UNIQUE constraint failed: users.user_id"),
            Constraint::UserId
        );
        assert_eq!(
            Constraint::from_message("UNIQUE constraint failed: users.a, users.b"),
            Constraint::Other("users.a, users.b".into())
        );
    }

    #[test]
    fn busy_codes_include_extended_variants() {
        for code in ["5", "6", "261", "517", "773", "262"] {
            assert!(is_busy_code(code), "{code}");
        }
        for code in ["1", "19", "2067", "nope"] {
            assert!(!is_busy_code(code), "{code}");
        }
    }

    #[test]
    fn pool_timeout_is_transient() {
        let err = StoreError::from_sqlx("select 1", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn rollback_failure_keeps_the_original_cause() {
        let err = StoreError::Rollback {
            cause: Box::new(StoreError::Conflict {
                constraint: Constraint::Email,
            }),
            rollback: sqlx::Error::PoolClosed,
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        let msg = err.to_string();
        assert!(msg.contains("rollback failed"));
        assert!(msg.contains("email"));
    }
}
