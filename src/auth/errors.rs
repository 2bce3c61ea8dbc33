use thiserror::Error;

use super::{ids::IdError, password::HashError};
use crate::error::ErrorKind;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("password too short")]
    PasswordTooShort,
    #[error("user not found")]
    UserNotFound,
    #[error("wrong password")]
    WrongPassword,
    #[error("[service] {0}")]
    Hash(#[from] HashError),
    #[error("[service] failed to generate user id: {0}")]
    Id(#[from] IdError),
    #[error("[service] blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("[service] {op} failed: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("operation cancelled")]
    Cancelled,
}

impl ServiceError {
    pub(crate) fn storage(op: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ServiceError::Storage { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::PasswordTooShort => ErrorKind::Validation,
            ServiceError::UserNotFound => ErrorKind::NotFound,
            ServiceError::WrongPassword => ErrorKind::WrongPassword,
            ServiceError::Hash(HashError::Malformed(_)) => ErrorKind::CorruptData,
            ServiceError::Hash(_) | ServiceError::Id(_) | ServiceError::Task(_) => {
                ErrorKind::Internal
            }
            ServiceError::Storage { source, .. } => source.kind(),
            ServiceError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
