use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{dto::PublicUser, errors::ServiceError, ids, password::Argon2Hasher};
use crate::store::{AddUser, Repository, StoreError};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Account creation, lookup and credential checks on top of a [`Repository`].
///
/// Holds no per-request state; share it behind an `Arc`.
#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn Repository>,
    hasher: Arc<Argon2Hasher>,
}

impl AuthService {
    pub fn new(repo: Arc<dyn Repository>, hasher: Argon2Hasher) -> Self {
        Self {
            repo,
            hasher: Arc::new(hasher),
        }
    }

    /// Runs an argon2 call on the blocking pool. It can't be interrupted once
    /// started, so cancellation is only checked beforehand.
    async fn with_hasher<R, F>(&self, ctx: &CancellationToken, f: F) -> Result<R, ServiceError>
    where
        F: FnOnce(&Argon2Hasher) -> R + Send + 'static,
        R: Send + 'static,
    {
        if ctx.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let hasher = Arc::clone(&self.hasher);
        Ok(tokio::task::spawn_blocking(move || f(hasher.as_ref())).await?)
    }

    #[instrument(skip(self, ctx, password))]
    pub async fn create_user(
        &self,
        ctx: &CancellationToken,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ServiceError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::PasswordTooShort);
        }

        let plain = password.to_owned();
        let password_hash = self.with_hasher(ctx, move |h| h.hash(&plain)).await??;
        let user_id = ids::new_user_id()?;

        let row = self
            .repo
            .insert_user(
                ctx,
                AddUser {
                    user_id,
                    email: email.to_owned(),
                    password_hash,
                },
            )
            .await
            .map_err(ServiceError::storage("insert_user"))?;

        info!(user_id = %row.user_id, email = %row.email, "user created");
        Ok(row.into())
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_user(
        &self,
        ctx: &CancellationToken,
        user_id: &str,
    ) -> Result<PublicUser, ServiceError> {
        match self.repo.get_user(ctx, user_id).await {
            Ok(row) => Ok(row.into()),
            Err(StoreError::UserNotFound) => Err(ServiceError::UserNotFound),
            Err(e) => Err(ServiceError::storage("get_user")(e)),
        }
    }

    /// Returns the user when `email` exists and `password` matches.
    ///
    /// An unknown email is `UserNotFound`, a known email with the wrong
    /// password is `WrongPassword`. Both paths run one full argon2
    /// verification so their latency is the same; callers facing untrusted
    /// clients should report both as the same failure.
    #[instrument(skip(self, ctx, password))]
    pub async fn verify_user_password(
        &self,
        ctx: &CancellationToken,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ServiceError> {
        let plain = password.to_owned();
        let row = match self.repo.get_user_by_email(ctx, email).await {
            Ok(row) => row,
            Err(StoreError::UserNotFound) => {
                // the dummy match result is meaningless, its errors are not
                let _matched = self.with_hasher(ctx, move |h| h.verify_dummy(&plain)).await?;
                debug!("no user for email");
                return Err(ServiceError::UserNotFound);
            }
            Err(e) => return Err(ServiceError::storage("get_user_by_email")(e)),
        };

        let stored = row.password_hash.clone();
        let matched = self
            .with_hasher(ctx, move |h| h.verify(&plain, &stored))
            .await?
            .map_err(|e| {
                warn!(user_id = %row.user_id, error = %e, "stored password hash unreadable");
                e
            })?;

        if !matched {
            debug!(user_id = %row.user_id, "password mismatch");
            return Err(ServiceError::WrongPassword);
        }
        Ok(row.into())
    }
}
