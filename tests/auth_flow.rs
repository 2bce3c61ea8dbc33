use std::sync::Arc;

use futures::FutureExt;
use monolith::{
    auth::{password::Argon2Hasher, AuthService, ServiceError},
    config::{DatabaseConfig, HasherConfig},
    db::Pools,
    error::ErrorKind,
    store::{AddUser, Repository, SqliteStore, StoreError},
};
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

async fn sqlite_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let mut config = DatabaseConfig::new(dir.path().join("auth_flow.db"));
    config.read.min_connections = 1;
    config.read.max_connections = 4;
    let pools = Pools::open(&config).await.unwrap();
    pools.migrate().await.unwrap();
    (dir, SqliteStore::new(pools))
}

fn service(store: SqliteStore) -> AuthService {
    let hasher = Argon2Hasher::new(&HasherConfig::for_tests()).unwrap();
    AuthService::new(Arc::new(store), hasher)
}

#[tokio::test]
async fn sign_up_sign_in_lookup_against_sqlite() {
    let (_dir, store) = sqlite_store().await;
    let svc = service(store);
    let ctx = CancellationToken::new();

    let before = OffsetDateTime::now_utc();
    let user = svc
        .create_user(&ctx, "a@example.com", "testtest1")
        .await
        .expect("create user");
    assert!(!user.user_id.is_empty());
    assert_eq!(user.email, "a@example.com");
    assert!((user.created_at - before).abs() < time::Duration::seconds(5));

    let signed_in = svc
        .verify_user_password(&ctx, "a@example.com", "testtest1")
        .await
        .expect("sign in");
    assert_eq!(signed_in.user_id, user.user_id);

    let err = svc
        .verify_user_password(&ctx, "a@example.com", "wrongpass")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::WrongPassword));

    let fetched = svc.get_user(&ctx, &user.user_id).await.expect("get user");
    assert_eq!(fetched, user);

    let err = svc
        .create_user(&ctx, "a@example.com", "testtest2")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let other = svc
        .create_user(&ctx, "b@example.com", "testtest2")
        .await
        .expect("second user");
    assert_ne!(other.user_id, user.user_id);
}

#[tokio::test]
async fn stored_hash_is_argon2id_not_plaintext() {
    let (_dir, store) = sqlite_store().await;
    let svc = service(store.clone());
    let ctx = CancellationToken::new();
    let user = svc
        .create_user(&ctx, "a@example.com", "testtest1")
        .await
        .unwrap();

    let row = store.get_user(&ctx, &user.user_id).await.unwrap();
    assert!(row.password_hash.starts_with("$argon2id$"));
    assert!(!row.password_hash.contains("testtest1"));
    assert_eq!(row.created_at, user.created_at);
}

#[tokio::test]
async fn cancelled_transaction_is_not_visible() {
    let (_dir, store) = sqlite_store().await;
    let ctx = CancellationToken::new();

    let tx_ctx = ctx.clone();
    let err = store
        .exec_tx(&ctx, move |q| {
            async move {
                let user = q
                    .insert_user(
                        &tx_ctx,
                        AddUser {
                            user_id: "id-1".into(),
                            email: "a@example.com".into(),
                            password_hash: "$argon2id$placeholder".into(),
                        },
                    )
                    .await?;
                tx_ctx.cancel();
                Ok(user)
            }
            .boxed()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Cancelled));

    let fresh = CancellationToken::new();
    assert!(matches!(
        store.get_user_by_email(&fresh, "a@example.com").await,
        Err(StoreError::UserNotFound)
    ));

    // writer was released: a later insert goes through
    let svc = service(store);
    svc.create_user(&fresh, "a@example.com", "testtest1")
        .await
        .expect("insert after cancelled transaction");
}
