//! PostgreSQL store tests
//!
//! These tests need a reachable PostgreSQL instance (`DATABASE_URL`) and are
//! ignored by default. Run them with `cargo test -- --ignored`.

use common::{database::DatabaseConfig, error::DatabaseError};
use identity::{
    database,
    models::{NewLogEntry, NewUser, UserPatch},
    repositories::{
        AuditLog, PgAuditLog, PgReferenceChecker, PgUserStore, ReferenceChecker, UserLookup,
        UserStore,
    },
};
use sqlx::PgPool;
use uuid::Uuid;

async fn pool() -> PgPool {
    let config = DatabaseConfig::from_env().expect("Failed to read database config");
    database::connect(&config)
        .await
        .expect("Failed to prepare database")
}

fn new_user(refresh_token: Option<&str>) -> NewUser {
    let id = Uuid::new_v4();
    NewUser {
        id,
        fullname: "Pg User".to_string(),
        username: "pg_user".to_string(),
        email: format!("{}@example.com", id),
        password_hash: "hash".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        email_verify_token: Some("verify".to_string()),
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_swap_refresh_token_is_conditional() {
    let store = PgUserStore::new(pool().await);
    let user = store.insert(new_user(Some("r1"))).await.unwrap();

    assert!(!store.swap_refresh_token(user.id, Some("stale"), Some("r2")).await.unwrap());
    assert!(store.swap_refresh_token(user.id, Some("r1"), Some("r2")).await.unwrap());
    assert!(!store.swap_refresh_token(user.id, Some("r1"), Some("r3")).await.unwrap());

    // An empty slot matches an expected NULL
    assert!(store.swap_refresh_token(user.id, Some("r2"), None).await.unwrap());
    assert!(store.swap_refresh_token(user.id, None, Some("r4")).await.unwrap());

    let stored = store.find_by(UserLookup::Id(user.id)).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("r4"));

    store.delete(user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_revoke_refresh_token_clears_holder() {
    let store = PgUserStore::new(pool().await);
    let token = format!("refresh-{}", Uuid::new_v4());
    let user = store.insert(new_user(Some(&token))).await.unwrap();

    assert_eq!(store.revoke_refresh_token(&token).await.unwrap(), Some(user.id));
    assert_eq!(store.revoke_refresh_token(&token).await.unwrap(), None);
    assert!(!store.exists(UserLookup::RefreshToken(&token)).await.unwrap());

    store.delete(user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_update_fields_sets_and_clears_slots() {
    let store = PgUserStore::new(pool().await);
    let user = store.insert(new_user(Some("r1"))).await.unwrap();

    let patch = UserPatch {
        forgot_password_token: Some(Some("reset".to_string())),
        city: Some("Hanoi".to_string()),
        ..Default::default()
    };
    let updated = store.update_fields(user.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.forgot_password_token.as_deref(), Some("reset"));
    assert_eq!(updated.refresh_token.as_deref(), Some("r1"));
    assert_eq!(updated.city.as_deref(), Some("Hanoi"));
    assert!(updated.updated_at >= user.updated_at);

    let patch = UserPatch {
        refresh_token: Some(None),
        email_verify_token: Some(None),
        ..Default::default()
    };
    let updated = store.update_fields(user.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.refresh_token, None);
    assert_eq!(updated.email_verify_token, None);
    assert_eq!(updated.forgot_password_token.as_deref(), Some("reset"));
    assert_eq!(updated.city.as_deref(), Some("Hanoi"));
    assert_eq!(updated.fullname, "Pg User");

    let missing = store
        .update_fields(Uuid::new_v4(), UserPatch::default())
        .await
        .unwrap();
    assert!(missing.is_none());

    store.delete(user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_consume_forgot_password_token_once() {
    let store = PgUserStore::new(pool().await);
    let user = store.insert(new_user(None)).await.unwrap();
    let patch = UserPatch {
        forgot_password_token: Some(Some("reset-1".to_string())),
        ..Default::default()
    };
    store.update_fields(user.id, patch).await.unwrap();

    assert!(!store.consume_forgot_password_token(user.id, "other", "h1").await.unwrap());
    assert!(store.consume_forgot_password_token(user.id, "reset-1", "h2").await.unwrap());
    assert!(!store.consume_forgot_password_token(user.id, "reset-1", "h3").await.unwrap());

    let stored = store.find_by(UserLookup::Id(user.id)).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, "h2");
    assert_eq!(stored.forgot_password_token, None);

    store.delete(user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_duplicate_email_is_unique_violation() {
    let store = PgUserStore::new(pool().await);
    let user = store.insert(new_user(None)).await.unwrap();

    let mut duplicate = new_user(None);
    duplicate.email = user.email.clone();
    let result = store.insert(duplicate).await;
    assert!(matches!(result, Err(DatabaseError::UniqueViolation(_))));

    let other = store.insert(new_user(None)).await.unwrap();
    let patch = UserPatch {
        email: Some(user.email.clone()),
        ..Default::default()
    };
    let result = store.update_fields(other.id, patch).await;
    assert!(matches!(result, Err(DatabaseError::UniqueViolation(_))));

    store.delete(user.id).await.unwrap();
    store.delete(other.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_reference_checker_and_audit_log() {
    let pool = pool().await;

    // Tables owned by other services may be absent; those are skipped
    let references = PgReferenceChecker::new(pool.clone());
    assert_eq!(references.find_reference(Uuid::new_v4()).await.unwrap(), None);

    let logs = PgAuditLog::new(pool);
    logs.append(NewLogEntry::new(Uuid::new_v4(), "127.0.0.1", "Logged in"))
        .await
        .unwrap();
}
