use chrono::{Duration, Utc};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

use crate::config::DatabaseConfig;
use crate::database::{self, models::*, CredentialStore, DbPool, SqliteCredentialStore, StoreError, UserField};

/// Test fixture for database tests
fn setup_test_db() -> (tempfile::TempDir, DbPool) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db.db");

    let config = DatabaseConfig {
        path: db_path.to_str().unwrap().to_string(),
        max_connections: 4,
    };
    let pool = database::initialize(&config).unwrap();

    (dir, pool)
}

fn sample_user(email: &str) -> User {
    User::new(
        email.to_string(),
        "$argon2id$v=19$m=4096,t=1,p=1$c2FsdA$aGFzaA".to_string(),
        UserProfile::default(),
        AccessibilityPreferences::default(),
    )
}

#[test]
fn test_schema_creation() {
    let (_dir, pool) = setup_test_db();
    let conn = pool.get().unwrap();

    for table in ["users", "audit_logs", "database_version"] {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
            [table],
            |row| row.get(0),
        ).unwrap();

        assert!(exists, "Table '{}' should exist", table);
    }

    for index in ["idx_users_email", "idx_audit_logs_user_id", "idx_audit_logs_timestamp"] {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='index' AND name=?)",
            [index],
            |row| row.get(0),
        ).unwrap();

        assert!(exists, "Index '{}' should exist", index);
    }
}

#[test]
fn test_initialize_is_idempotent() {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("again.db").to_str().unwrap().to_string(),
        max_connections: 2,
    };

    database::initialize(&config).unwrap();
    let pool = database::initialize(&config).unwrap();

    let versions: i64 = pool.get().unwrap()
        .query_row("SELECT COUNT(*) FROM database_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, 1);
}

#[test]
fn test_create_and_find_user() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);

    let mut user = sample_user("ana@example.com");
    user.accessibility.screen_reader_user = true;
    user.profile.first_name = Some("Ana".to_string());
    store.create(&user).unwrap();

    let by_email = store.find_by_email("  ANA@Example.com ").unwrap().unwrap();
    assert_eq!(by_email.id, user.id);
    assert!(by_email.accessibility.screen_reader_user);
    assert_eq!(by_email.profile.first_name.as_deref(), Some("Ana"));
    assert_eq!(by_email.security.failed_login_attempts, 0);

    let by_id = store.find_by_id(&user.id).unwrap().unwrap();
    assert_eq!(by_id.email, "ana@example.com");

    assert!(store.find_by_email("nobody@example.com").unwrap().is_none());
    assert!(store.find_by_id("missing").unwrap().is_none());
}

#[test]
fn test_duplicate_email_rejected() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);

    store.create(&sample_user("dup@example.com")).unwrap();
    let result = store.create(&sample_user("DUP@example.com"));

    assert!(matches!(result, Err(StoreError::EmailExists)));
}

#[test]
fn test_update_fields_round_trip() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);
    let user = sample_user("update@example.com");
    store.create(&user).unwrap();

    let now = Utc::now();
    let code = VerificationCode {
        code: "123456".to_string(),
        expires_at: now + Duration::minutes(15),
        attempts: 0,
        created_at: now,
    };
    let updated = store.update_fields(&user.id, &[
        UserField::IsVerified(true),
        UserField::AccountLockedUntil(Some(now + Duration::minutes(15))),
        UserField::EmailVerificationCode(Some(code.clone())),
        UserField::PasswordResetTokens(vec![PasswordResetToken {
            token_hash: "abc".to_string(),
            expires_at: now + Duration::hours(1),
            used: false,
        }]),
    ]).unwrap();
    assert!(updated);

    let stored = store.find_by_id(&user.id).unwrap().unwrap();
    assert!(stored.is_verified);
    assert!(stored.security.account_locked_until.is_some());
    assert_eq!(stored.security.email_verification_code.unwrap().code, code.code);
    assert_eq!(stored.security.password_reset_tokens.len(), 1);
    assert!(stored.updated_at >= user.updated_at);

    store.update_fields(&user.id, &[
        UserField::AccountLockedUntil(None),
        UserField::EmailVerificationCode(None),
    ]).unwrap();
    let cleared = store.find_by_id(&user.id).unwrap().unwrap();
    assert!(cleared.security.account_locked_until.is_none());
    assert!(cleared.security.email_verification_code.is_none());

    assert!(!store.update_fields("missing", &[UserField::IsActive(false)]).unwrap());
}

#[test]
fn test_find_by_reset_token() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);
    let user = sample_user("reset@example.com");
    store.create(&user).unwrap();

    store.update_fields(&user.id, &[UserField::PasswordResetTokens(vec![PasswordResetToken {
        token_hash: "deadbeef".to_string(),
        expires_at: Utc::now() + Duration::hours(1),
        used: false,
    }])]).unwrap();

    let found = store.find_by_reset_token("deadbeef").unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(store.find_by_reset_token("cafebabe").unwrap().is_none());
}

#[test]
fn test_reset_token_is_consumed_once() {
    let (_dir, pool) = setup_test_db();
    let store = Arc::new(SqliteCredentialStore::new(pool));
    let user = sample_user("once@example.com");
    store.create(&user).unwrap();
    store.update_fields(&user.id, &[
        UserField::PasswordResetTokens(vec![PasswordResetToken {
            token_hash: "deadbeef".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            used: false,
        }]),
        UserField::FailedLoginAttempts(5),
        UserField::AccountLockedUntil(Some(Utc::now() + Duration::minutes(10))),
    ]).unwrap();

    assert!(!store.consume_reset_token(&user.id, "cafebabe", "other-hash").unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let id = user.id.clone();
            thread::spawn(move || store.consume_reset_token(&id, "deadbeef", &format!("hash-{}", i)).unwrap())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|consumed| *consumed)
        .count();
    assert_eq!(winners, 1);

    let stored = store.find_by_id(&user.id).unwrap().unwrap();
    assert!(stored.password_hash.starts_with("hash-"));
    assert!(stored.security.password_reset_tokens.is_empty());
    assert!(stored.security.account_locked_until.is_none());
    assert_eq!(stored.security.failed_login_attempts, 0);
}

#[test]
fn test_increment_failed_login_attempts() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);
    let user = sample_user("count@example.com");
    store.create(&user).unwrap();

    assert_eq!(store.increment_failed_login_attempts(&user.id).unwrap(), Some(1));
    assert_eq!(store.increment_failed_login_attempts(&user.id).unwrap(), Some(2));
    assert_eq!(store.increment_failed_login_attempts("missing").unwrap(), None);
}

#[test]
fn test_increment_verification_attempts_requires_code() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);
    let user = sample_user("verify@example.com");
    store.create(&user).unwrap();

    assert_eq!(store.increment_verification_attempts(&user.id).unwrap(), None);

    let now = Utc::now();
    store.update_fields(&user.id, &[UserField::EmailVerificationCode(Some(VerificationCode {
        code: "654321".to_string(),
        expires_at: now + Duration::minutes(15),
        attempts: 0,
        created_at: now,
    }))]).unwrap();

    assert_eq!(store.increment_verification_attempts(&user.id).unwrap(), Some(1));
    assert_eq!(store.increment_verification_attempts(&user.id).unwrap(), Some(2));

    let stored = store.find_by_id(&user.id).unwrap().unwrap();
    let code = stored.security.email_verification_code.unwrap();
    assert_eq!(code.attempts, 2);
    assert_eq!(code.code, "654321");
}

#[test]
fn test_concurrent_increments_are_not_lost() {
    let (_dir, pool) = setup_test_db();
    let store = Arc::new(SqliteCredentialStore::new(pool));
    let user = sample_user("race@example.com");
    store.create(&user).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = user.id.clone();
            thread::spawn(move || store.increment_failed_login_attempts(&id).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = store.find_by_id(&user.id).unwrap().unwrap();
    assert_eq!(stored.security.failed_login_attempts, 8);
}

#[test]
fn test_delete_user() {
    let (_dir, pool) = setup_test_db();
    let store = SqliteCredentialStore::new(pool);
    let user = sample_user("gone@example.com");
    store.create(&user).unwrap();

    assert!(store.delete(&user.id).unwrap());
    assert!(store.find_by_id(&user.id).unwrap().is_none());
    assert!(!store.delete(&user.id).unwrap());
}
