use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::models::{
    AccessibilityPreferences, PasswordResetToken, User, UserProfile, UserSecurity, VerificationCode,
};
use super::DbPool;

/// Credential store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Email already registered")]
    EmailExists,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Failed to serialize field: {0}")]
    Serialization(String),
}

/// A single field of a user record, for partial updates
#[derive(Debug, Clone, PartialEq)]
pub enum UserField {
    PasswordHash(String),
    IsActive(bool),
    IsVerified(bool),
    Profile(UserProfile),
    Accessibility(AccessibilityPreferences),
    FailedLoginAttempts(u32),
    AccountLockedUntil(Option<DateTime<Utc>>),
    LastLogin(Option<DateTime<Utc>>),
    PasswordResetTokens(Vec<PasswordResetToken>),
    EmailVerificationCode(Option<VerificationCode>),
    EmailVerifiedAt(Option<DateTime<Utc>>),
    VerificationSkippedAt(Option<DateTime<Utc>>),
}

impl UserField {
    fn column(&self) -> &'static str {
        match self {
            UserField::PasswordHash(_) => "password_hash",
            UserField::IsActive(_) => "is_active",
            UserField::IsVerified(_) => "is_verified",
            UserField::Profile(_) => "profile",
            UserField::Accessibility(_) => "accessibility",
            UserField::FailedLoginAttempts(_) => "security_failed_login_attempts",
            UserField::AccountLockedUntil(_) => "security_account_locked_until",
            UserField::LastLogin(_) => "security_last_login",
            UserField::PasswordResetTokens(_) => "security_password_reset_tokens",
            UserField::EmailVerificationCode(_) => "security_email_verification_code",
            UserField::EmailVerifiedAt(_) => "security_email_verified_at",
            UserField::VerificationSkippedAt(_) => "security_verification_skipped_at",
        }
    }

    fn to_sql_value(&self) -> Result<Value, StoreError> {
        Ok(match self {
            UserField::PasswordHash(hash) => Value::Text(hash.clone()),
            UserField::IsActive(flag) | UserField::IsVerified(flag) => Value::Integer(*flag as i64),
            UserField::Profile(profile) => Value::Text(to_json(profile)?),
            UserField::Accessibility(prefs) => Value::Text(to_json(prefs)?),
            UserField::FailedLoginAttempts(count) => Value::Integer(*count as i64),
            UserField::PasswordResetTokens(tokens) => Value::Text(to_json(tokens)?),
            UserField::EmailVerificationCode(code) => match code {
                Some(code) => Value::Text(to_json(code)?),
                None => Value::Null,
            },
            UserField::AccountLockedUntil(at)
            | UserField::LastLogin(at)
            | UserField::EmailVerifiedAt(at)
            | UserField::VerificationSkippedAt(at) => match at {
                Some(at) => Value::Text(format_timestamp(at)),
                None => Value::Null,
            },
        })
    }
}

/// Persistence for users and their authentication state
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by email; the email is normalized first
    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Look up the user holding a reset token with the given SHA-256 hex digest
    fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError>;

    fn create(&self, user: &User) -> Result<(), StoreError>;

    /// Apply a partial update; returns false when no user has this id
    fn update_fields(&self, id: &str, fields: &[UserField]) -> Result<bool, StoreError>;

    /// Atomically add one failed login; returns the new count
    fn increment_failed_login_attempts(&self, id: &str) -> Result<Option<u32>, StoreError>;

    /// Atomically add one attempt to the live verification code; returns the new count,
    /// or none when the user has no code
    fn increment_verification_attempts(&self, id: &str) -> Result<Option<u32>, StoreError>;

    /// Replace the password while the reset token is still on record, clearing every
    /// reset token and the lockout in the same statement; false when the token is gone
    fn consume_reset_token(&self, id: &str, token_hash: &str, password_hash: &str) -> Result<bool, StoreError>;

    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Lower-cased, trimmed form of an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

const USER_COLUMNS: &str = "id, email, password_hash, is_active, is_verified, profile, accessibility, \
    security_failed_login_attempts, security_account_locked_until, security_last_login, \
    security_password_reset_tokens, security_email_verification_code, security_email_verified_at, \
    security_verification_skipped_at, created_at, updated_at";

/// SQLite implementation of the credential store
pub struct SqliteCredentialStore {
    pool: DbPool,
}

impl SqliteCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn query_user(&self, clause: &str, value: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, clause);
        let user = conn
            .query_row(&sql, params![value], row_to_user)
            .optional()?;
        Ok(user)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.query_user("email = ?1", &normalize_email(email))
    }

    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.query_user("id = ?1", id)
    }

    fn find_by_reset_token(&self, token_hash: &str) -> Result<Option<User>, StoreError> {
        self.query_user(
            "EXISTS (SELECT 1 FROM json_each(security_password_reset_tokens)
                     WHERE json_extract(value, '$.token_hash') = ?1)",
            token_hash,
        )
    }

    fn create(&self, user: &User) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let code = match &user.security.email_verification_code {
            Some(code) => Some(to_json(code)?),
            None => None,
        };

        let result = conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                USER_COLUMNS
            ),
            params![
                user.id,
                normalize_email(&user.email),
                user.password_hash,
                user.is_active as i32,
                user.is_verified as i32,
                to_json(&user.profile)?,
                to_json(&user.accessibility)?,
                user.security.failed_login_attempts,
                user.security.account_locked_until.as_ref().map(format_timestamp),
                user.security.last_login.as_ref().map(format_timestamp),
                to_json(&user.security.password_reset_tokens)?,
                code,
                user.security.email_verified_at.as_ref().map(format_timestamp),
                user.security.verification_skipped_at.as_ref().map(format_timestamp),
                format_timestamp(&user.created_at),
                format_timestamp(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => {
                debug!("Stored user {}", user.id);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::EmailExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_fields(&self, id: &str, fields: &[UserField]) -> Result<bool, StoreError> {
        let mut assignments = Vec::with_capacity(fields.len() + 1);
        let mut values: Vec<Value> = Vec::with_capacity(fields.len() + 2);

        for field in fields {
            values.push(field.to_sql_value()?);
            assignments.push(format!("{} = ?{}", field.column(), values.len()));
        }
        values.push(Value::Text(format_timestamp(&Utc::now())));
        assignments.push(format!("updated_at = ?{}", values.len()));
        values.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );

        let conn = self.pool.get()?;
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(changed > 0)
    }

    fn increment_failed_login_attempts(&self, id: &str) -> Result<Option<u32>, StoreError> {
        let conn = self.pool.get()?;
        let count = conn
            .query_row(
                "UPDATE users
                 SET security_failed_login_attempts = security_failed_login_attempts + 1,
                     updated_at = ?2
                 WHERE id = ?1
                 RETURNING security_failed_login_attempts",
                params![id, format_timestamp(&Utc::now())],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    fn increment_verification_attempts(&self, id: &str) -> Result<Option<u32>, StoreError> {
        let conn = self.pool.get()?;
        let count = conn
            .query_row(
                "UPDATE users
                 SET security_email_verification_code = json_set(
                         security_email_verification_code,
                         '$.attempts',
                         json_extract(security_email_verification_code, '$.attempts') + 1
                     ),
                     updated_at = ?2
                 WHERE id = ?1 AND security_email_verification_code IS NOT NULL
                 RETURNING json_extract(security_email_verification_code, '$.attempts')",
                params![id, format_timestamp(&Utc::now())],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }

    fn consume_reset_token(&self, id: &str, token_hash: &str, password_hash: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users
             SET password_hash = ?3,
                 security_password_reset_tokens = '[]',
                 security_account_locked_until = NULL,
                 security_failed_login_attempts = 0,
                 updated_at = ?4
             WHERE id = ?1
               AND EXISTS (SELECT 1 FROM json_each(users.security_password_reset_tokens)
                           WHERE json_extract(value, '$.token_hash') = ?2)",
            params![id, token_hash, password_hash, format_timestamp(&Utc::now())],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

/// RFC 3339 with fixed precision so stored timestamps sort as text
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, v)).transpose()
}

fn parse_json<T: DeserializeOwned>(idx: usize, value: &str) -> rusqlite::Result<T> {
    serde_json::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let profile: String = row.get(5)?;
    let accessibility: String = row.get(6)?;
    let reset_tokens: String = row.get(10)?;
    let verification_code: Option<String> = row.get(11)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
        is_verified: row.get::<_, i32>(4)? != 0,
        profile: parse_json(5, &profile)?,
        accessibility: parse_json(6, &accessibility)?,
        security: UserSecurity {
            failed_login_attempts: row.get(7)?,
            account_locked_until: parse_optional_timestamp(8, row.get(8)?)?,
            last_login: parse_optional_timestamp(9, row.get(9)?)?,
            password_reset_tokens: parse_json(10, &reset_tokens)?,
            email_verification_code: verification_code
                .map(|code| parse_json(11, &code))
                .transpose()?,
            email_verified_at: parse_optional_timestamp(12, row.get(12)?)?,
            verification_skipped_at: parse_optional_timestamp(13, row.get(13)?)?,
        },
        created_at: parse_timestamp(14, row.get(14)?)?,
        updated_at: parse_timestamp(15, row.get(15)?)?,
    })
}
