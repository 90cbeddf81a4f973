use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::config::{EmailConfig, SecurityConfig};
use crate::database::models::{AuditEventType, PasswordResetToken, User};
use crate::database::{CredentialStore, StoreError, UserField};
use crate::email::{templates, EmailDispatcher};
use crate::security::password::{PasswordError, PasswordHasher};
use crate::security::{generate_secure_token, hash_token};
use crate::user::validate_password;

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password hashing error: {0}")]
    Password(#[from] PasswordError),
}

/// Result of a login attempt
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Box<User>),
    /// Unknown email, inactive account or wrong password
    InvalidCredentials,
    Locked { until: DateTime<Utc> },
}

impl LoginOutcome {
    pub fn message(&self) -> String {
        match self {
            LoginOutcome::Authenticated(_) => "Signed in successfully".to_string(),
            LoginOutcome::InvalidCredentials => "Incorrect email or password".to_string(),
            LoginOutcome::Locked { until } => {
                let minutes = (*until - Utc::now()).num_minutes().max(0) + 1;
                format!("Account locked after too many failed attempts. Try again in {} minutes.", minutes)
            }
        }
    }
}

/// Result of a password reset
#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    Reset,
    /// Unknown, used or expired token
    InvalidToken,
    WeakPassword(String),
}

/// Result of re-entering the password while signed in
#[derive(Debug, Clone, PartialEq)]
pub enum PasswordCheck {
    Confirmed,
    Incorrect,
    Locked { until: DateTime<Utc> },
}

/// Password custody and login gating
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    mailer: Arc<dyn EmailDispatcher>,
    audit: Arc<dyn AuditSink>,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    reset_ttl: Duration,
    frontend_url: String,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        mailer: Arc<dyn EmailDispatcher>,
        audit: Arc<dyn AuditSink>,
        security: &SecurityConfig,
        email: &EmailConfig,
    ) -> Self {
        Self {
            store,
            hasher,
            mailer,
            audit,
            max_failed_attempts: security.max_failed_attempts,
            lockout_duration: Duration::minutes(security.lockout_duration_minutes),
            reset_ttl: Duration::minutes(security.reset_token_minutes),
            frontend_url: email.frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check credentials and apply the lockout policy
    pub fn authenticate(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some(mut user) = self.store.find_by_email(email)? else {
            debug!("Login attempt for unknown email");
            self.audit.record(AuditEventType::LoginFailed, None, Some("unknown_email"));
            return Ok(LoginOutcome::InvalidCredentials);
        };

        let now = Utc::now();
        if let Some(until) = user.security.locked_at(now) {
            warn!("Login attempt for locked account {}", user.id);
            return Ok(LoginOutcome::Locked { until });
        }

        if user.security.account_locked_until.is_some() {
            self.release_expired_lock(&user.id)?;
            user.security.account_locked_until = None;
            user.security.failed_login_attempts = 0;
        }

        if !user.is_active {
            warn!("Login attempt for inactive account {}", user.id);
            return Ok(LoginOutcome::InvalidCredentials);
        }

        if !self.hasher.verify_password(password, &user.password_hash)? {
            return self.record_failure(&user, now);
        }

        self.store.update_fields(&user.id, &[
            UserField::FailedLoginAttempts(0),
            UserField::LastLogin(Some(now)),
        ])?;
        user.security.failed_login_attempts = 0;
        user.security.last_login = Some(now);

        self.audit.record(AuditEventType::UserLogin, Some(&user.id), None);
        info!("User {} signed in", user.id);
        Ok(LoginOutcome::Authenticated(Box::new(user)))
    }

    /// Lock has expired; start counting again
    fn release_expired_lock(&self, user_id: &str) -> Result<(), AuthError> {
        self.store.update_fields(user_id, &[
            UserField::AccountLockedUntil(None),
            UserField::FailedLoginAttempts(0),
        ])?;
        info!("Lock expired for user {}", user_id);
        Ok(())
    }

    fn record_failure(&self, user: &User, now: DateTime<Utc>) -> Result<LoginOutcome, AuthError> {
        let attempts = match self.store.increment_failed_login_attempts(&user.id)? {
            Some(attempts) => attempts,
            None => return Ok(LoginOutcome::InvalidCredentials),
        };
        self.audit.record(AuditEventType::LoginFailed, Some(&user.id), None);

        if attempts >= self.max_failed_attempts {
            let until = now + self.lockout_duration;
            self.store
                .update_fields(&user.id, &[UserField::AccountLockedUntil(Some(until))])?;
            self.audit.record(AuditEventType::AccountLocked, Some(&user.id), None);
            warn!("Account {} locked after {} failed attempts", user.id, attempts);
            return Ok(LoginOutcome::Locked { until });
        }

        debug!("Failed login for user {} ({} of {})", user.id, attempts, self.max_failed_attempts);
        Ok(LoginOutcome::InvalidCredentials)
    }

    /// Email a reset link to active users; the caller learns nothing about the address
    pub fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let user = match self.store.find_by_email(email)? {
            Some(user) if user.is_active => user,
            _ => {
                debug!("Password reset requested for unknown or inactive account");
                return Ok(());
            }
        };

        let token = generate_secure_token();
        let record = PasswordResetToken {
            token_hash: hash_token(&token),
            expires_at: Utc::now() + self.reset_ttl,
            used: false,
        };
        // One live token at a time
        self.store
            .update_fields(&user.id, &[UserField::PasswordResetTokens(vec![record])])?;
        self.audit.record(AuditEventType::PasswordResetRequested, Some(&user.id), None);

        let link = format!("{}/reset-password?token={}", self.frontend_url, token);
        let content = templates::password_reset_email(
            &user.profile.display_name(),
            &link,
            self.reset_ttl.num_minutes(),
        );
        if let Err(e) = self
            .mailer
            .send(&[user.email.clone()], &content.subject, &content.html, &content.text)
        {
            error!("Failed to send password reset email to user {}: {}", user.id, e);
        }

        Ok(())
    }

    /// Replace the password using a reset token
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<ResetOutcome, AuthError> {
        let token_hash = hash_token(token.trim());
        let Some(user) = self.store.find_by_reset_token(&token_hash)? else {
            return Ok(ResetOutcome::InvalidToken);
        };

        let now = Utc::now();
        let live = user
            .security
            .password_reset_tokens
            .iter()
            .any(|t| t.token_hash == token_hash && !t.used && t.expires_at > now);
        if !live {
            return Ok(ResetOutcome::InvalidToken);
        }

        if let Err(e) = validate_password(new_password, Some(&user.email)) {
            return Ok(ResetOutcome::WeakPassword(e.to_string()));
        }

        let password_hash = self.hasher.hash_password(new_password)?;
        // A concurrent reset with the same token may have won since the read
        if !self.store.consume_reset_token(&user.id, &token_hash, &password_hash)? {
            warn!("Reset token for user {} was already used", user.id);
            return Ok(ResetOutcome::InvalidToken);
        }

        self.audit.record(AuditEventType::PasswordReset, Some(&user.id), None);
        info!("Password reset for user {}", user.id);
        Ok(ResetOutcome::Reset)
    }

    /// Re-check the password of a signed-in user before a sensitive action.
    ///
    /// Wrong passwords count towards the same lockout as failed logins, and a
    /// locked account is refused without looking at the password.
    pub fn confirm_password(&self, user: &User, password: &str) -> Result<PasswordCheck, AuthError> {
        let now = Utc::now();
        if let Some(until) = user.security.locked_at(now) {
            warn!("Password confirmation for locked account {}", user.id);
            return Ok(PasswordCheck::Locked { until });
        }

        let mut failed_attempts = user.security.failed_login_attempts;
        if user.security.account_locked_until.is_some() {
            self.release_expired_lock(&user.id)?;
            failed_attempts = 0;
        }

        if self.hasher.verify_password(password, &user.password_hash)? {
            if failed_attempts > 0 {
                self.store
                    .update_fields(&user.id, &[UserField::FailedLoginAttempts(0)])?;
            }
            return Ok(PasswordCheck::Confirmed);
        }

        match self.record_failure(user, now)? {
            LoginOutcome::Locked { until } => Ok(PasswordCheck::Locked { until }),
            _ => Ok(PasswordCheck::Incorrect),
        }
    }
}
