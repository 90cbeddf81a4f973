use chrono::{Duration, Utc};
use log::{debug, info, warn};
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::config::VerificationConfig;
use crate::database::models::{AuditEventType, User, VerificationCode};
use crate::database::{CredentialStore, StoreError, UserField};
use crate::email::{templates, EmailDispatcher, EmailError};
use crate::security::constant_time_eq;

/// Number of digits in a verification code
pub const CODE_LENGTH: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to send verification email: {0}")]
    Email(#[from] EmailError),
}

/// Rejected before any attempt is counted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeFormatError {
    #[error("Verification code is required")]
    Empty,

    #[error("Invalid code. It must be 6 digits")]
    InvalidFormat,
}

/// Result of checking a submitted code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    UserNotFound,
    NoActiveCode,
    Expired,
    MaxAttempts,
    Invalid { remaining_attempts: u32 },
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified)
    }

    /// Message suitable for reading aloud
    pub fn message(&self) -> String {
        match self {
            VerificationOutcome::Verified => "Email verified successfully. You can now log in.".to_string(),
            VerificationOutcome::UserNotFound => "User not found".to_string(),
            VerificationOutcome::NoActiveCode => "No active code. Request a new one.".to_string(),
            VerificationOutcome::Expired => "Code expired. Request a new one.".to_string(),
            VerificationOutcome::MaxAttempts => "Too many attempts. Request a new code.".to_string(),
            VerificationOutcome::Invalid { remaining_attempts } => {
                format!("Incorrect code. {} attempts remaining.", remaining_attempts)
            }
        }
    }
}

/// Result of asking for a new code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendCodeOutcome {
    /// Sent, or the email is unknown; callers cannot tell which
    Accepted,
    AlreadyVerified,
}

/// Strip whitespace and require exactly six ASCII digits
pub fn normalize_code(input: &str) -> Result<String, CodeFormatError> {
    let code: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    if code.is_empty() {
        return Err(CodeFormatError::Empty);
    }
    if code.len() != CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(CodeFormatError::InvalidFormat);
    }
    Ok(code)
}

/// Uniformly random code from the OS generator, zero padded
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Issues and checks email verification codes
pub struct VerificationManager {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailDispatcher>,
    audit: Arc<dyn AuditSink>,
    code_ttl: Duration,
    max_attempts: u32,
}

impl VerificationManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailDispatcher>,
        audit: Arc<dyn AuditSink>,
        config: &VerificationConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            audit,
            code_ttl: Duration::minutes(config.code_ttl_minutes),
            max_attempts: config.max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Store a new code for the user, replacing any previous one, and return it
    pub fn issue(&self, user_id: &str) -> Result<String, VerificationError> {
        let now = Utc::now();
        let code = generate_code();
        let record = VerificationCode {
            code: code.clone(),
            expires_at: now + self.code_ttl,
            attempts: 0,
            created_at: now,
        };

        if !self.store.update_fields(user_id, &[UserField::EmailVerificationCode(Some(record))])? {
            return Err(VerificationError::UserNotFound);
        }

        debug!("Issued verification code for user {}", user_id);
        Ok(code)
    }

    /// Email a code to the user
    pub fn deliver(&self, user: &User, code: &str) -> Result<(), VerificationError> {
        let content = templates::verification_code_email(
            &user.profile.display_name(),
            code,
            self.code_ttl.num_minutes(),
            self.max_attempts,
        );
        self.mailer
            .send(&[user.email.clone()], &content.subject, &content.html, &content.text)?;

        self.audit.record(AuditEventType::VerificationCodeSent, Some(&user.id), None);
        Ok(())
    }

    /// Issue and email a fresh code
    pub fn send_code(&self, email: &str) -> Result<SendCodeOutcome, VerificationError> {
        let user = match self.store.find_by_email(email)? {
            Some(user) => user,
            None => {
                info!("Verification code requested for unknown email");
                return Ok(SendCodeOutcome::Accepted);
            }
        };

        if user.is_verified {
            return Ok(SendCodeOutcome::AlreadyVerified);
        }

        let code = self.issue(&user.id)?;
        self.deliver(&user, &code)?;

        info!("Verification code sent to user {}", user.id);
        Ok(SendCodeOutcome::Accepted)
    }

    /// Check a normalized code for the account with this email
    pub fn verify(&self, email: &str, code: &str) -> Result<VerificationOutcome, VerificationError> {
        let Some(user) = self.store.find_by_email(email)? else {
            return Ok(VerificationOutcome::UserNotFound);
        };
        let Some(stored) = user.security.email_verification_code.as_ref() else {
            return Ok(VerificationOutcome::NoActiveCode);
        };

        let now = Utc::now();
        if now > stored.expires_at {
            // Left in place until the next issue
            return Ok(VerificationOutcome::Expired);
        }
        if stored.attempts >= self.max_attempts {
            return Ok(VerificationOutcome::MaxAttempts);
        }

        if constant_time_eq(stored.code.as_bytes(), code.as_bytes()) {
            self.store.update_fields(&user.id, &[
                UserField::IsVerified(true),
                UserField::EmailVerifiedAt(Some(now)),
                UserField::EmailVerificationCode(None),
            ])?;
            self.audit.record(AuditEventType::EmailVerified, Some(&user.id), None);
            info!("Email verified for user {}", user.id);
            return Ok(VerificationOutcome::Verified);
        }

        let attempts = match self.store.increment_verification_attempts(&user.id)? {
            Some(attempts) => attempts,
            // Code consumed or cleared by a concurrent request
            None => return Ok(VerificationOutcome::NoActiveCode),
        };

        if attempts > self.max_attempts {
            return Ok(VerificationOutcome::MaxAttempts);
        }

        warn!("Incorrect verification code for user {} (attempt {})", user.id, attempts);
        Ok(VerificationOutcome::Invalid {
            remaining_attempts: self.max_attempts - attempts,
        })
    }

    /// Let the user continue without verifying; recorded for later reminders
    pub fn skip_verification(&self, user_id: &str) -> Result<(), VerificationError> {
        let updated = self
            .store
            .update_fields(user_id, &[UserField::VerificationSkippedAt(Some(Utc::now()))])?;
        if !updated {
            return Err(VerificationError::UserNotFound);
        }

        self.audit.record(AuditEventType::VerificationSkipped, Some(user_id), None);
        info!("User {} skipped email verification", user_id);
        Ok(())
    }
}
