use log::{debug, info, warn};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::database::models::{
    AccessibilityPreferences, AuditEventType, Language, PublicUser, User, UserProfile, VisualImpairmentLevel,
};
use crate::database::{CredentialStore, StoreError};
use crate::security::password::{PasswordError, PasswordHasher};
use crate::user::validation::{validate_email, validate_password, EmailValidationError, PasswordValidationError};
use crate::user::verification::VerificationManager;

/// User registration error types
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("An account with this email already exists")]
    EmailExists,

    #[error(transparent)]
    InvalidEmail(#[from] EmailValidationError),

    #[error(transparent)]
    InvalidPassword(#[from] PasswordValidationError),

    #[error("Failed to hash password: {0}")]
    Hashing(#[from] PasswordError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmailExists => RegistrationError::EmailExists,
            other => RegistrationError::Store(other),
        }
    }
}

/// Data collected by the sign-up form
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preferred_language: Language,
    pub visual_impairment_level: VisualImpairmentLevel,
    pub screen_reader_user: bool,
}

impl RegistrationRequest {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            first_name: None,
            last_name: None,
            preferred_language: Language::default(),
            visual_impairment_level: VisualImpairmentLevel::None,
            screen_reader_user: false,
        }
    }
}

/// A created account and whether its verification email went out
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub user: PublicUser,
    pub email_sent: bool,
}

impl RegistrationOutcome {
    pub fn message(&self) -> String {
        let mut message = "Account created. Check your email for the verification code.".to_string();
        if !self.email_sent {
            message.push_str(" We could not send the email right now; you can request a new code later.");
        }
        message
    }
}

/// Creates accounts and starts email verification
pub struct Registrar {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    verification: Arc<VerificationManager>,
    audit: Arc<dyn AuditSink>,
}

impl Registrar {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        verification: Arc<VerificationManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, hasher, verification, audit }
    }

    /// Register a new user
    pub fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome, RegistrationError> {
        let email = validate_email(&request.email)?;
        debug!("Registering new user");

        validate_password(&request.password, Some(&email))?;

        if self.store.find_by_email(&email)?.is_some() {
            return Err(RegistrationError::EmailExists);
        }

        let password_hash = self.hasher.hash_password(&request.password)?;

        let profile = UserProfile {
            first_name: request.first_name.filter(|n| !n.trim().is_empty()),
            last_name: request.last_name.filter(|n| !n.trim().is_empty()),
            preferred_language: request.preferred_language,
            ..UserProfile::default()
        };
        let accessibility = AccessibilityPreferences::for_registration(
            request.visual_impairment_level,
            request.screen_reader_user,
        );

        let user = User::new(email, password_hash, profile, accessibility);
        // The unique index still guards against a concurrent registration
        self.store.create(&user)?;
        self.audit.record(
            AuditEventType::UserRegistered,
            Some(&user.id),
            Some(user.accessibility.visual_impairment_level.as_str()),
        );
        info!("User registered successfully: {}", user.id);

        let email_sent = match self
            .verification
            .issue(&user.id)
            .and_then(|code| self.verification.deliver(&user, &code))
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Verification email for user {} not sent: {}", user.id, e);
                false
            }
        };

        Ok(RegistrationOutcome {
            user: user.public_view(),
            email_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::RecordingSink;
    use crate::config::Config;
    use crate::database::testing::{sample_user, temp_store};
    use crate::email::{EmailError, MockEmailDispatcher};
    use crate::security::password::MockPasswordHasher;

    fn registrar(
        store: Arc<dyn CredentialStore>,
        hasher: MockPasswordHasher,
        mailer: MockEmailDispatcher,
        audit: Arc<RecordingSink>,
    ) -> Registrar {
        let verification = Arc::new(VerificationManager::new(
            store.clone(),
            Arc::new(mailer),
            audit.clone(),
            &Config::default().verification,
        ));
        Registrar::new(store, Arc::new(hasher), verification, audit)
    }

    fn hashing() -> MockPasswordHasher {
        let mut hasher = MockPasswordHasher::new();
        hasher
            .expect_hash_password()
            .returning(|p| Ok(format!("hashed:{}", p)));
        hasher
    }

    #[test]
    fn test_register_user_success() {
        // Arrange
        let (_dir, _pool, store) = temp_store();
        let audit = Arc::new(RecordingSink::default());
        let mut mailer = MockEmailDispatcher::new();
        mailer.expect_send().times(1).returning(|_, _, _, _| Ok(()));
        let registrar = registrar(store.clone(), hashing(), mailer, audit.clone());

        let mut request = RegistrationRequest::new(" Ana.Perez@Example.com ", "Secur3#Pass");
        request.first_name = Some("Ana".to_string());
        request.visual_impairment_level = VisualImpairmentLevel::Blind;
        request.screen_reader_user = true;

        // Act
        let outcome = registrar.register(request).unwrap();

        // Assert
        assert!(outcome.email_sent);
        assert_eq!(outcome.user.email, "ana.perez@example.com");
        assert!(!outcome.user.is_verified);
        assert!(outcome.user.accessibility.extended_timeout_needed);
        assert!(outcome.user.accessibility.audio_descriptions_enabled);

        let stored = store.find_by_id(&outcome.user.id).unwrap().unwrap();
        assert_eq!(stored.password_hash, "hashed:Secur3#Pass");
        assert_eq!(stored.profile.first_name.as_deref(), Some("Ana"));
        assert!(stored.security.email_verification_code.is_some());
        assert!(audit.contains(AuditEventType::UserRegistered));
        assert!(audit.contains(AuditEventType::VerificationCodeSent));
    }

    #[test]
    fn test_register_duplicate_email() {
        let (_dir, _pool, store) = temp_store();
        store.create(&sample_user("taken@example.com", "hash")).unwrap();

        let mut hasher = MockPasswordHasher::new();
        hasher.expect_hash_password().times(0);
        let registrar = registrar(store, hasher, MockEmailDispatcher::new(), Arc::default());

        let result = registrar.register(RegistrationRequest::new("TAKEN@example.com", "Secur3#Pass"));
        assert!(matches!(result, Err(RegistrationError::EmailExists)));
    }

    #[test]
    fn test_register_rejects_invalid_input() {
        let (_dir, _pool, store) = temp_store();
        let registrar = registrar(store.clone(), MockPasswordHasher::new(), MockEmailDispatcher::new(), Arc::default());

        let result = registrar.register(RegistrationRequest::new("ana@gmial.com", "Secur3#Pass"));
        assert!(matches!(result, Err(RegistrationError::InvalidEmail(_))));

        let result = registrar.register(RegistrationRequest::new("ana@example.com", "weakpass"));
        assert!(matches!(result, Err(RegistrationError::InvalidPassword(_))));

        assert!(store.find_by_email("ana@example.com").unwrap().is_none());
    }

    #[test]
    fn test_register_survives_email_failure() {
        let (_dir, _pool, store) = temp_store();
        let mut mailer = MockEmailDispatcher::new();
        mailer
            .expect_send()
            .withf(|to, _, _, _| to == ["bob@example.com".to_string()])
            .returning(|_, _, _, _| Err(EmailError::Transport("offline".to_string())));
        let registrar = registrar(store.clone(), hashing(), mailer, Arc::default());

        let outcome = registrar
            .register(RegistrationRequest::new("bob@example.com", "Secur3#Pass"))
            .unwrap();

        assert!(!outcome.email_sent);
        assert!(outcome.message().contains("request a new code"));
        assert!(store.find_by_email("bob@example.com").unwrap().is_some());
    }
}
