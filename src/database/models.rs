use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

/// Declared level of visual impairment
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisualImpairmentLevel {
    Blind,
    LowVision,
    #[default]
    None,
}

impl VisualImpairmentLevel {
    pub fn as_str(&self) -> &str {
        match self {
            VisualImpairmentLevel::Blind => "blind",
            VisualImpairmentLevel::LowVision => "low_vision",
            VisualImpairmentLevel::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "blind" => Ok(VisualImpairmentLevel::Blind),
            "low_vision" | "low-vision" => Ok(VisualImpairmentLevel::LowVision),
            "none" => Ok(VisualImpairmentLevel::None),
            _ => Err(format!("Invalid visual impairment level: {}", s)),
        }
    }
}

/// Preferred font size
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
    XLarge,
}

impl FontSize {
    pub fn as_str(&self) -> &str {
        match self {
            FontSize::Small => "small",
            FontSize::Medium => "medium",
            FontSize::Large => "large",
            FontSize::XLarge => "x-large",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "small" => Ok(FontSize::Small),
            "medium" => Ok(FontSize::Medium),
            "large" => Ok(FontSize::Large),
            "x-large" | "xlarge" => Ok(FontSize::XLarge),
            _ => Err(format!("Invalid font size: {}", s)),
        }
    }
}

/// Interface language
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "es" => Ok(Language::Es),
            "en" => Ok(Language::En),
            _ => Err(format!("Unsupported language: {}", s)),
        }
    }
}

/// Personal profile data
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub preferred_language: Language,
    pub timezone: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            first_name: None,
            last_name: None,
            phone: None,
            preferred_language: Language::Es,
            timezone: "America/Bogota".to_string(),
        }
    }
}

impl UserProfile {
    /// Name used in greetings, falling back to a neutral salutation
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => "there".to_string(),
        }
    }
}

/// Accessibility settings; each flag is independent
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AccessibilityPreferences {
    pub visual_impairment_level: VisualImpairmentLevel,
    pub screen_reader_user: bool,
    pub preferred_tts_speed: f32,
    pub preferred_font_size: FontSize,
    pub high_contrast_mode: bool,
    pub dark_mode_enabled: bool,
    pub haptic_feedback_enabled: bool,
    pub audio_descriptions_enabled: bool,
    pub voice_commands_enabled: bool,
    pub gesture_navigation_enabled: bool,
    pub extended_timeout_needed: bool,
    pub slow_animations: bool,
    pub custom_notification_sounds: bool,
    pub audio_confirmation_enabled: bool,
    pub skip_repetitive_content: bool,
    pub landmark_navigation_preferred: bool,
}

impl Default for AccessibilityPreferences {
    fn default() -> Self {
        Self {
            visual_impairment_level: VisualImpairmentLevel::None,
            screen_reader_user: false,
            preferred_tts_speed: 1.0,
            preferred_font_size: FontSize::Medium,
            high_contrast_mode: false,
            dark_mode_enabled: false,
            haptic_feedback_enabled: true,
            audio_descriptions_enabled: false,
            voice_commands_enabled: false,
            gesture_navigation_enabled: true,
            extended_timeout_needed: false,
            slow_animations: false,
            custom_notification_sounds: false,
            audio_confirmation_enabled: true,
            skip_repetitive_content: true,
            landmark_navigation_preferred: true,
        }
    }
}

impl AccessibilityPreferences {
    /// Defaults for a newly registered user given their declared needs
    pub fn for_registration(level: VisualImpairmentLevel, screen_reader_user: bool) -> Self {
        Self {
            visual_impairment_level: level,
            screen_reader_user,
            audio_descriptions_enabled: matches!(
                level,
                VisualImpairmentLevel::Blind | VisualImpairmentLevel::LowVision
            ),
            extended_timeout_needed: level == VisualImpairmentLevel::Blind,
            ..Self::default()
        }
    }
}

/// One-time email verification code
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VerificationCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Password reset token; only the SHA-256 of the token is kept
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PasswordResetToken {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

/// Authentication state attached to a user
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct UserSecurity {
    pub failed_login_attempts: u32,
    pub account_locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub password_reset_tokens: Vec<PasswordResetToken>,
    pub email_verification_code: Option<VerificationCode>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub verification_skipped_at: Option<DateTime<Utc>>,
}

impl UserSecurity {
    /// Lock expiry if the account is locked at `now`
    pub fn locked_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.account_locked_until.filter(|until| *until > now)
    }
}

/// User model
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub profile: UserProfile,
    pub accessibility: AccessibilityPreferences,
    pub security: UserSecurity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: String,
        password_hash: String,
        profile: UserProfile,
        accessibility: AccessibilityPreferences,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            is_active: true,
            is_verified: false,
            profile,
            accessibility,
            security: UserSecurity::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of the user without credentials or security state
    pub fn public_view(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            email: self.email.clone(),
            is_active: self.is_active,
            is_verified: self.is_verified,
            profile: self.profile.clone(),
            accessibility: self.accessibility.clone(),
            email_verified_at: self.security.email_verified_at,
            verification_skipped_at: self.security.verification_skipped_at,
            created_at: self.created_at,
        }
    }
}

/// User as shown to its owner
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub profile: UserProfile,
    pub accessibility: AccessibilityPreferences,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub verification_skipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Audit event type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    UserRegistered,
    UserLogin,
    LoginFailed,
    AccountLocked,
    VerificationCodeSent,
    EmailVerified,
    VerificationSkipped,
    PasswordResetRequested,
    PasswordReset,
    ProfileUpdated,
    PreferencesUpdated,
    AccountDeleted,
    AccessibilityUsage,
}

impl AuditEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AuditEventType::UserRegistered => "user_registered",
            AuditEventType::UserLogin => "user_login",
            AuditEventType::LoginFailed => "login_failed",
            AuditEventType::AccountLocked => "account_locked",
            AuditEventType::VerificationCodeSent => "verification_code_sent",
            AuditEventType::EmailVerified => "email_verified",
            AuditEventType::VerificationSkipped => "verification_skipped",
            AuditEventType::PasswordResetRequested => "password_reset_requested",
            AuditEventType::PasswordReset => "password_reset",
            AuditEventType::ProfileUpdated => "profile_updated",
            AuditEventType::PreferencesUpdated => "preferences_updated",
            AuditEventType::AccountDeleted => "account_deleted",
            AuditEventType::AccessibilityUsage => "accessibility_usage",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "user_registered" => Ok(AuditEventType::UserRegistered),
            "user_login" => Ok(AuditEventType::UserLogin),
            "login_failed" => Ok(AuditEventType::LoginFailed),
            "account_locked" => Ok(AuditEventType::AccountLocked),
            "verification_code_sent" => Ok(AuditEventType::VerificationCodeSent),
            "email_verified" => Ok(AuditEventType::EmailVerified),
            "verification_skipped" => Ok(AuditEventType::VerificationSkipped),
            "password_reset_requested" => Ok(AuditEventType::PasswordResetRequested),
            "password_reset" => Ok(AuditEventType::PasswordReset),
            "profile_updated" => Ok(AuditEventType::ProfileUpdated),
            "preferences_updated" => Ok(AuditEventType::PreferencesUpdated),
            "account_deleted" => Ok(AuditEventType::AccountDeleted),
            "accessibility_usage" => Ok(AuditEventType::AccessibilityUsage),
            _ => Err(format!("Invalid audit event type: {}", s)),
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit log record
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditLog {
    pub id: String,
    pub event_type: AuditEventType,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}
