use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::{AuditLogger, AuditSink};
use crate::database::models::{
    AccessibilityPreferences, AuditEventType, AuditLog, FontSize, Language, PublicUser, User, VisualImpairmentLevel,
};
use crate::database::{CredentialStore, StoreError, UserField};
use crate::security::auth::{AuthError, Authenticator, PasswordCheck};

/// Phrase the user must type to delete their account
pub const DELETE_CONFIRMATION: &str = "DELETE_MY_ACCOUNT";

const MIN_TTS_SPEED: f32 = 0.5;
const MAX_TTS_SPEED: f32 = 2.0;

/// User profile error types
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid {field}: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("No changes to apply")]
    NothingToUpdate,

    #[error("Type DELETE_MY_ACCOUNT to confirm account deletion")]
    ConfirmationRequired,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("Account locked after too many failed attempts")]
    Locked { until: DateTime<Utc> },

    #[error("Password check failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Profile fields to change; `None` leaves a field as is
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub preferred_language: Option<Language>,
    pub timezone: Option<String>,
}

/// Accessibility preferences to change; `None` leaves a preference as is
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityPreferencesUpdate {
    pub visual_impairment_level: Option<VisualImpairmentLevel>,
    pub screen_reader_user: Option<bool>,
    pub preferred_tts_speed: Option<f32>,
    pub preferred_font_size: Option<FontSize>,
    pub high_contrast_mode: Option<bool>,
    pub dark_mode_enabled: Option<bool>,
    pub haptic_feedback_enabled: Option<bool>,
    pub audio_descriptions_enabled: Option<bool>,
    pub voice_commands_enabled: Option<bool>,
    pub gesture_navigation_enabled: Option<bool>,
    pub extended_timeout_needed: Option<bool>,
    pub slow_animations: Option<bool>,
    pub custom_notification_sounds: Option<bool>,
    pub audio_confirmation_enabled: Option<bool>,
    pub skip_repetitive_content: Option<bool>,
    pub landmark_navigation_preferred: Option<bool>,
}

macro_rules! apply_preferences {
    ($prefs:expr, $update:expr, $changed:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $update.$field {
                if $prefs.$field != value {
                    $prefs.$field = value;
                    $changed.push(stringify!($field));
                }
            }
        )*
    };
}

impl AccessibilityPreferencesUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to `prefs` and return the names of the preferences that changed
    fn apply_to(&self, prefs: &mut AccessibilityPreferences) -> Vec<&'static str> {
        let mut changed = Vec::new();
        apply_preferences!(prefs, self, changed, [
            visual_impairment_level,
            screen_reader_user,
            preferred_tts_speed,
            preferred_font_size,
            high_contrast_mode,
            dark_mode_enabled,
            haptic_feedback_enabled,
            audio_descriptions_enabled,
            voice_commands_enabled,
            gesture_navigation_enabled,
            extended_timeout_needed,
            slow_animations,
            custom_notification_sounds,
            audio_confirmation_enabled,
            skip_repetitive_content,
            landmark_navigation_preferred,
        ]);
        changed
    }
}

/// Trim, check letters and title-case a first or last name
fn normalize_name(field: &'static str, name: &str) -> Result<String, ProfileError> {
    let name = name.trim();
    let length = name.chars().count();

    if length < 2 {
        return Err(ProfileError::InvalidField { field, message: "must be at least 2 characters".to_string() });
    }
    if length > 50 {
        return Err(ProfileError::InvalidField { field, message: "cannot exceed 50 characters".to_string() });
    }
    if !name.chars().all(|c| c.is_alphabetic() || c.is_whitespace() || matches!(c, '-' | '.' | '\'')) {
        return Err(ProfileError::InvalidField {
            field,
            message: "use only letters, spaces, hyphens and apostrophes".to_string(),
        });
    }

    Ok(name
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" "))
}

/// Strip formatting from a phone number; an empty input clears it
fn normalize_phone(phone: &str) -> Result<Option<String>, ProfileError> {
    if phone.trim().is_empty() {
        return Ok(None);
    }

    let separators = Regex::new(r"[^\d+]").map_err(|e| ProfileError::InvalidField {
        field: "phone",
        message: e.to_string(),
    })?;
    let clean = separators.replace_all(phone.trim(), "").to_string();

    if clean.len() < 7 {
        return Err(ProfileError::InvalidField { field: "phone", message: "number is too short".to_string() });
    }
    if clean.len() > 15 {
        return Err(ProfileError::InvalidField { field: "phone", message: "number is too long".to_string() });
    }

    // Ten local digits without a country code are Colombian mobile numbers
    if !clean.starts_with('+') && clean.len() == 10 {
        return Ok(Some(format!("+57{}", clean)));
    }
    Ok(Some(clean))
}

/// Profile, preferences and account lifecycle for a signed-in user
pub struct ProfileService {
    store: Arc<dyn CredentialStore>,
    auth: Arc<Authenticator>,
    audit: Arc<AuditLogger>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn CredentialStore>, auth: Arc<Authenticator>, audit: Arc<AuditLogger>) -> Self {
        Self { store, auth, audit }
    }

    fn load(&self, user_id: &str) -> Result<User, ProfileError> {
        self.store.find_by_id(user_id)?.ok_or(ProfileError::UserNotFound)
    }

    /// Get the user without credentials or security state
    pub fn get_profile(&self, user_id: &str) -> Result<PublicUser, ProfileError> {
        debug!("Getting user profile for ID: {}", user_id);
        Ok(self.load(user_id)?.public_view())
    }

    /// Update profile fields
    pub fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<PublicUser, ProfileError> {
        let mut user = self.load(user_id)?;
        let mut profile = user.profile.clone();

        if let Some(first_name) = update.first_name.as_deref() {
            profile.first_name = Some(normalize_name("first name", first_name)?);
        }
        if let Some(last_name) = update.last_name.as_deref() {
            profile.last_name = Some(normalize_name("last name", last_name)?);
        }
        if let Some(phone) = update.phone.as_deref() {
            profile.phone = normalize_phone(phone)?;
        }
        if let Some(language) = update.preferred_language {
            profile.preferred_language = language;
        }
        if let Some(timezone) = update.timezone.filter(|t| !t.trim().is_empty()) {
            profile.timezone = timezone.trim().to_string();
        }

        if profile == user.profile {
            return Err(ProfileError::NothingToUpdate);
        }

        if !self.store.update_fields(user_id, &[UserField::Profile(profile.clone())])? {
            return Err(ProfileError::UserNotFound);
        }
        self.audit.record(AuditEventType::ProfileUpdated, Some(user_id), None);
        info!("Profile updated for user {}", user_id);

        user.profile = profile;
        Ok(user.public_view())
    }

    /// Apply a partial update to the accessibility preferences
    pub fn update_accessibility_preferences(
        &self,
        user_id: &str,
        update: AccessibilityPreferencesUpdate,
    ) -> Result<AccessibilityPreferences, ProfileError> {
        if update.is_empty() {
            return Err(ProfileError::NothingToUpdate);
        }
        if let Some(speed) = update.preferred_tts_speed {
            if !(MIN_TTS_SPEED..=MAX_TTS_SPEED).contains(&speed) {
                return Err(ProfileError::InvalidField {
                    field: "preferred_tts_speed",
                    message: format!("must be between {} and {}", MIN_TTS_SPEED, MAX_TTS_SPEED),
                });
            }
        }

        let user = self.load(user_id)?;
        let mut prefs = user.accessibility;
        let changed = update.apply_to(&mut prefs);

        if changed.is_empty() {
            return Ok(prefs);
        }

        if !self.store.update_fields(user_id, &[UserField::Accessibility(prefs.clone())])? {
            return Err(ProfileError::UserNotFound);
        }
        self.audit.record(AuditEventType::PreferencesUpdated, Some(user_id), Some(&changed.join(",")));
        info!("Accessibility preferences updated for user {}: {}", user_id, changed.join(", "));

        Ok(prefs)
    }

    /// Delete the account after the user types the confirmation phrase and their password
    pub fn delete_account(&self, user_id: &str, confirmation: &str, password: &str) -> Result<(), ProfileError> {
        if confirmation.trim() != DELETE_CONFIRMATION {
            return Err(ProfileError::ConfirmationRequired);
        }

        let user = self.load(user_id)?;
        match self.auth.confirm_password(&user, password)? {
            PasswordCheck::Confirmed => {}
            PasswordCheck::Incorrect => {
                warn!("Account deletion refused for user {}: wrong password", user_id);
                return Err(ProfileError::IncorrectPassword);
            }
            PasswordCheck::Locked { until } => return Err(ProfileError::Locked { until }),
        }

        if !self.store.delete(user_id)? {
            return Err(ProfileError::UserNotFound);
        }
        self.audit.record(AuditEventType::AccountDeleted, Some(user_id), None);
        info!("Account deleted: {}", user_id);
        Ok(())
    }

    /// Recent account activity, newest first
    pub fn activity(&self, user_id: &str, limit: usize) -> Result<Vec<AuditLog>, ProfileError> {
        Ok(self.audit.user_activity(user_id, limit)?)
    }
}
