use accessible_auth::accessibility::{AccessibilityEventType, DeviceCapabilities, ScreenSize, UsageReport};
use accessible_auth::cli::Context;
use accessible_auth::database::models::{AuditEventType, VisualImpairmentLevel};
use accessible_auth::security::auth::LoginOutcome;
use accessible_auth::security::jwt::TokenType;
use accessible_auth::security::rate_limit::Endpoint;
use accessible_auth::user::{
    normalize_code, AccessibilityPreferencesUpdate, RegistrationError, RegistrationRequest, VerificationOutcome,
};
use accessible_auth::{App, Config};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const PASSWORD: &str = "Acc3ss#ible";

fn test_app() -> (TempDir, App) {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("accounts.db").to_str().unwrap().to_string();
    config.email.outbox_dir = dir.path().join("outbox").to_str().unwrap().to_string();
    config.security.argon2_memory_kib = 1024;
    config.security.argon2_iterations = 1;
    config.security.jwt_secret = "integration-secret".to_string();

    let app = App::build(config).unwrap();
    (dir, app)
}

/// Code from the most recent verification email in the outbox
fn code_from_outbox(outbox: &Path) -> String {
    let mut messages: Vec<_> = fs::read_dir(outbox)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    messages.sort();
    let contents = fs::read_to_string(messages.last().unwrap()).unwrap();

    let line = contents
        .lines()
        .find(|line| line.starts_with("Your verification code is:"))
        .unwrap();
    line.rsplit(' ').next().unwrap().to_string()
}

#[test]
fn test_register_verify_login_and_manage_account() {
    // Arrange
    let (dir, app) = test_app();
    let mut request = RegistrationRequest::new("Laura@Example.com", PASSWORD);
    request.first_name = Some("Laura".to_string());
    request.visual_impairment_level = VisualImpairmentLevel::Blind;
    request.screen_reader_user = true;

    // Register
    let registered = app.registrar.register(request).unwrap();
    assert!(registered.email_sent);
    assert_eq!(registered.user.email, "laura@example.com");

    // Verify with the emailed code, typed with spaces
    let code = code_from_outbox(&dir.path().join("outbox"));
    let spaced: String = code.chars().flat_map(|c| [c, ' ']).collect();
    let normalized = normalize_code(&spaced).unwrap();
    assert_eq!(
        app.verification.verify("laura@example.com", &normalized).unwrap(),
        VerificationOutcome::Verified
    );

    // Login
    let user = match app.auth.authenticate("laura@example.com", PASSWORD).unwrap() {
        LoginOutcome::Authenticated(user) => user,
        other => panic!("expected login to succeed, got {:?}", other),
    };
    assert!(user.is_verified);

    // Tokens
    let pair = app.tokens.issue_token_pair(&user).unwrap();
    let claims = app.tokens.verify_token(&pair.access_token, TokenType::Access).unwrap().unwrap();
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.accessibility_level, "blind");
    let renewed = app.tokens.refresh(&pair.refresh_token).unwrap().unwrap();
    assert!(app.tokens.current_user(&renewed.access_token).unwrap().is_some());

    // Blind users get the larger login quota
    let decision = app.throttle(Endpoint::Login, "192.0.2.10", Some(&user));
    assert!(decision.accessibility_bonus);
    assert_eq!(decision.limit, 15);

    // Preferences
    let prefs = app
        .profiles
        .update_accessibility_preferences(&user.id, AccessibilityPreferencesUpdate {
            preferred_tts_speed: Some(0.8),
            dark_mode_enabled: Some(true),
            ..AccessibilityPreferencesUpdate::default()
        })
        .unwrap();
    assert_eq!(prefs.preferred_tts_speed, 0.8);
    assert!(prefs.screen_reader_user);

    // Activity trail
    let events: Vec<_> = app
        .profiles
        .activity(&user.id, 50)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    for expected in [
        AuditEventType::UserRegistered,
        AuditEventType::VerificationCodeSent,
        AuditEventType::EmailVerified,
        AuditEventType::UserLogin,
        AuditEventType::PreferencesUpdated,
    ] {
        assert!(events.contains(&expected), "missing {}", expected);
    }

    // Delete; outstanding tokens stop working
    app.profiles.delete_account(&user.id, "DELETE_MY_ACCOUNT", PASSWORD).unwrap();
    assert!(app.tokens.current_user(&renewed.access_token).unwrap().is_none());
    assert!(app.tokens.refresh(&renewed.refresh_token).unwrap().is_none());
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let (_dir, app) = test_app();

    app.registrar.register(RegistrationRequest::new("dup@example.com", PASSWORD)).unwrap();
    let result = app.registrar.register(RegistrationRequest::new(" DUP@example.com", PASSWORD));

    assert!(matches!(result, Err(RegistrationError::EmailExists)));
}

#[test]
fn test_unverified_user_can_skip_verification() {
    let (_dir, app) = test_app();
    let registered = app.registrar.register(RegistrationRequest::new("later@example.com", PASSWORD)).unwrap();

    app.verification.skip_verification(&registered.user.id).unwrap();

    let profile = app.profiles.get_profile(&registered.user.id).unwrap();
    assert!(!profile.is_verified);
    assert!(profile.verification_skipped_at.is_some());
}

#[test]
fn test_lockout_survives_correct_password() {
    let (_dir, app) = test_app();
    app.registrar.register(RegistrationRequest::new("guess@example.com", PASSWORD)).unwrap();

    for _ in 0..4 {
        assert!(matches!(
            app.auth.authenticate("guess@example.com", "Wr0ng#Guess").unwrap(),
            LoginOutcome::InvalidCredentials
        ));
    }
    assert!(matches!(
        app.auth.authenticate("guess@example.com", "Wr0ng#Guess").unwrap(),
        LoginOutcome::Locked { .. }
    ));
    assert!(matches!(
        app.auth.authenticate("guess@example.com", PASSWORD).unwrap(),
        LoginOutcome::Locked { .. }
    ));
}

#[test]
fn test_activity_records_client_address() {
    let (_dir, app) = test_app();
    let _ctx = Context::new(&app, "198.51.100.23");

    let registered = app.registrar.register(RegistrationRequest::new("addr@example.com", PASSWORD)).unwrap();

    let activity = app.profiles.activity(&registered.user.id, 10).unwrap();
    assert!(!activity.is_empty());
    assert!(activity.iter().all(|e| e.ip_address.as_deref() == Some("198.51.100.23")));
}

#[test]
fn test_accessibility_usage_lands_in_activity() {
    let (_dir, app) = test_app();
    let registered = app.registrar.register(RegistrationRequest::new("usage@example.com", PASSWORD)).unwrap();
    let user_id = registered.user.id;

    app.accessibility
        .log_usage(&user_id, &UsageReport {
            event_type: AccessibilityEventType::VoiceCommandUsed,
            feature: "activar modo oscuro".to_string(),
            details: None,
            success: false,
        })
        .unwrap();
    let suggestions = app.accessibility.record_capabilities(&user_id, &DeviceCapabilities {
        supports_haptic: true,
        screen_size: Some(ScreenSize::Small),
        ..DeviceCapabilities::default()
    });
    assert_eq!(suggestions.len(), 2);

    let usage: Vec<_> = app
        .profiles
        .activity(&user_id, 50)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == AuditEventType::AccessibilityUsage)
        .collect();
    assert_eq!(usage.len(), 2);
    let details: Vec<String> = usage.iter().filter_map(|e| e.details.clone()).collect();
    assert!(details.iter().any(|d| d.contains("\"voice_command_used\"") && d.contains("\"success\":false")));
    assert!(details.iter().any(|d| d.contains("device_capabilities")));
}
