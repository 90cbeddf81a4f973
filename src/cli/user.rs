use anyhow::{anyhow, Context as _, Result};
use chrono::Utc;

use crate::app::App;
use crate::cli::utils::{
    confirm, print_error, print_field, print_header, print_info, print_success, read_line, read_password, yes_no,
};
use crate::cli::{current_user, throttle, Context};
use crate::database::models::AccessibilityPreferences;
use crate::security::rate_limit::Endpoint;
use crate::user::{AccessibilityPreferencesUpdate, ProfileError, ProfileUpdate};

/// Show the signed-in user's profile
pub fn show_profile(app: &App, ctx: &Context) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::ApiGeneral, Some(&user))?;

    let profile = app.profiles.get_profile(&user.id).context("Failed to load profile")?;

    print_header("Profile");
    print_field("Email", Some(&profile.email));
    print_field("First name", profile.profile.first_name.as_deref());
    print_field("Last name", profile.profile.last_name.as_deref());
    print_field("Phone", profile.profile.phone.as_deref());
    print_field("Language", Some(profile.profile.preferred_language.as_str()));
    print_field("Time zone", Some(&profile.profile.timezone));
    print_field("Email verified", Some(yes_no(profile.is_verified)));
    if let Some(skipped) = profile.verification_skipped_at.filter(|_| !profile.is_verified) {
        print_field("Verification skipped", Some(&skipped.format("%Y-%m-%d %H:%M UTC").to_string()));
    }
    print_field("Member since", Some(&profile.created_at.format("%Y-%m-%d").to_string()));
    Ok(())
}

/// Update profile fields
pub fn update_profile(app: &App, ctx: &Context, update: ProfileUpdate) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::ApiGeneral, Some(&user))?;

    match app.profiles.update_profile(&user.id, update) {
        Ok(_) => {
            print_success("Profile updated.");
            Ok(())
        }
        Err(e @ (ProfileError::InvalidField { .. } | ProfileError::NothingToUpdate)) => {
            print_error(&e.to_string());
            Err(anyhow!("Profile not updated"))
        }
        Err(e) => Err(anyhow!(e).context("Failed to update profile")),
    }
}

fn print_preferences(prefs: &AccessibilityPreferences) {
    print_header("Accessibility preferences");
    print_field("Visual impairment", Some(prefs.visual_impairment_level.as_str()));
    print_field("Screen reader", Some(yes_no(prefs.screen_reader_user)));
    print_field("Speech rate", Some(&format!("{:.1}", prefs.preferred_tts_speed)));
    print_field("Font size", Some(prefs.preferred_font_size.as_str()));
    print_field("High contrast", Some(yes_no(prefs.high_contrast_mode)));
    print_field("Dark mode", Some(yes_no(prefs.dark_mode_enabled)));
    print_field("Haptic feedback", Some(yes_no(prefs.haptic_feedback_enabled)));
    print_field("Audio descriptions", Some(yes_no(prefs.audio_descriptions_enabled)));
    print_field("Voice commands", Some(yes_no(prefs.voice_commands_enabled)));
    print_field("Gesture navigation", Some(yes_no(prefs.gesture_navigation_enabled)));
    print_field("Extended timeouts", Some(yes_no(prefs.extended_timeout_needed)));
    print_field("Slow animations", Some(yes_no(prefs.slow_animations)));
    print_field("Notification sounds", Some(yes_no(prefs.custom_notification_sounds)));
    print_field("Audio confirmation", Some(yes_no(prefs.audio_confirmation_enabled)));
    print_field("Skip repetitive content", Some(yes_no(prefs.skip_repetitive_content)));
    print_field("Landmark navigation", Some(yes_no(prefs.landmark_navigation_preferred)));
}

/// Show accessibility preferences
pub fn show_preferences(app: &App, ctx: &Context) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::ApiGeneral, Some(&user))?;

    print_preferences(&user.accessibility);
    Ok(())
}

/// Change accessibility preferences
pub fn set_preferences(app: &App, ctx: &Context, update: AccessibilityPreferencesUpdate) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::AccessibilityUpdate, Some(&user))?;

    match app.profiles.update_accessibility_preferences(&user.id, update) {
        Ok(prefs) => {
            print_success("Accessibility preferences saved.");
            print_preferences(&prefs);
            Ok(())
        }
        Err(e @ (ProfileError::InvalidField { .. } | ProfileError::NothingToUpdate)) => {
            print_error(&e.to_string());
            Err(anyhow!("Preferences not updated"))
        }
        Err(e) => Err(anyhow!(e).context("Failed to update preferences")),
    }
}

/// List recent account activity
pub fn activity(app: &App, ctx: &Context, limit: usize) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::ApiGeneral, Some(&user))?;

    let events = app.profiles.activity(&user.id, limit).context("Failed to load activity")?;

    print_header("Recent activity");
    if events.is_empty() {
        print_info("No activity recorded yet.");
        return Ok(());
    }
    print_info(&format!("{} events, newest first.", events.len()));
    for event in events {
        println!(
            "{}  {}{}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.details.map(|d| format!(" ({})", d)).unwrap_or_default()
        );
    }
    Ok(())
}

/// Delete the signed-in user's account
pub fn delete_account(app: &App, ctx: &Context) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::ApiGeneral, Some(&user))?;

    print_header("Delete account");
    print_info("This permanently removes your account and cannot be undone.");
    if !confirm("Do you want to continue?")? {
        print_info("Account deletion cancelled.");
        return Ok(());
    }

    let confirmation = read_line("Type DELETE_MY_ACCOUNT to confirm: ")?;
    let password = read_password("Current password: ")?;

    match app.profiles.delete_account(&user.id, &confirmation, &password) {
        Ok(()) => {
            ctx.session.clear()?;
            print_success("Your account has been deleted. We are sorry to see you go.");
            Ok(())
        }
        Err(e @ (ProfileError::ConfirmationRequired | ProfileError::IncorrectPassword)) => {
            print_error(&e.to_string());
            Err(anyhow!("Account not deleted"))
        }
        Err(ProfileError::Locked { until }) => {
            let minutes = (until - Utc::now()).num_minutes().max(0) + 1;
            print_error(&format!("Account locked after too many failed attempts. Try again in {} minutes.", minutes));
            print_info("You can also reset your password with forgot-password to unlock the account.");
            Err(anyhow!("Account not deleted"))
        }
        Err(e) => Err(anyhow!(e).context("Failed to delete account")),
    }
}
