// Command line interface
// Command definitions, the per-invocation context and dispatch to the handlers.

pub mod accessibility;
pub mod auth;
pub mod session;
pub mod shell;
pub mod user;
pub mod utils;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};
use log::debug;

use crate::accessibility::{AccessibilityEventType, CommandCategory, DeviceCapabilities, ScreenSize, UsageReport};
use crate::app::App;
use crate::database::models::{FontSize, Language, User, VisualImpairmentLevel};
use crate::security::rate_limit::Endpoint;
use session::SessionFile;

/// Commands available on the command line and in the interactive shell
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a new account
    Register {
        /// Email address
        #[clap(short, long)]
        email: String,

        #[clap(long)]
        first_name: Option<String>,

        #[clap(long)]
        last_name: Option<String>,

        /// Interface language (es or en)
        #[clap(long, default_value = "es", value_parser = Language::from_str)]
        language: Language,

        /// Visual impairment level (blind, low_vision or none)
        #[clap(long, default_value = "none", value_parser = VisualImpairmentLevel::from_str)]
        visual_impairment: VisualImpairmentLevel,

        /// Uses a screen reader
        #[clap(long)]
        screen_reader: bool,
    },

    /// Send a new email verification code
    SendCode {
        #[clap(short, long)]
        email: String,
    },

    /// Verify an email address with the 6-digit code
    VerifyCode {
        #[clap(short, long)]
        email: String,

        /// Code from the email; prompted for when omitted
        #[clap(short, long)]
        code: Option<String>,
    },

    /// Continue without verifying the email for now
    SkipVerification,

    /// Sign in
    Login {
        #[clap(short, long)]
        email: String,
    },

    /// Exchange the refresh token for new tokens
    Refresh,

    /// Sign out on this machine
    Logout,

    /// Request a password reset link
    ForgotPassword {
        #[clap(short, long)]
        email: String,
    },

    /// Choose a new password with a reset token
    ResetPassword {
        /// Token from the reset link
        #[clap(short, long)]
        token: String,
    },

    /// Show or update the profile
    Profile {
        #[clap(subcommand)]
        command: Option<ProfileCommands>,
    },

    /// Show or change accessibility preferences
    Preferences {
        #[clap(subcommand)]
        command: PreferenceCommands,
    },

    /// Recent account activity
    Activity {
        /// Maximum number of events to show
        #[clap(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Permanently delete the account
    DeleteAccount,

    /// List the supported voice commands
    VoiceCommands {
        /// Only commands for this impairment level (blind, low_vision or none)
        #[clap(long, value_parser = VisualImpairmentLevel::from_str)]
        level: Option<VisualImpairmentLevel>,

        /// navigation, reading, visual or interaction
        #[clap(long, value_parser = CommandCategory::from_str)]
        category: Option<CommandCategory>,
    },

    /// Report accessibility feature usage
    Accessibility {
        #[clap(subcommand)]
        command: AccessibilityCommands,
    },

    /// Interactive shell
    Shell,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileCommands {
    /// Show the profile
    Show,

    /// Update profile fields
    Update {
        #[clap(long)]
        first_name: Option<String>,

        #[clap(long)]
        last_name: Option<String>,

        /// Phone number; pass an empty string to remove it
        #[clap(long)]
        phone: Option<String>,

        #[clap(long, value_parser = Language::from_str)]
        language: Option<Language>,

        #[clap(long)]
        timezone: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum PreferenceCommands {
    /// Show accessibility preferences
    Show,

    /// Change one or more preferences
    Set(PreferenceArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct PreferenceArgs {
    #[clap(long, value_parser = VisualImpairmentLevel::from_str)]
    pub visual_impairment: Option<VisualImpairmentLevel>,

    #[clap(long)]
    pub screen_reader: Option<bool>,

    /// Text-to-speech rate between 0.5 and 2.0
    #[clap(long)]
    pub tts_speed: Option<f32>,

    /// small, medium, large or x-large
    #[clap(long, value_parser = FontSize::from_str)]
    pub font_size: Option<FontSize>,

    #[clap(long)]
    pub high_contrast: Option<bool>,

    #[clap(long)]
    pub dark_mode: Option<bool>,

    #[clap(long)]
    pub haptic_feedback: Option<bool>,

    #[clap(long)]
    pub audio_descriptions: Option<bool>,

    #[clap(long)]
    pub voice_commands: Option<bool>,

    #[clap(long)]
    pub gesture_navigation: Option<bool>,

    #[clap(long)]
    pub extended_timeout: Option<bool>,

    #[clap(long)]
    pub slow_animations: Option<bool>,

    #[clap(long)]
    pub notification_sounds: Option<bool>,

    #[clap(long)]
    pub audio_confirmation: Option<bool>,

    #[clap(long)]
    pub skip_repetitive_content: Option<bool>,

    #[clap(long)]
    pub landmark_navigation: Option<bool>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccessibilityCommands {
    /// Record one use of an accessibility feature
    LogUsage {
        /// preference_changed, error_encountered, feature_used, tts_used,
        /// voice_command_used or navigation_error
        #[clap(long, value_parser = AccessibilityEventType::from_str)]
        event_type: AccessibilityEventType,

        #[clap(long)]
        feature: String,

        #[clap(long)]
        details: Option<String>,

        /// The feature did not work as expected
        #[clap(long)]
        failed: bool,
    },

    /// Record what this device supports and suggest settings
    DetectCapabilities {
        #[clap(long)]
        screen_reader: bool,

        #[clap(long)]
        haptic: bool,

        #[clap(long)]
        voice_input: bool,

        #[clap(long)]
        tts: bool,

        /// small, medium or large
        #[clap(long, value_parser = ScreenSize::from_str)]
        screen_size: Option<ScreenSize>,
    },
}

/// Per-invocation state shared by the handlers
pub struct Context {
    /// Client address used for anonymous rate limiting
    pub ip: String,
    pub session: SessionFile,
}

impl Context {
    pub fn new(app: &App, ip: &str) -> Self {
        app.audit.set_client_address(ip);
        Self {
            ip: ip.to_string(),
            session: SessionFile::beside(&app.config.database.path),
        }
    }
}

/// Count the request against its quota and refuse it when the quota is spent
pub fn throttle(app: &App, ctx: &Context, endpoint: Endpoint, user: Option<&User>) -> Result<()> {
    let decision = app.throttle(endpoint, &ctx.ip, user);
    if decision.allowed {
        debug!("{} requests left for {}", decision.remaining, endpoint.as_str());
        return Ok(());
    }

    let seconds = decision.retry_after_seconds.unwrap_or(0);
    Err(anyhow!(
        "Too many requests. Try again in {} seconds (limit {}).",
        seconds,
        decision.limit
    ))
}

/// The signed-in user, refreshing the session once when the access token has expired
pub fn current_user(app: &App, ctx: &Context) -> Result<User> {
    let Some(tokens) = ctx.session.load()? else {
        bail!("You are not signed in. Use the login command first.");
    };

    if let Some(user) = app.tokens.current_user(&tokens.access_token)? {
        return Ok(user);
    }

    debug!("Access token rejected; trying the refresh token");
    let Some(renewed) = app.tokens.refresh(&tokens.refresh_token)? else {
        ctx.session.clear()?;
        bail!("Your session has expired. Please sign in again.");
    };
    ctx.session.save(&renewed)?;

    app.tokens
        .current_user(&renewed.access_token)?
        .ok_or_else(|| anyhow!("Your session has expired. Please sign in again."))
}

/// Run one command
pub fn execute(app: &App, ctx: &Context, command: &Commands) -> Result<()> {
    match command {
        Commands::Register {
            email,
            first_name,
            last_name,
            language,
            visual_impairment,
            screen_reader,
        } => auth::register(app, ctx, auth::RegisterArgs {
            email,
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            language: *language,
            visual_impairment: *visual_impairment,
            screen_reader: *screen_reader,
        }),
        Commands::SendCode { email } => auth::send_code(app, ctx, email),
        Commands::VerifyCode { email, code } => auth::verify_code(app, ctx, email, code.as_deref()),
        Commands::SkipVerification => auth::skip_verification(app, ctx),
        Commands::Login { email } => auth::login(app, ctx, email),
        Commands::Refresh => auth::refresh(app, ctx),
        Commands::Logout => auth::logout(ctx),
        Commands::ForgotPassword { email } => auth::forgot_password(app, ctx, email),
        Commands::ResetPassword { token } => auth::reset_password(app, ctx, token),
        Commands::Profile { command } => match command {
            None | Some(ProfileCommands::Show) => user::show_profile(app, ctx),
            Some(ProfileCommands::Update { first_name, last_name, phone, language, timezone }) => {
                user::update_profile(app, ctx, crate::user::ProfileUpdate {
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    phone: phone.clone(),
                    preferred_language: *language,
                    timezone: timezone.clone(),
                })
            }
        },
        Commands::Preferences { command } => match command {
            PreferenceCommands::Show => user::show_preferences(app, ctx),
            PreferenceCommands::Set(args) => user::set_preferences(app, ctx, args.clone().into()),
        },
        Commands::Activity { limit } => user::activity(app, ctx, *limit),
        Commands::DeleteAccount => user::delete_account(app, ctx),
        Commands::VoiceCommands { level, category } => accessibility::voice_commands(app, ctx, *level, *category),
        Commands::Accessibility { command } => match command {
            AccessibilityCommands::LogUsage { event_type, feature, details, failed } => {
                accessibility::log_usage(app, ctx, UsageReport {
                    event_type: *event_type,
                    feature: feature.clone(),
                    details: details.clone(),
                    success: !*failed,
                })
            }
            AccessibilityCommands::DetectCapabilities { screen_reader, haptic, voice_input, tts, screen_size } => {
                accessibility::detect_capabilities(app, ctx, DeviceCapabilities {
                    has_screen_reader: *screen_reader,
                    supports_haptic: *haptic,
                    supports_voice_input: *voice_input,
                    supports_tts: *tts,
                    screen_size: *screen_size,
                })
            }
        },
        Commands::Shell => shell::run(app, ctx),
    }
}

impl From<PreferenceArgs> for crate::user::AccessibilityPreferencesUpdate {
    fn from(args: PreferenceArgs) -> Self {
        Self {
            visual_impairment_level: args.visual_impairment,
            screen_reader_user: args.screen_reader,
            preferred_tts_speed: args.tts_speed,
            preferred_font_size: args.font_size,
            high_contrast_mode: args.high_contrast,
            dark_mode_enabled: args.dark_mode,
            haptic_feedback_enabled: args.haptic_feedback,
            audio_descriptions_enabled: args.audio_descriptions,
            voice_commands_enabled: args.voice_commands,
            gesture_navigation_enabled: args.gesture_navigation,
            extended_timeout_needed: args.extended_timeout,
            slow_animations: args.slow_animations,
            custom_notification_sounds: args.notification_sounds,
            audio_confirmation_enabled: args.audio_confirmation,
            skip_repetitive_content: args.skip_repetitive_content,
            landmark_navigation_preferred: args.landmark_navigation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[clap(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_parse_register() {
        let cli = TestCli::try_parse_from([
            "test", "register", "--email", "ana@example.com", "--visual-impairment", "low_vision", "--screen-reader",
        ])
        .unwrap();

        match cli.command {
            Commands::Register { email, visual_impairment, screen_reader, language, .. } => {
                assert_eq!(email, "ana@example.com");
                assert_eq!(visual_impairment, VisualImpairmentLevel::LowVision);
                assert!(screen_reader);
                assert_eq!(language, Language::Es);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_preferences_set() {
        let cli = TestCli::try_parse_from([
            "test", "preferences", "set", "--high-contrast", "true", "--font-size", "x-large", "--tts-speed", "1.5",
        ])
        .unwrap();

        let Commands::Preferences { command: PreferenceCommands::Set(args) } = cli.command else {
            panic!("expected preferences set");
        };
        let update: crate::user::AccessibilityPreferencesUpdate = args.into();
        assert_eq!(update.high_contrast_mode, Some(true));
        assert_eq!(update.preferred_font_size, Some(FontSize::XLarge));
        assert_eq!(update.preferred_tts_speed, Some(1.5));
        assert_eq!(update.dark_mode_enabled, None);
    }

    #[test]
    fn test_parse_voice_commands_filters() {
        let cli = TestCli::try_parse_from(["test", "voice-commands", "--level", "blind", "--category", "reading"]).unwrap();

        match cli.command {
            Commands::VoiceCommands { level, category } => {
                assert_eq!(level, Some(VisualImpairmentLevel::Blind));
                assert_eq!(category, Some(CommandCategory::Reading));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(TestCli::try_parse_from(["test", "voice-commands", "--category", "games"]).is_err());
    }

    #[test]
    fn test_parse_accessibility_log_usage() {
        let cli = TestCli::try_parse_from([
            "test", "accessibility", "log-usage", "--event-type", "tts_used", "--feature", "screen_reading", "--failed",
        ])
        .unwrap();

        let Commands::Accessibility { command: AccessibilityCommands::LogUsage { event_type, feature, details, failed } } =
            cli.command
        else {
            panic!("expected accessibility log-usage");
        };
        assert_eq!(event_type, AccessibilityEventType::TtsUsed);
        assert_eq!(feature, "screen_reading");
        assert_eq!(details, None);
        assert!(failed);
    }

    #[test]
    fn test_parse_detect_capabilities() {
        let cli = TestCli::try_parse_from([
            "test", "accessibility", "detect-capabilities", "--screen-reader", "--screen-size", "small",
        ])
        .unwrap();

        let Commands::Accessibility {
            command: AccessibilityCommands::DetectCapabilities { screen_reader, haptic, screen_size, .. },
        } = cli.command
        else {
            panic!("expected accessibility detect-capabilities");
        };
        assert!(screen_reader);
        assert!(!haptic);
        assert_eq!(screen_size, Some(ScreenSize::Small));
    }

    #[test]
    fn test_rejects_unknown_impairment_level() {
        assert!(TestCli::try_parse_from(["test", "register", "--email", "a@b.co", "--visual-impairment", "partial"]).is_err());
    }
}
