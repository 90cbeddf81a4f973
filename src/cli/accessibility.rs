use anyhow::{anyhow, Result};

use crate::accessibility::{self, AccessibilityError, CommandCategory, DeviceCapabilities, UsageReport};
use crate::app::App;
use crate::cli::utils::{print_error, print_field, print_header, print_info, print_success};
use crate::cli::{current_user, throttle, Context};
use crate::database::models::VisualImpairmentLevel;
use crate::security::rate_limit::Endpoint;

/// List voice commands; uses the signed-in user's impairment level when none is given
pub fn voice_commands(
    app: &App,
    ctx: &Context,
    level: Option<VisualImpairmentLevel>,
    category: Option<CommandCategory>,
) -> Result<()> {
    let user = ctx.session.load()?.and_then(|_| current_user(app, ctx).ok());
    throttle(app, ctx, Endpoint::ApiGeneral, user.as_ref())?;

    let level = level.or_else(|| user.as_ref().map(|u| u.accessibility.visual_impairment_level));
    let commands = accessibility::voice_commands(level, category);
    if commands.is_empty() {
        print_info("No voice commands match.");
        return Ok(());
    }

    for (category, group) in accessibility::group_by_category(&commands) {
        print_header(&format!("Voice commands: {}", category));
        for cmd in group {
            print_field(cmd.command, Some(cmd.description));
            print_field("  Also", Some(cmd.examples.join(", ")));
        }
    }
    Ok(())
}

/// Record one use of an accessibility feature
pub fn log_usage(app: &App, ctx: &Context, report: UsageReport) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::AccessibilityUpdate, Some(&user))?;

    match app.accessibility.log_usage(&user.id, &report) {
        Ok(()) => {
            print_success("Usage recorded.");
            Ok(())
        }
        Err(e @ AccessibilityError::MissingFeature) => {
            print_error(&e.to_string());
            Err(anyhow!("Usage not recorded"))
        }
    }
}

/// Record device capabilities and show the settings they suggest
pub fn detect_capabilities(app: &App, ctx: &Context, capabilities: DeviceCapabilities) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::AccessibilityUpdate, Some(&user))?;

    let suggestions = app.accessibility.record_capabilities(&user.id, &capabilities);
    if suggestions.is_empty() {
        print_info("No accessibility settings to suggest for this device.");
        return Ok(());
    }

    print_header("Suggested settings");
    for suggestion in suggestions {
        print_info(&suggestion);
    }
    Ok(())
}
