use anyhow::{anyhow, bail, Context as _, Result};
use log::{error, info};

use crate::app::App;
use crate::cli::utils::{print_error, print_info, print_success, print_warning, read_line, read_new_password, read_password};
use crate::cli::{current_user, throttle, Context};
use crate::database::models::{Language, VisualImpairmentLevel};
use crate::security::auth::{LoginOutcome, ResetOutcome};
use crate::security::rate_limit::Endpoint;
use crate::user::{normalize_code, validate_email, validate_password, RegistrationError, RegistrationRequest, SendCodeOutcome};

/// Registration options from the command line
pub struct RegisterArgs<'a> {
    pub email: &'a str,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language: Language,
    pub visual_impairment: VisualImpairmentLevel,
    pub screen_reader: bool,
}

/// Handle user registration
pub fn register(app: &App, ctx: &Context, args: RegisterArgs) -> Result<()> {
    throttle(app, ctx, Endpoint::Register, None)?;

    // Check the address before asking for a password
    let email = match validate_email(args.email) {
        Ok(email) => email,
        Err(e) => {
            print_error(&e.message);
            for suggestion in &e.suggestions {
                print_info(&format!("  {}", suggestion));
            }
            bail!("Registration cancelled");
        }
    };

    let password = loop {
        let password = read_new_password()?;
        match validate_password(&password, Some(&email)) {
            Ok(assessment) => {
                print_info(&format!("Password strength: {}", assessment.strength.as_str()));
                break password;
            }
            Err(e) => print_error(&e.to_string()),
        }
    };

    let request = RegistrationRequest {
        email,
        password,
        first_name: args.first_name,
        last_name: args.last_name,
        preferred_language: args.language,
        visual_impairment_level: args.visual_impairment,
        screen_reader_user: args.screen_reader,
    };

    match app.registrar.register(request) {
        Ok(outcome) => {
            print_success(&outcome.message());
            print_info(&format!(
                "Next step: verify-code --email {}. The code expires in {} minutes.",
                outcome.user.email, app.config.verification.code_ttl_minutes
            ));
            Ok(())
        }
        Err(RegistrationError::EmailExists) => {
            print_error("An account with this email already exists.");
            print_info("Sign in instead, or use forgot-password if you lost access.");
            Err(anyhow!("Registration failed"))
        }
        Err(e) => {
            error!("Registration failed: {}", e);
            Err(anyhow!(e).context("Registration failed"))
        }
    }
}

/// Request a new verification code
pub fn send_code(app: &App, ctx: &Context, email: &str) -> Result<()> {
    throttle(app, ctx, Endpoint::SendVerificationCode, None)?;

    match app.verification.send_code(email).context("Failed to send verification code")? {
        SendCodeOutcome::Accepted => print_success(&format!(
            "If an account exists for {}, a new code is on its way. It expires in {} minutes.",
            email.trim(),
            app.config.verification.code_ttl_minutes
        )),
        SendCodeOutcome::AlreadyVerified => print_info("This email is already verified. You can sign in."),
    }
    Ok(())
}

/// Verify an email address
pub fn verify_code(app: &App, ctx: &Context, email: &str, code: Option<&str>) -> Result<()> {
    throttle(app, ctx, Endpoint::ApiGeneral, None)?;

    let input = match code {
        Some(code) => code.to_string(),
        None => read_line("Verification code (6 digits): ")?,
    };
    // Malformed input is rejected before it can use up an attempt
    let code = normalize_code(&input).map_err(|e| anyhow!("{}", e))?;

    let outcome = app.verification.verify(email, &code).context("Failed to verify code")?;
    if outcome.is_verified() {
        print_success(&outcome.message());
        Ok(())
    } else {
        print_error(&outcome.message());
        Err(anyhow!("Email not verified"))
    }
}

/// Skip email verification for the signed-in user
pub fn skip_verification(app: &App, ctx: &Context) -> Result<()> {
    let user = current_user(app, ctx)?;
    throttle(app, ctx, Endpoint::ApiGeneral, Some(&user))?;

    if user.is_verified {
        print_info("Your email is already verified.");
        return Ok(());
    }

    app.verification
        .skip_verification(&user.id)
        .context("Failed to skip verification")?;
    print_success("Verification skipped. You can verify your email later with send-code.");
    Ok(())
}

/// Handle user login
pub fn login(app: &App, ctx: &Context, email: &str) -> Result<()> {
    throttle(app, ctx, Endpoint::Login, None)?;

    let password = read_password("Password: ")?;

    match app.auth.authenticate(email, &password).context("Login failed")? {
        LoginOutcome::Authenticated(user) => {
            let tokens = app.tokens.issue_token_pair(&user).context("Failed to issue tokens")?;
            ctx.session.save(&tokens)?;

            match user.profile.first_name.as_deref() {
                Some(name) => print_success(&format!("Welcome back, {}.", name)),
                None => print_success("Welcome back."),
            }
            print_info(&format!("Session valid for {} minutes.", tokens.expires_in / 60));
            if !user.is_verified && user.security.verification_skipped_at.is_none() {
                print_warning("Your email is not verified yet. Use verify-code or skip-verification.");
            }
            info!("User {} signed in from the CLI", user.id);
            Ok(())
        }
        outcome @ LoginOutcome::InvalidCredentials => {
            print_error(&outcome.message());
            print_info("Check your email and password, or use forgot-password.");
            Err(anyhow!("Login failed"))
        }
        outcome @ LoginOutcome::Locked { .. } => {
            print_error(&outcome.message());
            print_info("You can also reset your password with forgot-password to unlock the account.");
            Err(anyhow!("Login failed"))
        }
    }
}

/// Renew the session tokens
pub fn refresh(app: &App, ctx: &Context) -> Result<()> {
    let Some(tokens) = ctx.session.load()? else {
        bail!("You are not signed in.");
    };

    match app.tokens.refresh(&tokens.refresh_token).context("Failed to refresh session")? {
        Some(renewed) => {
            ctx.session.save(&renewed)?;
            print_success(&format!("Session renewed for {} minutes.", renewed.expires_in / 60));
            Ok(())
        }
        None => {
            ctx.session.clear()?;
            Err(anyhow!("Your session has expired. Please sign in again."))
        }
    }
}

/// Forget the stored tokens
pub fn logout(ctx: &Context) -> Result<()> {
    ctx.session.clear()?;
    print_success("Signed out.");
    Ok(())
}

/// Request a password reset email
pub fn forgot_password(app: &App, ctx: &Context, email: &str) -> Result<()> {
    throttle(app, ctx, Endpoint::PasswordReset, None)?;

    app.auth
        .request_password_reset(email)
        .context("Failed to request password reset")?;
    print_success("If an account exists for this email, a reset link has been sent.");
    Ok(())
}

/// Set a new password with a reset token
pub fn reset_password(app: &App, ctx: &Context, token: &str) -> Result<()> {
    throttle(app, ctx, Endpoint::PasswordReset, None)?;

    let password = read_new_password()?;
    match app.auth.reset_password(token, &password).context("Failed to reset password")? {
        ResetOutcome::Reset => {
            ctx.session.clear()?;
            print_success("Password updated. You can now sign in with your new password.");
            Ok(())
        }
        ResetOutcome::InvalidToken => {
            print_error("This reset link is invalid or has expired. Request a new one.");
            Err(anyhow!("Password reset failed"))
        }
        ResetOutcome::WeakPassword(reason) => {
            print_error(&reason);
            Err(anyhow!("Password reset failed"))
        }
    }
}
