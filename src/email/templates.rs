/// Rendered message ready for dispatch
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Digits separated by spaces so screen readers announce them one at a time
pub fn spaced_code(code: &str) -> String {
    code.chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Email carrying a 6-digit verification code
pub fn verification_code_email(
    name: &str,
    code: &str,
    expires_minutes: i64,
    max_attempts: u32,
) -> EmailContent {
    let spoken = spaced_code(code);

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Your verification code</title></head>
<body>
  <main role="main">
    <h1>Verify your email</h1>
    <p>Hello {name},</p>
    <p>Use this code to verify your account:</p>
    <p role="text" aria-label="Verification code: {spoken}" style="font-size:32px;letter-spacing:8px;font-weight:bold;">{code}</p>
    <p>The code is valid for {expires_minutes} minutes and allows {max_attempts} attempts.</p>
    <p>If you did not create an account you can ignore this message.</p>
  </main>
</body>
</html>"#,
    );

    let text = format!(
        "Hello {name},\n\n\
         Your verification code is: {code}\n\
         Digit by digit: {spoken}\n\n\
         The code is valid for {expires_minutes} minutes and allows {max_attempts} attempts.\n\n\
         If you did not create an account you can ignore this message.\n",
    );

    EmailContent {
        subject: format!("Your verification code: {}", code),
        html,
        text,
    }
}

/// Email with a single-use password reset link
pub fn password_reset_email(name: &str, reset_link: &str, expires_minutes: i64) -> EmailContent {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Reset your password</title></head>
<body>
  <main role="main">
    <h1>Reset your password</h1>
    <p>Hello {name},</p>
    <p>We received a request to reset your password.</p>
    <p><a href="{reset_link}" aria-label="Reset your password">Choose a new password</a></p>
    <p>This link expires in {expires_minutes} minutes and can be used once.</p>
    <p>If you did not ask for this, no action is needed.</p>
  </main>
</body>
</html>"#,
    );

    let text = format!(
        "Hello {name},\n\n\
         We received a request to reset your password.\n\
         Open this link to choose a new one:\n{reset_link}\n\n\
         This link expires in {expires_minutes} minutes and can be used once.\n\
         If you did not ask for this, no action is needed.\n",
    );

    EmailContent {
        subject: "Reset your password".to_string(),
        html,
        text,
    }
}
