use regex::Regex;
use std::fmt;
use log::debug;

use crate::database::store::normalize_email;
use crate::user::{EMAIL_REGEX, MIN_PASSWORD_LENGTH, SPECIAL_CHARACTERS};

/// Password requirement types for validation
#[derive(Debug, Clone, PartialEq)]
pub enum PasswordRequirement {
    MinimumLength(usize),
    ContainsUppercase,
    ContainsLowercase,
    ContainsNumbers,
    ContainsSpecialChars,
}

impl fmt::Display for PasswordRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordRequirement::MinimumLength(len) => write!(f, "Password must be at least {} characters long", len),
            PasswordRequirement::ContainsUppercase => write!(f, "Password must contain at least one uppercase letter"),
            PasswordRequirement::ContainsLowercase => write!(f, "Password must contain at least one lowercase letter"),
            PasswordRequirement::ContainsNumbers => write!(f, "Password must contain at least one number"),
            PasswordRequirement::ContainsSpecialChars => write!(f, "Password must contain at least one special character ({})", SPECIAL_CHARACTERS),
        }
    }
}

/// Password validation error
#[derive(Debug, thiserror::Error)]
pub enum PasswordValidationError {
    #[error("Password policy requirements not met: {0}")]
    RequirementsNotMet(String),

    #[error("Password is too similar to user information")]
    TooSimilarToUserInfo,
}

/// Coarse strength rating, read out to the user alongside suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PasswordStrength {
    VeryWeak,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl PasswordStrength {
    fn from_score(score: u32) -> Self {
        match score {
            s if s >= 5 => PasswordStrength::VeryStrong,
            4 => PasswordStrength::Strong,
            3 => PasswordStrength::Moderate,
            2 => PasswordStrength::Weak,
            _ => PasswordStrength::VeryWeak,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PasswordStrength::VeryWeak => "very weak",
            PasswordStrength::Weak => "weak",
            PasswordStrength::Moderate => "moderate",
            PasswordStrength::Strong => "strong",
            PasswordStrength::VeryStrong => "very strong",
        }
    }
}

/// Result of checking a candidate password
#[derive(Debug, Clone)]
pub struct PasswordAssessment {
    pub failed: Vec<PasswordRequirement>,
    pub strength: PasswordStrength,
    pub suggestions: Vec<String>,
}

impl PasswordAssessment {
    pub fn is_valid(&self) -> bool {
        self.failed.is_empty()
    }
}

const WEAK_PATTERNS: [(&str, &str); 5] = [
    ("123", "Avoid numeric sequences such as 123"),
    ("abc", "Avoid alphabetic sequences such as abc"),
    ("password", "Avoid the word 'password'"),
    ("qwerty", "Avoid keyboard patterns such as qwerty"),
    ("admin", "Avoid common words such as 'admin'"),
];

/// Score a password and list the requirements it misses
pub fn assess_password(password: &str) -> PasswordAssessment {
    let mut failed = Vec::new();
    let mut suggestions = Vec::new();
    let mut score: u32 = 0;

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        failed.push(PasswordRequirement::MinimumLength(MIN_PASSWORD_LENGTH));
        suggestions.push("Add more characters".to_string());
    } else {
        score += 1;
    }
    if password.chars().count() >= 12 {
        score += 1;
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        failed.push(PasswordRequirement::ContainsUppercase);
        suggestions.push("Add an uppercase letter (A-Z)".to_string());
    } else {
        score += 1;
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        failed.push(PasswordRequirement::ContainsLowercase);
        suggestions.push("Add a lowercase letter (a-z)".to_string());
    } else {
        score += 1;
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        failed.push(PasswordRequirement::ContainsNumbers);
        suggestions.push("Add a number (0-9)".to_string());
    } else {
        score += 1;
    }

    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        failed.push(PasswordRequirement::ContainsSpecialChars);
        suggestions.push("Add a symbol such as ! @ # $ %".to_string());
    } else {
        score += 1;
    }

    // Weak patterns lower the rating but do not reject the password
    let lower = password.to_lowercase();
    for (pattern, suggestion) in WEAK_PATTERNS {
        if lower.contains(pattern) {
            suggestions.push(suggestion.to_string());
            score = score.saturating_sub(1);
        }
    }

    PasswordAssessment {
        failed,
        strength: PasswordStrength::from_score(score),
        suggestions,
    }
}

/// Validate a password against security requirements
pub fn validate_password(password: &str, email: Option<&str>) -> Result<PasswordAssessment, PasswordValidationError> {
    debug!("Validating password strength");

    let assessment = assess_password(password);

    if let Some(email) = email {
        let local_part = email.split('@').next().unwrap_or_default().to_lowercase();
        if local_part.len() >= 4 && password.to_lowercase().contains(&local_part) {
            return Err(PasswordValidationError::TooSimilarToUserInfo);
        }
    }

    if !assessment.is_valid() {
        let requirements_str = assessment.failed
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<String>>()
            .join(", ");

        return Err(PasswordValidationError::RequirementsNotMet(requirements_str));
    }

    Ok(assessment)
}

/// Email validation failure with hints for fixing the address
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid email address: {message}")]
pub struct EmailValidationError {
    pub message: String,
    pub suggestions: Vec<String>,
}

const DOMAIN_TYPOS: [(&str, &str); 5] = [
    ("gmial", "gmail"),
    ("gmai", "gmail"),
    ("yahooo", "yahoo"),
    ("hotmial", "hotmail"),
    ("outlok", "outlook"),
];

/// Validate an email address and return its normalized form
pub fn validate_email(email: &str) -> Result<String, EmailValidationError> {
    let normalized = normalize_email(email);

    if normalized.is_empty() {
        return Err(EmailValidationError {
            message: "Email is required".to_string(),
            suggestions: vec!["Enter your email address".to_string()],
        });
    }

    let email_regex = Regex::new(EMAIL_REGEX).map_err(|e| EmailValidationError {
        message: format!("Regex error: {}", e),
        suggestions: Vec::new(),
    })?;

    let parts: Vec<&str> = normalized.split('@').collect();
    let has_dotted_domain = parts.len() == 2 && parts[1].contains('.');
    if email_regex.is_match(&normalized) && has_dotted_domain && !has_domain_typo(parts[1]) {
        return Ok(normalized);
    }

    let mut suggestions = Vec::new();
    match parts.len() {
        1 => suggestions.push("Add the @ symbol followed by the domain (for example @gmail.com)".to_string()),
        2 if parts[1].is_empty() => suggestions.push("Add the domain after the @ (for example @gmail.com)".to_string()),
        2 if !parts[1].contains('.') => suggestions.push("Add a dot in the domain (for example gmail.com)".to_string()),
        2 => {}
        _ => suggestions.push("Use only one @ symbol".to_string()),
    }

    if parts.len() == 2 {
        if let Some((typo, correct)) = DOMAIN_TYPOS.iter().find(|(typo, correct)| domain_has_typo(parts[1], typo, correct)) {
            suggestions.push(format!("Did you mean {}@{}?", parts[0], parts[1].replace(typo, correct)));
        }
    }

    if suggestions.is_empty() {
        suggestions.push("Check the email format".to_string());
    }

    Err(EmailValidationError {
        message: format!("'{}' is not a valid email address", email.trim()),
        suggestions,
    })
}

fn domain_has_typo(domain: &str, typo: &str, correct: &str) -> bool {
    domain.contains(typo) && !domain.contains(correct)
}

fn has_domain_typo(domain: &str) -> bool {
    DOMAIN_TYPOS.iter().any(|(typo, correct)| domain_has_typo(domain, typo, correct))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_validation_valid() {
        let result = validate_password("Str0ngP@ssw0rd!", None);
        assert!(result.is_ok());
        assert!(result.unwrap().strength >= PasswordStrength::Strong);
    }

    #[test]
    fn test_password_validation_too_short() {
        let result = validate_password("Sh0rt!", None);
        assert!(matches!(result, Err(PasswordValidationError::RequirementsNotMet(_))));
    }

    #[test]
    fn test_password_validation_no_uppercase() {
        assert!(validate_password("strongp@ssw0rd!", None).is_err());
    }

    #[test]
    fn test_password_validation_no_lowercase() {
        assert!(validate_password("STRONG@P@SSW0RD!", None).is_err());
    }

    #[test]
    fn test_password_validation_no_number() {
        assert!(validate_password("StrongP@ssword!", None).is_err());
    }

    #[test]
    fn test_password_validation_no_special_char() {
        let result = validate_password("StrongPassw0rd", None);
        match result {
            Err(PasswordValidationError::RequirementsNotMet(msg)) => assert!(msg.contains("special character")),
            other => panic!("expected requirements error, got {:?}", other),
        }
    }

    #[test]
    fn test_weak_pattern_lowers_strength_only() {
        let assessment = validate_password("Admin#2024x", None).unwrap();
        assert!(assessment.strength < PasswordStrength::VeryStrong);
        assert!(assessment.suggestions.iter().any(|s| s.contains("admin")));
    }

    #[test]
    fn test_password_similar_to_email() {
        let result = validate_password("Johndoe#2024", Some("johndoe@example.com"));
        assert!(matches!(result, Err(PasswordValidationError::TooSimilarToUserInfo)));
    }

    #[test]
    fn test_email_normalized() {
        assert_eq!(validate_email("  Ana.Perez@Example.COM ").unwrap(), "ana.perez@example.com");
    }

    #[test]
    fn test_email_missing_at() {
        let err = validate_email("ana.example.com").unwrap_err();
        assert!(err.suggestions[0].contains("@"));
    }

    #[test]
    fn test_email_missing_dot_in_domain() {
        let err = validate_email("ana@localhost").unwrap_err();
        assert!(err.suggestions.iter().any(|s| s.contains("dot")));
    }

    #[test]
    fn test_email_domain_typo_suggestion() {
        let err = validate_email("ana@gmial.com").unwrap_err();
        assert!(err.suggestions.iter().any(|s| s == "Did you mean ana@gmail.com?"));

        assert!(validate_email("ana@gmail.com").is_ok());
    }

    #[test]
    fn test_email_empty() {
        let err = validate_email("   ").unwrap_err();
        assert_eq!(err.message, "Email is required");
    }
}
