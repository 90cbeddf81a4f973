// User management module
// Registration, email verification, profiles and accessibility preferences.

mod registration;
mod validation;
mod profile;
mod verification;

pub use registration::{Registrar, RegistrationError, RegistrationRequest, RegistrationOutcome};
pub use validation::{
    assess_password, validate_email, validate_password, EmailValidationError, PasswordAssessment,
    PasswordRequirement, PasswordStrength, PasswordValidationError,
};
pub use profile::{AccessibilityPreferencesUpdate, ProfileError, ProfileService, ProfileUpdate};
pub use verification::{
    generate_code, normalize_code, CodeFormatError, SendCodeOutcome, VerificationError,
    VerificationManager, VerificationOutcome, CODE_LENGTH,
};

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Symbols that satisfy the special character requirement
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Email regex pattern for validation
pub const EMAIL_REGEX: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";
