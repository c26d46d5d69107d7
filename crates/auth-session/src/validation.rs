//! Credential validation, run before any provider call.

use regex::Regex;
use std::sync::OnceLock;
use tracker_config_and_utils::ValidationError;

/// Minimum password length accepted on sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid"))
}

/// Trim and check an email address. Returns the trimmed address.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::new("email", "Email is required"));
    }
    if !email_pattern().is_match(email) {
        return Err(ValidationError::new("email", "Email address is invalid"));
    }
    Ok(email.to_string())
}

/// Checks for a login form. Only presence is required of the password; the
/// provider decides whether it is right.
pub fn validate_login(email: &str, password: &str) -> Result<String, ValidationError> {
    let email = validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::new("password", "Password is required"));
    }
    Ok(email)
}

/// Checks for a sign-up form.
pub fn validate_signup(
    email: &str,
    password: &str,
    confirmation: &str,
) -> Result<String, ValidationError> {
    let email = validate_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if password != confirmation {
        return Err(ValidationError::new("confirmation", "Passwords do not match"));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_accepts_and_trims() {
        assert_eq!(validate_email("  ana@example.com ").unwrap(), "ana@example.com");
    }

    #[test]
    fn test_email_rejects_malformed() {
        for bad in ["", "   ", "ana", "ana@example", "@.", "ana @example.com"] {
            let err = validate_email(bad).unwrap_err();
            assert_eq!(err.field, "email", "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_login_requires_password() {
        let err = validate_login("ana@example.com", "").unwrap_err();
        assert_eq!(err.field, "password");
        assert!(validate_login("ana@example.com", "x").is_ok());
    }

    #[test]
    fn test_signup_rules() {
        assert_eq!(
            validate_signup("ana@example.com", "12345", "12345").unwrap_err().field,
            "password"
        );
        assert_eq!(
            validate_signup("ana@example.com", "123456", "1234567")
                .unwrap_err()
                .field,
            "confirmation"
        );
        assert!(validate_signup("ana@example.com", "123456", "123456").is_ok());
    }
}
