//! Input format validators for account data. Each returns the actionable
//! message the 400 envelope carries.

use crate::error::ApiError;

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let err = || {
        ApiError::validation("email is not in the correct format eg --- john.doe@example.com")
    };

    let (local, domain) = email.split_once('@').ok_or_else(err)?;

    let local_ok = !local.is_empty()
        && !local.starts_with('.')
        && !local.ends_with('.')
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'));
    if !local_ok {
        return Err(err());
    }

    // Domain needs at least one dot and an alphabetic TLD of two or more chars
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(err());
    }
    for label in &labels {
        if label.is_empty()
            || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(err());
        }
    }
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(err());
    }

    Ok(())
}

/// Length must exceed 8 characters with at least one lowercase, uppercase,
/// digit, and special character.
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() <= 8 {
        return Err(ApiError::validation(
            "password should be more than 8 characters",
        ));
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(ApiError::validation(
            "password must contain a lowercase letter (eg a,b,c etc)",
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(ApiError::validation(
            "password must contain an uppercase letter (eg A,B,C etc)",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation(
            "password must contain a digit (eg 1,2,4 etc)",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_punctuation()) {
        return Err(ApiError::validation(
            "password must contain a special character (eg @, #, $, %, & etc)",
        ));
    }

    Ok(())
}

/// E.164 shape: leading '+', then 8 to 15 digits, first digit non-zero.
pub fn validate_phone_number(phone: &str) -> Result<(), ApiError> {
    let err = || ApiError::validation("Invalid phone number format");

    let digits = phone.strip_prefix('+').ok_or_else(err)?;
    if digits.len() < 8 || digits.len() > 15 {
        return Err(err());
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) || digits.starts_with('0') {
        return Err(err());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_email() {
        assert!(validate_email("john.doe@example.com").is_ok());
        assert!(validate_email("a@b.com").is_ok());
    }

    #[test]
    fn rejects_malformed_email() {
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b.c").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a b@example.com").is_err());
    }

    #[test]
    fn short_password_fails() {
        assert!(validate_password("short1").is_err());
    }

    #[test]
    fn strong_password_passes() {
        assert!(validate_password("Passw0rd@").is_ok());
    }

    #[test]
    fn password_requires_each_character_class() {
        assert!(validate_password("alllowercase1@").is_err());
        assert!(validate_password("ALLUPPERCASE1@").is_err());
        assert!(validate_password("NoDigitsHere@").is_err());
        assert!(validate_password("NoSpecial123x").is_err());
    }

    #[test]
    fn phone_must_be_e164() {
        assert!(validate_phone_number("+2348012345678").is_ok());
        assert!(validate_phone_number("2348012345678").is_err());
        assert!(validate_phone_number("+0123456789").is_err());
        assert!(validate_phone_number("+123").is_err());
        assert!(validate_phone_number("+12345678901234567").is_err());
    }
}
