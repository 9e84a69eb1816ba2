use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AuthError, AuthResult};

pub(crate) const MIN_PASSWORD_LEN: usize = 8;
pub(crate) const MAX_PASSWORD_LEN: usize = 128;

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Returns the normalized email or a validation error.
pub(crate) fn email(raw: &str) -> AuthResult<String> {
    let email = normalize_email(raw);
    if !is_valid_email(&email) {
        return Err(AuthError::validation("Invalid email"));
    }
    Ok(email)
}

/// Returns the trimmed display name.
pub(crate) fn name(raw: &str) -> AuthResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < 2 {
        return Err(AuthError::validation("Name too short"));
    }
    if len > 100 {
        return Err(AuthError::validation("Name too long"));
    }
    Ok(name.to_owned())
}

/// At least one letter and one digit, between 8 and 128 characters.
pub(crate) fn password_strength(password: &str) -> AuthResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AuthError::validation("Password too short"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AuthError::validation("Password too long"));
    }
    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit())
    {
        return Err(AuthError::validation(
            "Password must contain letters and digits",
        ));
    }
    Ok(())
}

pub(crate) fn passwords_match(password: &str, confirm: &str) -> AuthResult<()> {
    if password != confirm {
        return Err(AuthError::validation("Passwords do not match"));
    }
    Ok(())
}
