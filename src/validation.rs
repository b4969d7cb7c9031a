//! Input normalization and field rules applied before any remote call.

use crate::error::GatewayError;
use crate::types::{ContactMessage, ProfileUpdate, SignupRequest};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_BIO_LEN: usize = 500;
pub const MAX_SHORT_FIELD_LEN: usize = 100;

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

fn require_email(email: &str) -> Result<String, GatewayError> {
    normalize_email(email).ok_or_else(|| GatewayError::Validation("Invalid email address".into()))
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), GatewayError> {
    if value.chars().count() > max {
        return Err(GatewayError::Validation(format!("{field} must be at most {max} characters")));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), GatewayError> {
    if name.trim().is_empty() {
        return Err(GatewayError::Validation("Name is required".into()));
    }
    check_len("Name", name, MAX_NAME_LEN)
}

fn require_text(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Validate a signup request, returning it with a normalized email.
///
/// # Errors
///
/// Returns `Validation` for a bad email, short password or bad name.
pub fn signup(req: &SignupRequest) -> Result<SignupRequest, GatewayError> {
    let email = require_email(&req.email)?;
    new_password(&req.password)?;
    check_name(&req.name)?;
    if let Some(company) = &req.company {
        check_len("Company", company, MAX_SHORT_FIELD_LEN)?;
    }
    Ok(SignupRequest { email, name: req.name.trim().to_owned(), ..req.clone() })
}

/// Validate login credentials, returning the normalized email.
///
/// # Errors
///
/// Returns `Validation` for a bad email or an empty password.
pub fn login(email: &str, password: &str) -> Result<String, GatewayError> {
    let email = require_email(email)?;
    require_text("Password", password)?;
    Ok(email)
}

/// # Errors
///
/// Returns `Validation` when no field is supplied or a field is too long.
pub fn profile_update(update: &ProfileUpdate) -> Result<(), GatewayError> {
    if update.is_empty() {
        return Err(GatewayError::Validation("No profile fields supplied".into()));
    }
    if let Some(name) = &update.name {
        check_name(name)?;
    }
    if let Some(bio) = &update.bio {
        check_len("Bio", bio, MAX_BIO_LEN)?;
    }
    if let Some(institution) = &update.institution {
        check_len("Institution", institution, MAX_SHORT_FIELD_LEN)?;
    }
    if let Some(company) = &update.company {
        check_len("Company", company, MAX_SHORT_FIELD_LEN)?;
    }
    if let Some(location) = &update.location {
        check_len("Location", location, MAX_SHORT_FIELD_LEN)?;
    }
    Ok(())
}

/// Validate a contact submission, returning it with a normalized email.
///
/// # Errors
///
/// Returns `Validation` for an empty field or a bad email.
pub fn contact_message(msg: &ContactMessage) -> Result<ContactMessage, GatewayError> {
    require_text("Name", &msg.name)?;
    require_text("Subject", &msg.subject)?;
    require_text("Message", &msg.message)?;
    let email = require_email(&msg.email)?;
    Ok(ContactMessage { email, ..msg.clone() })
}

/// # Errors
///
/// Returns `Validation` when the password is shorter than [`MIN_PASSWORD_LEN`].
pub fn new_password(password: &str) -> Result<(), GatewayError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(GatewayError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// # Errors
///
/// Returns `Validation` for a bad email.
pub fn password_reset(email: &str) -> Result<String, GatewayError> {
    require_email(email)
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod tests;
