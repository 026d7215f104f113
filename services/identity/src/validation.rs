//! Input validation utilities

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::AuthError;

/// A rejected request field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Collects field errors so a request reports all of them at once
#[derive(Debug, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn check(&mut self, field: &'static str, result: Result<(), String>) {
        if let Err(message) = result {
            self.0.push(FieldError { field, message });
        }
    }

    pub fn into_result(self) -> Result<(), AuthError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(self.0))
        }
    }
}

/// Validate full name
pub fn validate_fullname(fullname: &str) -> Result<(), String> {
    let trimmed = fullname.trim();
    if trimmed.is_empty() {
        return Err("Full name is required".to_string());
    }

    if trimmed.chars().count() > 100 {
        return Err("Full name must be at most 100 characters long".to_string());
    }

    Ok(())
}

/// Validate username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    if username.len() < 3 {
        return Err("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 32 {
        return Err("Username must be at most 32 characters long".to_string());
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.]+$").expect("Failed to compile username regex"));

    if !regex.is_match(username) {
        return Err(
            "Username can only contain letters, numbers, dots, and underscores".to_string(),
        );
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate phone number
pub fn validate_phone(phone: &str) -> Result<(), String> {
    static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PHONE_REGEX
        .get_or_init(|| Regex::new(r"^\+?[0-9]{9,15}$").expect("Failed to compile phone regex"));

    if !regex.is_match(phone) {
        return Err("Phone number must be 9 to 15 digits".to_string());
    }

    Ok(())
}

/// Validate a free-text address part (city, district, ...)
pub fn validate_place(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("Value must not be blank".to_string());
    }

    if value.chars().count() > 200 {
        return Err("Value must be at most 200 characters long".to_string());
    }

    Ok(())
}

/// Validate that a confirmation field repeats the password
pub fn validate_confirmation(password: &str, confirmation: &str) -> Result<(), String> {
    if password != confirmation {
        return Err("Password confirmation does not match password".to_string());
    }

    Ok(())
}

/// Validate a token carried in a body or query string
pub fn validate_token_present(token: &str) -> Result<(), String> {
    if token.trim().is_empty() {
        return Err("Token is required".to_string());
    }

    Ok(())
}
