//! Password hashing and strength policy

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;
use std::sync::OnceLock;

/// Hash a password with argon2 and a random salt (PHC string format)
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored hash
pub fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    let argon2 = Argon2::default();
    let result = argon2.verify_password(password.as_bytes(), &parsed_hash);

    Ok(result.is_ok())
}

/// Random password for accounts created through an identity provider
pub fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Character classes a policy can require
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Lowercase = 0,
    Uppercase = 1,
    Digit = 2,
    Special = 3,
}

impl CharClass {
    const ALL: [CharClass; 4] = [
        CharClass::Lowercase,
        CharClass::Uppercase,
        CharClass::Digit,
        CharClass::Special,
    ];

    fn pattern(&self) -> &'static str {
        match self {
            CharClass::Lowercase => "[a-z]",
            CharClass::Uppercase => "[A-Z]",
            CharClass::Digit => "[0-9]",
            CharClass::Special => "[^A-Za-z0-9]",
        }
    }

    fn regex(&self) -> &'static Regex {
        static CLASSES: OnceLock<[Regex; 4]> = OnceLock::new();
        let classes = CLASSES.get_or_init(|| {
            CharClass::ALL.map(|class| {
                Regex::new(class.pattern()).expect("Failed to compile password class regex")
            })
        });
        &classes[*self as usize]
    }

    fn requirement(&self) -> &'static str {
        match self {
            CharClass::Lowercase => "Password must contain at least one lowercase letter",
            CharClass::Uppercase => "Password must contain at least one uppercase letter",
            CharClass::Digit => "Password must contain at least one digit",
            CharClass::Special => "Password must contain at least one special character",
        }
    }
}

/// Declarative password strength policy
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub required: Vec<CharClass>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 50,
            required: vec![CharClass::Lowercase, CharClass::Uppercase, CharClass::Digit],
        }
    }
}

impl PasswordPolicy {
    /// Every rule the password breaks, in rule order
    pub fn violations(&self, password: &str) -> Vec<String> {
        let mut violations = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            violations.push(format!(
                "Password must be at least {} characters long",
                self.min_length
            ));
        }
        if length > self.max_length {
            violations.push(format!(
                "Password must be at most {} characters long",
                self.max_length
            ));
        }
        for class in &self.required {
            if !class.regex().is_match(password) {
                violations.push(class.requirement().to_string());
            }
        }

        violations
    }

    pub fn check(&self, password: &str) -> Result<(), String> {
        match self.violations(password).into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }
}
