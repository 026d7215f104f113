//! JWT codec for token generation and validation
//!
//! Four token purposes are signed with four independent HMAC secrets:
//! access, refresh, email verification and forgot-password. Every token also
//! carries its purpose as a claim, so a token minted for one purpose is
//! rejected by the others even if two secrets were ever configured equal.

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Role, VerifyStatus};

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    Refresh,
    EmailVerify,
    ForgotPassword,
}

impl TokenPurpose {
    /// Access and refresh tokens carry the role; single-purpose tokens do not
    pub fn carries_role(&self) -> bool {
        matches!(self, TokenPurpose::Access | TokenPurpose::Refresh)
    }
}

/// Secret and lifetime for one purpose
#[derive(Debug, Clone)]
pub struct PurposeConfig {
    pub secret: String,
    /// Lifetime in seconds
    pub ttl: u64,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access: PurposeConfig,
    pub refresh: PurposeConfig,
    pub email_verify: PurposeConfig,
    pub forgot_password: PurposeConfig,
}

impl TokenConfig {
    /// Create a new TokenConfig from environment variables
    ///
    /// # Environment Variables
    /// - `ACCESS_TOKEN_SECRET`, `ACCESS_TOKEN_LIFE` (default: 15m)
    /// - `REFRESH_TOKEN_SECRET`, `REFRESH_TOKEN_LIFE` (default: 7d)
    /// - `EMAIL_VERIFY_TOKEN`, `EMAIL_VERIFY_LIFE` (default: 7d)
    /// - `FORGOT_PASSWORD_TOKEN`, `FORGOT_PASSWORD_TOKEN_LIFE` (default: 30m)
    ///
    /// Lifetimes are seconds, optionally suffixed with `s`, `m`, `h` or `d`.
    pub fn from_env() -> Result<Self> {
        let config = TokenConfig {
            access: purpose_from_env("ACCESS_TOKEN_SECRET", "ACCESS_TOKEN_LIFE", "15m")?,
            refresh: purpose_from_env("REFRESH_TOKEN_SECRET", "REFRESH_TOKEN_LIFE", "7d")?,
            email_verify: purpose_from_env("EMAIL_VERIFY_TOKEN", "EMAIL_VERIFY_LIFE", "7d")?,
            forgot_password: purpose_from_env(
                "FORGOT_PASSWORD_TOKEN",
                "FORGOT_PASSWORD_TOKEN_LIFE",
                "30m",
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Secrets must be non-empty and pairwise distinct
    pub fn validate(&self) -> Result<()> {
        let secrets = [
            &self.access.secret,
            &self.refresh.secret,
            &self.email_verify.secret,
            &self.forgot_password.secret,
        ];

        if secrets.iter().any(|secret| secret.is_empty()) {
            anyhow::bail!("Token secrets must not be empty");
        }

        let distinct: HashSet<&String> = secrets.iter().copied().collect();
        if distinct.len() != secrets.len() {
            anyhow::bail!("Each token purpose needs its own secret");
        }

        Ok(())
    }
}

fn purpose_from_env(secret_var: &str, ttl_var: &str, default_ttl: &str) -> Result<PurposeConfig> {
    let secret = std::env::var(secret_var)
        .map_err(|_| anyhow::anyhow!("{} environment variable not set", secret_var))?;

    let ttl = std::env::var(ttl_var).unwrap_or_else(|_| default_ttl.to_string());
    let ttl = parse_ttl(&ttl).map_err(|e| anyhow::anyhow!("Invalid {}: {}", ttl_var, e))?;

    Ok(PurposeConfig { secret, ttl })
}

/// Parse a lifetime such as `900`, `15m`, `12h` or `7d` into seconds
pub fn parse_ttl(value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last() {
        Some((index, 's')) => (&value[..index], 1),
        Some((index, 'm')) => (&value[..index], 60),
        Some((index, 'h')) => (&value[..index], 60 * 60),
        Some((index, 'd')) => (&value[..index], 24 * 60 * 60),
        Some(_) => (value, 1),
        None => anyhow::bail!("empty lifetime"),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("{:?} is not a lifetime", value))?;

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("{:?} overflows", value))
}

/// Identity a token is minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub verify: VerifyStatus,
    pub role: Role,
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Verification state at issue time
    pub verify: VerifyStatus,
    /// Role, for access and refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Token purpose
    pub purpose: TokenPurpose,
    /// Unique token id; two tokens minted in the same second still differ
    pub jti: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// Token codec failures
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token was issued for {actual:?}, expected {expected:?}")]
    WrongPurpose {
        expected: TokenPurpose,
        actual: TokenPurpose,
    },
}

#[derive(Clone)]
struct PurposeKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: u64,
}

impl PurposeKey {
    fn new(config: &PurposeConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: config.ttl,
        }
    }
}

/// Stateless token codec, cheap to clone and safe to share across tasks
#[derive(Clone)]
pub struct TokenCodec {
    access: PurposeKey,
    refresh: PurposeKey,
    email_verify: PurposeKey,
    forgot_password: PurposeKey,
    validation: Validation,
}

impl TokenCodec {
    /// Initialize a new codec
    pub fn new(config: &TokenConfig) -> Result<Self> {
        config.validate()?;

        // Expiry is checked by hand so that `now == exp` already counts as
        // expired and no leeway applies.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(TokenCodec {
            access: PurposeKey::new(&config.access),
            refresh: PurposeKey::new(&config.refresh),
            email_verify: PurposeKey::new(&config.email_verify),
            forgot_password: PurposeKey::new(&config.forgot_password),
            validation,
        })
    }

    fn key(&self, purpose: TokenPurpose) -> &PurposeKey {
        match purpose {
            TokenPurpose::Access => &self.access,
            TokenPurpose::Refresh => &self.refresh,
            TokenPurpose::EmailVerify => &self.email_verify,
            TokenPurpose::ForgotPassword => &self.forgot_password,
        }
    }

    /// Lifetime in seconds of tokens minted for `purpose`
    pub fn ttl(&self, purpose: TokenPurpose) -> u64 {
        self.key(purpose).ttl
    }

    /// Mint a token for `subject`, valid from now
    pub fn issue(&self, subject: &TokenSubject, purpose: TokenPurpose) -> Result<String, TokenError> {
        self.issue_at(subject, purpose, unix_now())
    }

    /// Mint a token as if the current time were `now`
    pub fn issue_at(
        &self,
        subject: &TokenSubject,
        purpose: TokenPurpose,
        now: u64,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: subject.user_id,
            verify: subject.verify,
            role: purpose.carries_role().then_some(subject.role),
            purpose,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now.saturating_add(self.ttl(purpose)),
        };
        self.sign(&claims)
    }

    /// Sign fully formed claims with the key of `claims.purpose`.
    /// The same claims always produce the same token.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.key(claims.purpose).encoding,
        )
        .map_err(TokenError::Encoding)
    }

    /// Validate a token minted for `purpose` and return the claims
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        self.verify_at(token, purpose, unix_now())
    }

    /// Validate a token as if the current time were `now`
    pub fn verify_at(
        &self,
        token: &str,
        purpose: TokenPurpose,
        now: u64,
    ) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.key(purpose).decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        let claims = token_data.claims;
        if claims.purpose != purpose {
            return Err(TokenError::WrongPurpose {
                expected: purpose,
                actual: claims.purpose,
            });
        }

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
