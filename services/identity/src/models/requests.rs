//! Typed request and response bodies of the HTTP boundary

use serde::{Deserialize, Serialize};

use crate::error::AuthResult;
use crate::models::{Role, UserPatch, VerifyStatus};
use crate::password::PasswordPolicy;
use crate::validation::{
    FieldErrors, validate_confirmation, validate_email, validate_fullname, validate_phone,
    validate_place, validate_token_present, validate_username,
};

/// Request for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterRequest {
    pub fn validate(&self, policy: &PasswordPolicy) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        errors.check("fullname", validate_fullname(&self.fullname));
        errors.check("username", validate_username(&self.username));
        errors.check("email", validate_email(&self.email));
        errors.check("password", policy.check(&self.password));
        errors.check(
            "confirm_password",
            validate_confirmation(&self.password, &self.confirm_password),
        );
        errors.into_result()
    }
}

/// Request for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        errors.check("email", validate_email(&self.email));
        if self.password.is_empty() {
            errors.check("password", Err("Password is required".to_string()));
        }
        errors.into_result()
    }
}

/// Body carrying a refresh token, used by logout and refresh
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl RefreshTokenRequest {
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        errors.check("refreshToken", validate_token_present(&self.refresh_token));
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

impl ForgotPasswordRequest {
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        errors.check("email", validate_email(&self.email));
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub forgot_password_token: String,
    pub password: String,
    pub confirm_password: String,
}

impl ResetPasswordRequest {
    pub fn validate(&self, policy: &PasswordPolicy) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        errors.check(
            "forgot_password_token",
            validate_token_present(&self.forgot_password_token),
        );
        errors.check("password", policy.check(&self.password));
        errors.check(
            "confirm_password",
            validate_confirmation(&self.password, &self.confirm_password),
        );
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub password: String,
    pub confirm_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self, policy: &PasswordPolicy) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        if self.old_password.is_empty() {
            errors.check("old_password", Err("Old password is required".to_string()));
        }
        errors.check("password", policy.check(&self.password));
        errors.check(
            "confirm_password",
            validate_confirmation(&self.password, &self.confirm_password),
        );
        errors.into_result()
    }
}

/// Self-service profile update. Unknown fields are rejected so that a member
/// cannot smuggle in a role or verification change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub commune: Option<String>,
    pub address: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> AuthResult<()> {
        let mut errors = FieldErrors::default();
        if let Some(fullname) = &self.fullname {
            errors.check("fullname", validate_fullname(fullname));
        }
        if let Some(username) = &self.username {
            errors.check("username", validate_username(username));
        }
        if let Some(email) = &self.email {
            errors.check("email", validate_email(email));
        }
        if let Some(phone) = &self.phone {
            errors.check("phone", validate_phone(phone));
        }
        for (field, value) in [
            ("city", &self.city),
            ("district", &self.district),
            ("commune", &self.commune),
            ("address", &self.address),
        ] {
            if let Some(value) = value {
                errors.check(field, validate_place(value));
            }
        }
        errors.into_result()
    }

    pub fn is_empty(&self) -> bool {
        self.fullname.is_none()
            && self.username.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.city.is_none()
            && self.district.is_none()
            && self.commune.is_none()
            && self.address.is_none()
    }

    pub fn into_patch(self) -> UserPatch {
        UserPatch {
            fullname: self.fullname.map(|value| value.trim().to_string()),
            username: self.username,
            email: self.email,
            phone: self.phone,
            city: self.city,
            district: self.district,
            commune: self.commune,
            address: self.address,
            ..Default::default()
        }
    }
}

/// Administrative update: profile fields plus role and verification state
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminUpdateUserRequest {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub commune: Option<String>,
    pub address: Option<String>,
    pub role: Option<Role>,
    pub verify: Option<VerifyStatus>,
}

impl AdminUpdateUserRequest {
    pub fn validate(&self) -> AuthResult<()> {
        self.clone().split().0.validate()
    }

    /// Split into the profile part and the privileged part
    pub fn split(self) -> (UpdateProfileRequest, Option<Role>, Option<VerifyStatus>) {
        let profile = UpdateProfileRequest {
            fullname: self.fullname,
            username: self.username,
            email: self.email,
            phone: self.phone,
            city: self.city,
            district: self.district,
            commune: self.commune,
            address: self.address,
        };
        (profile, self.role, self.verify)
    }
}

/// `GET /verify-email` query
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailQuery {
    pub email_verify_token: String,
}

/// `GET /verify-forgot-password` query; `forgot_password_token` is accepted
/// as an alias
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyForgotPasswordQuery {
    #[serde(alias = "forgot_password_token")]
    pub token: String,
}

/// `GET /google` callback query
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
}

/// Access and refresh token pair handed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a provider login
#[derive(Debug, Clone)]
pub struct ProviderLogin {
    pub tokens: TokenPair,
    pub new_user: bool,
    pub verify: VerifyStatus,
}

/// Outcome of following an email verification link
#[derive(Debug, Clone, PartialEq)]
pub enum EmailVerification {
    Verified(TokenPair),
    AlreadyVerified,
}

/// Outcome of asking for a new verification email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    AlreadyVerified,
}

/// Outcome of a logout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    /// Nobody held the presented refresh token
    NotLoggedIn,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            fullname: "Quang Huy".to_string(),
            username: "qhuy".to_string(),
            email: "qhuy@example.com".to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn test_register_validation() {
        let policy = PasswordPolicy::default();
        assert!(register("Secret123", "Secret123").validate(&policy).is_ok());
        assert!(register("Secret123", "Secret124").validate(&policy).is_err());
        assert!(register("secret", "secret").validate(&policy).is_err());
    }

    #[test]
    fn test_profile_update_rejects_role() {
        let result = serde_json::from_str::<UpdateProfileRequest>(r#"{"role":"ADMIN"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_admin_update_accepts_role_and_profile() {
        let request: AdminUpdateUserRequest =
            serde_json::from_str(r#"{"city":"Hue","role":"EMPLOYEE","verify":"Banned"}"#).unwrap();
        let (profile, role, verify) = request.split();
        assert_eq!(profile.city.as_deref(), Some("Hue"));
        assert_eq!(role, Some(Role::Employee));
        assert_eq!(verify, Some(VerifyStatus::Banned));
    }

    #[test]
    fn test_token_pair_is_camel_case() {
        let pair = TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["accessToken"], "a");
        assert_eq!(json["refreshToken"], "r");
    }

    #[test]
    fn test_forgot_password_query_alias() {
        let query: VerifyForgotPasswordQuery =
            serde_json::from_str(r#"{"forgot_password_token":"abc"}"#).unwrap();
        assert_eq!(query.token, "abc");
    }
}
