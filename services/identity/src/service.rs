//! Authentication flows
//!
//! `AuthService` owns no mutable state of its own. Everything it remembers
//! lives behind the store traits, so one instance is shared by every request.

use anyhow::anyhow;
use common::error::DatabaseError;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    jwt::{Claims, TokenCodec, TokenPurpose, TokenSubject},
    mail::Notifier,
    models::{
        AdminUpdateUserRequest, EmailVerification, LogoutOutcome, NewLogEntry, NewUser,
        ProviderLogin, RegisterRequest, ResendOutcome, Role, TokenPair, UpdateProfileRequest,
        User, UserPatch, UserProfile, VerifyStatus,
    },
    oauth::IdentityProvider,
    password::{hash_password, random_password, verify_password},
    repositories::{AuditLog, ReferenceChecker, UserLookup, UserStore},
    validation::FieldError,
};

/// How often login retries filling a refresh slot that keeps changing under it
const REFRESH_SLOT_ATTEMPTS: usize = 3;

/// Authenticated caller, decoded from an access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub verify: VerifyStatus,
}

impl Principal {
    pub fn require_admin(&self) -> AuthResult<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }

    pub fn require_verified(&self) -> AuthResult<()> {
        match self.verify {
            VerifyStatus::Verified => Ok(()),
            VerifyStatus::Banned => Err(AuthError::AccountBanned),
            VerifyStatus::Unverified => Err(AuthError::UnverifiedAccount),
        }
    }
}

/// Collaborators the flows are built from
pub struct AuthDeps {
    pub users: Arc<dyn UserStore>,
    pub logs: Arc<dyn AuditLog>,
    pub references: Arc<dyn ReferenceChecker>,
    pub tokens: TokenCodec,
    pub notifier: Notifier,
    /// Google sign-in, when configured
    pub provider: Option<Arc<dyn IdentityProvider>>,
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    logs: Arc<dyn AuditLog>,
    references: Arc<dyn ReferenceChecker>,
    tokens: TokenCodec,
    notifier: Notifier,
    provider: Option<Arc<dyn IdentityProvider>>,
}

fn subject_of(user: &User) -> TokenSubject {
    TokenSubject {
        user_id: user.id,
        verify: user.verify,
        role: user.role,
    }
}

/// A unique-email violation raised by the store is a duplicate email
fn duplicate_email(error: DatabaseError) -> AuthError {
    match error {
        DatabaseError::UniqueViolation(_) => AuthError::DuplicateEmail,
        other => AuthError::Database(other),
    }
}

/// Username for accounts created through an identity provider
fn provider_username(name: &str, email: &str) -> String {
    let candidate: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .take(32)
        .collect();
    if candidate.len() >= 3 {
        return candidate;
    }

    let local: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .take(32)
        .collect();
    if local.len() >= 3 {
        local
    } else {
        format!("user_{}", &Uuid::new_v4().simple().to_string()[..8])
    }
}

impl AuthService {
    pub fn new(deps: AuthDeps) -> Self {
        Self {
            users: deps.users,
            logs: deps.logs,
            references: deps.references,
            tokens: deps.tokens,
            notifier: deps.notifier,
            provider: deps.provider,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Consent-screen URL of the identity provider, if one is configured
    pub fn provider_authorize_url(&self) -> Option<String> {
        self.provider.as_ref().map(|provider| provider.authorize_url())
    }

    async fn find_user(&self, user_id: Uuid) -> AuthResult<User> {
        self.users
            .find_by(UserLookup::Id(user_id))
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn audit(&self, user_id: Uuid, ip: &str, action: &str) -> AuthResult<()> {
        self.logs
            .append(NewLogEntry::new(user_id, ip, action))
            .await?;
        Ok(())
    }

    async fn create_account(
        &self,
        fullname: String,
        username: String,
        email: String,
        password: &str,
        ip: &str,
    ) -> AuthResult<TokenPair> {
        if self.users.exists(UserLookup::Email(&email)).await? {
            return Err(AuthError::DuplicateEmail);
        }

        let id = Uuid::new_v4();
        let password_hash = hash_password(password)?;
        let subject = TokenSubject {
            user_id: id,
            verify: VerifyStatus::Unverified,
            role: Role::Member,
        };

        let access_token = self.tokens.issue(&subject, TokenPurpose::Access)?;
        let refresh_token = self.tokens.issue(&subject, TokenPurpose::Refresh)?;
        let email_verify_token = self.tokens.issue(&subject, TokenPurpose::EmailVerify)?;

        let user = self
            .users
            .insert(NewUser {
                id,
                fullname,
                username,
                email,
                password_hash,
                refresh_token: Some(refresh_token.clone()),
                email_verify_token: Some(email_verify_token.clone()),
            })
            .await
            .map_err(duplicate_email)?;

        self.notifier
            .send_verify_email(&user.email, &email_verify_token);
        self.audit(user.id, ip, "Registered account").await?;

        info!("Registered user {}", user.id);
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Create a member account and send the verification email
    pub async fn register(&self, request: RegisterRequest, ip: &str) -> AuthResult<TokenPair> {
        self.create_account(
            request.fullname.trim().to_string(),
            request.username,
            request.email,
            &request.password,
            ip,
        )
        .await
    }

    /// The refresh token a new session should use. A stored token that still
    /// verifies is reused; otherwise a fresh one is stored, conditional on the
    /// slot not having changed in between.
    async fn session_refresh_token(&self, user: &User) -> AuthResult<String> {
        let mut current = user.refresh_token.clone();

        for _ in 0..REFRESH_SLOT_ATTEMPTS {
            if let Some(stored) = current.as_deref() {
                if self.tokens.verify(stored, TokenPurpose::Refresh).is_ok() {
                    return Ok(stored.to_string());
                }
            }

            let fresh = self.tokens.issue(&subject_of(user), TokenPurpose::Refresh)?;
            if self
                .users
                .swap_refresh_token(user.id, current.as_deref(), Some(&fresh))
                .await?
            {
                return Ok(fresh);
            }

            current = self.find_user(user.id).await?.refresh_token;
        }

        Err(AuthError::Internal(anyhow!(
            "Refresh token slot of user {} kept changing",
            user.id
        )))
    }

    async fn open_session(&self, user: &User, ip: &str, action: &str) -> AuthResult<TokenPair> {
        if user.verify == VerifyStatus::Banned {
            return Err(AuthError::AccountBanned);
        }

        let access_token = self.tokens.issue(&subject_of(user), TokenPurpose::Access)?;
        let refresh_token = self.session_refresh_token(user).await?;
        self.audit(user.id, ip, action).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Password login
    pub async fn login(&self, email: &str, password: &str, ip: &str) -> AuthResult<TokenPair> {
        let user = self
            .users
            .find_by(UserLookup::Email(email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(&user.password_hash, password)? {
            warn!("Rejected password for user {}", user.id);
            return Err(AuthError::InvalidPassword);
        }

        let tokens = self.open_session(&user, ip, "Logged in").await?;
        info!("User {} logged in", user.id);
        Ok(tokens)
    }

    /// Login through the identity provider, registering unknown emails
    pub async fn login_with_provider(&self, code: &str, ip: &str) -> AuthResult<ProviderLogin> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| AuthError::Upstream("Google login is not configured".to_string()))?;

        let profile = provider.fetch_profile(code).await.map_err(|e| {
            warn!("Identity provider failure: {:#}", e);
            AuthError::Upstream(e.to_string())
        })?;

        if !profile.verified_email {
            return Err(AuthError::UnverifiedProviderEmail);
        }

        if let Some(user) = self
            .users
            .find_by(UserLookup::Email(&profile.email))
            .await?
        {
            let tokens = self
                .open_session(&user, ip, "Logged in with Google")
                .await?;
            return Ok(ProviderLogin {
                tokens,
                new_user: false,
                verify: user.verify,
            });
        }

        let username = provider_username(&profile.name, &profile.email);
        let tokens = self
            .create_account(profile.name, username, profile.email, &random_password(), ip)
            .await?;

        Ok(ProviderLogin {
            tokens,
            new_user: true,
            verify: VerifyStatus::Unverified,
        })
    }

    /// Clear the refresh slot holding `refresh_token`
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<LogoutOutcome> {
        match self.users.revoke_refresh_token(refresh_token).await? {
            Some(user_id) => {
                info!("User {} logged out", user_id);
                Ok(LogoutOutcome::LoggedOut)
            }
            None => {
                warn!("Logout with a refresh token nobody holds");
                Ok(LogoutOutcome::NotLoggedIn)
            }
        }
    }

    /// Decode a refresh token presented by a client
    pub fn verify_refresh_token(&self, refresh_token: &str) -> AuthResult<Claims> {
        Ok(self.tokens.verify(refresh_token, TokenPurpose::Refresh)?)
    }

    /// Rotate a refresh token. The new token replaces the presented one only
    /// if the slot still holds it, so a revoked or already rotated token
    /// cannot be used again.
    pub async fn refresh(&self, claims: &Claims, refresh_token: &str) -> AuthResult<TokenPair> {
        let user = self
            .users
            .find_by(UserLookup::Id(claims.sub))
            .await?
            .ok_or_else(|| AuthError::Unauthorized("User no longer exists".to_string()))?;

        if user.verify == VerifyStatus::Banned {
            return Err(AuthError::AccountBanned);
        }

        let subject = subject_of(&user);
        let access_token = self.tokens.issue(&subject, TokenPurpose::Access)?;
        let next_refresh_token = self.tokens.issue(&subject, TokenPurpose::Refresh)?;

        let rotated = self
            .users
            .swap_refresh_token(user.id, Some(refresh_token), Some(&next_refresh_token))
            .await?;
        if !rotated {
            warn!("Refresh with a revoked token for user {}", user.id);
            return Err(AuthError::Unauthorized(
                "Refresh token has been revoked".to_string(),
            ));
        }

        Ok(TokenPair {
            access_token,
            refresh_token: next_refresh_token,
        })
    }

    /// Decode an email verification token
    pub fn check_email_verify_token(&self, token: &str) -> AuthResult<Claims> {
        Ok(self.tokens.verify(token, TokenPurpose::EmailVerify)?)
    }

    /// Mark the user verified and open a session carrying the new state
    pub async fn verify_email(&self, user_id: Uuid) -> AuthResult<EmailVerification> {
        let user = self.find_user(user_id).await?;

        if user.email_verify_token.is_none() || user.verify == VerifyStatus::Verified {
            return Ok(EmailVerification::AlreadyVerified);
        }
        if !user.verify.can_transition_to(VerifyStatus::Verified) {
            return Err(AuthError::AccountBanned);
        }

        let subject = TokenSubject {
            verify: VerifyStatus::Verified,
            ..subject_of(&user)
        };
        let access_token = self.tokens.issue(&subject, TokenPurpose::Access)?;
        let refresh_token = self.tokens.issue(&subject, TokenPurpose::Refresh)?;

        self.users
            .update_fields(
                user.id,
                UserPatch {
                    verify: Some(VerifyStatus::Verified),
                    email_verify_token: Some(None),
                    refresh_token: Some(Some(refresh_token.clone())),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        info!("User {} verified their email", user.id);
        Ok(EmailVerification::Verified(TokenPair {
            access_token,
            refresh_token,
        }))
    }

    /// Mint a new verification token and mail it again
    pub async fn resend_verify_email(&self, user_id: Uuid) -> AuthResult<ResendOutcome> {
        let user = self.find_user(user_id).await?;

        match user.verify {
            VerifyStatus::Verified => return Ok(ResendOutcome::AlreadyVerified),
            VerifyStatus::Banned => return Err(AuthError::AccountBanned),
            VerifyStatus::Unverified => {}
        }

        let token = self
            .tokens
            .issue(&subject_of(&user), TokenPurpose::EmailVerify)?;
        self.users
            .update_fields(
                user.id,
                UserPatch {
                    email_verify_token: Some(Some(token.clone())),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.notifier.send_verify_email(&user.email, &token);
        Ok(ResendOutcome::Sent)
    }

    /// Store a fresh reset token, replacing any earlier one, and mail the link
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let user = self
            .users
            .find_by(UserLookup::Email(email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let token = self
            .tokens
            .issue(&subject_of(&user), TokenPurpose::ForgotPassword)?;
        self.users
            .update_fields(
                user.id,
                UserPatch {
                    forgot_password_token: Some(Some(token.clone())),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.notifier.send_reset_password(&user.email, &token);
        info!("Password reset requested for user {}", user.id);
        Ok(())
    }

    /// Decode a reset token and check it is the one currently on file
    pub async fn check_forgot_password_token(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.tokens.verify(token, TokenPurpose::ForgotPassword)?;
        let user = self.find_user(claims.sub).await?;

        if user.forgot_password_token.as_deref() != Some(token) {
            return Err(AuthError::Unauthorized(
                "Forgot password token is invalid or has already been used".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Replace the password and consume the reset token in one step. A token
    /// that was already used or replaced is rejected.
    pub async fn reset_password(
        &self,
        user_id: Uuid,
        token: &str,
        password: &str,
        ip: &str,
    ) -> AuthResult<()> {
        let password_hash = hash_password(password)?;

        if !self
            .users
            .consume_forgot_password_token(user_id, token, &password_hash)
            .await?
        {
            return Err(AuthError::Unauthorized(
                "Forgot password token is invalid or has already been used".to_string(),
            ));
        }

        self.audit(user_id, ip, "Reset password").await?;
        info!("User {} reset their password", user_id);
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        password: &str,
        ip: &str,
    ) -> AuthResult<()> {
        let user = self.find_user(user_id).await?;

        if !verify_password(&user.password_hash, old_password)? {
            return Err(AuthError::InvalidOldPassword);
        }

        let password_hash = hash_password(password)?;
        self.users
            .update_fields(
                user.id,
                UserPatch {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.audit(user.id, ip, "Changed password").await?;
        Ok(())
    }

    pub async fn get_profile(&self, user_id: Uuid) -> AuthResult<UserProfile> {
        Ok(self.find_user(user_id).await?.into())
    }

    pub async fn list_profiles(&self) -> AuthResult<Vec<UserProfile>> {
        let users = self.users.list().await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    async fn ensure_email_free(&self, user_id: Uuid, email: Option<&str>) -> AuthResult<()> {
        let Some(email) = email else {
            return Ok(());
        };

        match self.users.find_by(UserLookup::Email(email)).await? {
            Some(owner) if owner.id != user_id => Err(AuthError::DuplicateEmail),
            _ => Ok(()),
        }
    }

    async fn apply_patch(&self, user_id: Uuid, patch: UserPatch) -> AuthResult<UserProfile> {
        let user = self
            .users
            .update_fields(user_id, patch)
            .await
            .map_err(duplicate_email)?
            .ok_or(AuthError::UserNotFound)?;
        Ok(user.into())
    }

    /// Merge the caller's own profile fields
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> AuthResult<UserProfile> {
        self.ensure_email_free(user_id, request.email.as_deref())
            .await?;
        self.apply_patch(user_id, request.into_patch()).await
    }

    /// Administrative update, including role and verification state
    pub async fn admin_update_user(
        &self,
        user_id: Uuid,
        request: AdminUpdateUserRequest,
    ) -> AuthResult<UserProfile> {
        let user = self.find_user(user_id).await?;
        let (profile, role, verify) = request.split();

        if let Some(next) = verify {
            if !user.verify.can_transition_to(next) {
                return Err(AuthError::Validation(vec![FieldError {
                    field: "verify",
                    message: format!("Cannot change verification from {} to {}", user.verify, next),
                }]));
            }
        }
        self.ensure_email_free(user.id, profile.email.as_deref())
            .await?;

        let mut patch = profile.into_patch();
        patch.role = role;
        patch.verify = verify;
        match verify {
            Some(VerifyStatus::Verified) => patch.email_verify_token = Some(None),
            // A banned user's session ends with its access token
            Some(VerifyStatus::Banned) => patch.refresh_token = Some(None),
            _ => {}
        }

        let updated = self.apply_patch(user.id, patch).await?;
        info!("Administrator updated user {}", user.id);
        Ok(updated)
    }

    /// Delete a user nobody else references
    pub async fn delete_user(&self, user_id: Uuid) -> AuthResult<()> {
        let user = self.find_user(user_id).await?;

        if let Some(dependency) = self.references.find_reference(user.id).await? {
            warn!("Refusing to delete user {}: referenced by {}", user.id, dependency);
            return Err(AuthError::InUse(dependency));
        }

        if !self.users.delete(user.id).await? {
            return Err(AuthError::UserNotFound);
        }

        info!("Deleted user {}", user.id);
        Ok(())
    }

    /// Resolve a bearer access token to the calling principal
    pub fn authenticate(&self, access_token: &str) -> AuthResult<Principal> {
        let claims = self.tokens.verify(access_token, TokenPurpose::Access)?;
        let role = claims
            .role
            .ok_or_else(|| AuthError::Unauthorized("Access token carries no role".to_string()))?;

        Ok(Principal {
            user_id: claims.sub,
            role,
            verify: claims.verify,
        })
    }
}
