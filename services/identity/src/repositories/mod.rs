//! Persistence seams of the identity service
//!
//! The flows only talk to these traits. PostgreSQL implementations back the
//! running service; the in-memory ones back the tests.

use async_trait::async_trait;
use common::error::DatabaseResult;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::{NewLogEntry, NewUser, User, UserPatch};

pub mod log;
pub mod memory;
pub mod references;
pub mod user;

pub use log::PgAuditLog;
pub use memory::{InMemoryAuditLog, InMemoryReferences, InMemoryUserStore};
pub use references::PgReferenceChecker;
pub use user::PgUserStore;

/// Field a user is looked up by
#[derive(Debug, Clone, Copy)]
pub enum UserLookup<'a> {
    Id(Uuid),
    Email(&'a str),
    Username(&'a str),
    RefreshToken(&'a str),
}

impl UserLookup<'_> {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserLookup::Id(id) => user.id == *id,
            UserLookup::Email(email) => user.email == *email,
            UserLookup::Username(username) => user.username == *username,
            UserLookup::RefreshToken(token) => user.refresh_token.as_deref() == Some(*token),
        }
    }
}

/// Credential store for user records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a single user
    async fn find_by(&self, lookup: UserLookup<'_>) -> DatabaseResult<Option<User>>;

    /// Whether a user matches
    async fn exists(&self, lookup: UserLookup<'_>) -> DatabaseResult<bool> {
        Ok(self.find_by(lookup).await?.is_some())
    }

    /// Insert a new user; a taken email is a `UniqueViolation`
    async fn insert(&self, user: NewUser) -> DatabaseResult<User>;

    /// Merge `patch` into the user and return the updated record
    async fn update_fields(&self, id: Uuid, patch: UserPatch) -> DatabaseResult<Option<User>>;

    /// Set the refresh-token slot to `next` only if it currently holds
    /// `expected`. Returns whether the swap happened.
    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        next: Option<&str>,
    ) -> DatabaseResult<bool>;

    /// Replace the password hash and clear the reset slot, only if the slot
    /// still holds `token`. Returns whether the reset happened.
    async fn consume_forgot_password_token(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> DatabaseResult<bool>;

    /// Clear the refresh-token slot of whichever user holds `token`
    async fn revoke_refresh_token(&self, token: &str) -> DatabaseResult<Option<Uuid>>;

    /// All users, newest first
    async fn list(&self) -> DatabaseResult<Vec<User>>;

    /// Remove a user. Returns whether a record was deleted.
    async fn delete(&self, id: Uuid) -> DatabaseResult<bool>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> DatabaseResult<()>;
}

/// Records owned by other services that pin a user in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Orders,
    Comments,
    CouponUsage,
    Chats,
}

impl Dependency {
    /// Checked in this order; the first hit is reported
    pub const ALL: [Dependency; 4] = [
        Dependency::Orders,
        Dependency::Comments,
        Dependency::CouponUsage,
        Dependency::Chats,
    ];

    /// Table holding the referencing rows
    pub fn table(&self) -> &'static str {
        match self {
            Dependency::Orders => "orders",
            Dependency::Comments => "comments",
            Dependency::CouponUsage => "coupon_users",
            Dependency::Chats => "chats",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dependency::Orders => "orders",
            Dependency::Comments => "reviews and comments",
            Dependency::CouponUsage => "coupon usage",
            Dependency::Chats => "chats",
        };
        f.write_str(name)
    }
}

/// Cross-service existence check run before deleting a user
#[async_trait]
pub trait ReferenceChecker: Send + Sync {
    async fn find_reference(&self, user_id: Uuid) -> DatabaseResult<Option<Dependency>>;
}
