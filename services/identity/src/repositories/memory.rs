//! In-process stores for tests and local experiments

use async_trait::async_trait;
use chrono::Utc;
use common::error::{DatabaseError, DatabaseResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditLog, Dependency, ReferenceChecker, UserLookup, UserStore};
use crate::models::{LogEntry, NewLogEntry, NewUser, User, UserPatch};

/// User store holding records in a map
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by(&self, lookup: UserLookup<'_>) -> DatabaseResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| lookup.matches(user)).cloned())
    }

    async fn insert(&self, new_user: NewUser) -> DatabaseResult<User> {
        let mut users = self.users.write().await;

        if users.values().any(|user| user.email == new_user.email) {
            return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: new_user.id,
            fullname: new_user.fullname,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: Default::default(),
            verify: Default::default(),
            refresh_token: new_user.refresh_token,
            email_verify_token: new_user.email_verify_token,
            forgot_password_token: None,
            phone: None,
            city: None,
            district: None,
            commune: None,
            address: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update_fields(&self, id: Uuid, patch: UserPatch) -> DatabaseResult<Option<User>> {
        let mut users = self.users.write().await;

        if let Some(email) = &patch.email {
            if users.values().any(|user| user.id != id && &user.email == email) {
                return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
            }
        }

        Ok(users.get_mut(&id).map(|user| {
            patch.apply_to(user);
            user.clone()
        }))
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: Option<&str>,
        next: Option<&str>,
    ) -> DatabaseResult<bool> {
        let mut users = self.users.write().await;

        match users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == expected => {
                user.refresh_token = next.map(str::to_string);
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_forgot_password_token(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> DatabaseResult<bool> {
        let mut users = self.users.write().await;

        match users.get_mut(&id) {
            Some(user) if user.forgot_password_token.as_deref() == Some(token) => {
                user.password_hash = password_hash.to_string();
                user.forgot_password_token = None;
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_refresh_token(&self, token: &str) -> DatabaseResult<Option<Uuid>> {
        let mut users = self.users.write().await;

        let holder = users
            .values_mut()
            .find(|user| user.refresh_token.as_deref() == Some(token));

        Ok(holder.map(|user| {
            user.refresh_token = None;
            user.updated_at = Utc::now();
            user.id
        }))
    }

    async fn list(&self) -> DatabaseResult<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        let mut users = self.users.write().await;
        Ok(users.remove(&id).is_some())
    }
}

/// Audit log kept in a vector
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far, oldest first
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: NewLogEntry) -> DatabaseResult<()> {
        self.entries.write().await.push(LogEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            ip: entry.ip,
            action: entry.action,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

/// References from other services, registered by hand
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferences {
    references: Arc<RwLock<HashSet<(Dependency, Uuid)>>>,
}

impl InMemoryReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependency` holds a row pointing at `user_id`
    pub async fn add(&self, dependency: Dependency, user_id: Uuid) {
        self.references.write().await.insert((dependency, user_id));
    }
}

#[async_trait]
impl ReferenceChecker for InMemoryReferences {
    async fn find_reference(&self, user_id: Uuid) -> DatabaseResult<Option<Dependency>> {
        let references = self.references.read().await;
        Ok(Dependency::ALL
            .into_iter()
            .find(|dependency| references.contains(&(*dependency, user_id))))
    }
}
