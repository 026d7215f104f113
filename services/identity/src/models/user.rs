//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    Member,
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "MEMBER",
            Role::Admin => "ADMIN",
            Role::Employee => "EMPLOYEE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MEMBER" => Ok(Role::Member),
            "ADMIN" => Ok(Role::Admin),
            "EMPLOYEE" => Ok(Role::Employee),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Email verification state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VerifyStatus {
    #[default]
    Unverified,
    Verified,
    Banned,
}

impl VerifyStatus {
    /// Stored as SMALLINT: 0 unverified, 1 verified, 2 banned
    pub fn code(&self) -> i16 {
        match self {
            VerifyStatus::Unverified => 0,
            VerifyStatus::Verified => 1,
            VerifyStatus::Banned => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(VerifyStatus::Unverified),
            1 => Some(VerifyStatus::Verified),
            2 => Some(VerifyStatus::Banned),
            _ => None,
        }
    }

    /// Unverified accounts may become verified; any account may be banned.
    /// Nothing ever goes back to unverified.
    pub fn can_transition_to(&self, next: VerifyStatus) -> bool {
        match (self, next) {
            (current, next) if *current == next => true,
            (_, VerifyStatus::Banned) => true,
            (VerifyStatus::Unverified, VerifyStatus::Verified) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifyStatus::Unverified => "Unverified",
            VerifyStatus::Verified => "Verified",
            VerifyStatus::Banned => "Banned",
        };
        f.write_str(name)
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub verify: VerifyStatus,
    pub refresh_token: Option<String>,
    pub email_verify_token: Option<String>,
    pub forgot_password_token: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub commune: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user creation payload
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub email_verify_token: Option<String>,
}

/// Partial update of a user record.
///
/// `None` leaves a column untouched. The token slots are nullable, so they
/// take `Some(None)` to clear and `Some(Some(value))` to set.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub verify: Option<VerifyStatus>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub commune: Option<String>,
    pub address: Option<String>,
    pub refresh_token: Option<Option<String>>,
    pub email_verify_token: Option<Option<String>>,
    pub forgot_password_token: Option<Option<String>>,
}

impl UserPatch {
    /// Apply the patch in place; used by the in-memory store and tests.
    pub fn apply_to(self, user: &mut User) {
        if let Some(value) = self.fullname {
            user.fullname = value;
        }
        if let Some(value) = self.username {
            user.username = value;
        }
        if let Some(value) = self.email {
            user.email = value;
        }
        if let Some(value) = self.password_hash {
            user.password_hash = value;
        }
        if let Some(value) = self.role {
            user.role = value;
        }
        if let Some(value) = self.verify {
            user.verify = value;
        }
        if let Some(value) = self.phone {
            user.phone = Some(value);
        }
        if let Some(value) = self.city {
            user.city = Some(value);
        }
        if let Some(value) = self.district {
            user.district = Some(value);
        }
        if let Some(value) = self.commune {
            user.commune = Some(value);
        }
        if let Some(value) = self.address {
            user.address = Some(value);
        }
        if let Some(value) = self.refresh_token {
            user.refresh_token = value;
        }
        if let Some(value) = self.email_verify_token {
            user.email_verify_token = value;
        }
        if let Some(value) = self.forgot_password_token {
            user.forgot_password_token = value;
        }
        user.updated_at = Utc::now();
    }
}

/// Public view of a user: everything except the password hash and tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub verify: VerifyStatus,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub commune: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname,
            username: user.username,
            email: user.email,
            role: user.role,
            verify: user.verify,
            phone: user.phone,
            city: user.city,
            district: user.district,
            commune: user.commune,
            address: user.address,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_transitions() {
        use VerifyStatus::*;

        assert!(Unverified.can_transition_to(Verified));
        assert!(Unverified.can_transition_to(Banned));
        assert!(Verified.can_transition_to(Banned));
        assert!(Verified.can_transition_to(Verified));
        assert!(!Verified.can_transition_to(Unverified));
        assert!(!Banned.can_transition_to(Verified));
        assert!(!Banned.can_transition_to(Unverified));
    }

    #[test]
    fn test_role_round_trips_through_text() {
        for role in [Role::Member, Role::Admin, Role::Employee] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("ROOT".parse::<Role>().is_err());
    }

    #[test]
    fn test_profile_serialization_hides_secrets() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            fullname: "Ada Lovelace".to_string(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            role: Role::Member,
            verify: VerifyStatus::Unverified,
            refresh_token: Some("refresh".to_string()),
            email_verify_token: Some("verify".to_string()),
            forgot_password_token: None,
            phone: None,
            city: None,
            district: None,
            commune: None,
            address: None,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(UserProfile::from(user)).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("password_hash"));
        assert!(!object.contains_key("refresh_token"));
        assert!(!object.contains_key("email_verify_token"));
        assert!(!object.contains_key("forgot_password_token"));
        assert_eq!(object["role"], "MEMBER");
    }
}
