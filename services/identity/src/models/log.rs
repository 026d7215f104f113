//! Audit log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit log entry. `user_id` is a weak reference: entries outlive users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ip: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// New log entry payload
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub user_id: Uuid,
    pub ip: String,
    pub action: String,
}

impl NewLogEntry {
    pub fn new(user_id: Uuid, ip: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id,
            ip: ip.into(),
            action: action.into(),
        }
    }
}
