//! Identity service models

pub mod log;
pub mod requests;
pub mod user;

// Re-export for convenience
pub use log::{LogEntry, NewLogEntry};
pub use requests::*;
pub use user::{NewUser, Role, User, UserPatch, UserProfile, VerifyStatus};
