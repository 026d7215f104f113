//! Identity service: registration, login and session lifecycle
//!
//! The binary in `main.rs` wires PostgreSQL-backed stores into an
//! `AuthService` and serves it through the router in `routes`.

pub mod database;
pub mod error;
pub mod jwt;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod password;
pub mod repositories;
pub mod routes;
pub mod service;
pub mod settings;
pub mod validation;

use std::sync::Arc;

use crate::{password::PasswordPolicy, service::AuthService, settings::Settings};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub settings: Arc<Settings>,
    pub policy: Arc<PasswordPolicy>,
}

impl AppState {
    pub fn new(auth: AuthService, settings: Settings, policy: PasswordPolicy) -> Self {
        Self {
            auth: Arc::new(auth),
            settings: Arc::new(settings),
            policy: Arc::new(policy),
        }
    }
}
