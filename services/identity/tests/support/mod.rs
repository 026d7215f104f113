//! Shared wiring for the identity integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;

use identity::{
    jwt::{PurposeConfig, TokenCodec, TokenConfig},
    mail::{LogMailer, Notifier},
    models::RegisterRequest,
    oauth::{IdentityProvider, ProviderProfile},
    repositories::{InMemoryAuditLog, InMemoryReferences, InMemoryUserStore},
    service::{AuthDeps, AuthService},
};

pub const PASSWORD: &str = "Secret123";

pub fn token_config() -> TokenConfig {
    let purpose = |secret: &str, ttl: u64| PurposeConfig {
        secret: secret.to_string(),
        ttl,
    };

    TokenConfig {
        access: purpose("test-access-secret", 900),
        refresh: purpose("test-refresh-secret", 7 * 24 * 3600),
        email_verify: purpose("test-email-verify-secret", 7 * 24 * 3600),
        forgot_password: purpose("test-forgot-password-secret", 1800),
    }
}

/// Identity provider answering with a fixed profile; the code `bad` fails
pub struct FakeProvider {
    pub profile: ProviderProfile,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self) -> String {
        "https://accounts.example.com/o/oauth2/auth".to_string()
    }

    async fn fetch_profile(&self, code: &str) -> anyhow::Result<ProviderProfile> {
        if code == "bad" {
            anyhow::bail!("invalid_grant");
        }
        Ok(self.profile.clone())
    }
}

pub struct Harness {
    pub service: AuthService,
    pub users: InMemoryUserStore,
    pub logs: InMemoryAuditLog,
    pub references: InMemoryReferences,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(token_config(), None)
    }

    pub fn with_provider(provider: FakeProvider) -> Self {
        Self::build(token_config(), Some(Arc::new(provider)))
    }

    pub fn build(config: TokenConfig, provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        let users = InMemoryUserStore::new();
        let logs = InMemoryAuditLog::new();
        let references = InMemoryReferences::new();

        let service = AuthService::new(AuthDeps {
            users: Arc::new(users.clone()),
            logs: Arc::new(logs.clone()),
            references: Arc::new(references.clone()),
            tokens: TokenCodec::new(&config).expect("valid token config"),
            notifier: Notifier::new(Arc::new(LogMailer), "http://localhost:3000"),
            provider,
        });

        Self {
            service,
            users,
            logs,
            references,
        }
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        fullname: "Quang Huy".to_string(),
        username: "qhuy".to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
    }
}
