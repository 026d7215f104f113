//! Transactional email: verification and password-reset links
//!
//! Delivery is fire-and-forget. The `Notifier` renders a message and spawns
//! the send; a failed delivery is logged and never fails the request that
//! triggered it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Rendered email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Email delivery abstraction
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error describing why it was not sent
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev mailer that logs the message instead of sending it
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "Email delivery disabled, logging message instead"
        );
        Ok(())
    }
}

/// Mail configuration
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// HTTP endpoint of the mail API; `None` selects the log mailer
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

impl MailConfig {
    /// Create a new MailConfig from environment variables
    ///
    /// # Environment Variables
    /// - `MAIL_API_URL`: mail API endpoint (optional)
    /// - `MAIL_API_KEY`: bearer key for the mail API (optional)
    /// - `MAIL_FROM`: sender address (default: no-reply@localhost)
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".to_string()),
        }
    }

    /// Build the mailer this configuration selects
    pub fn into_mailer(self) -> Result<Arc<dyn Mailer>> {
        match self.api_url {
            Some(api_url) => Ok(Arc::new(HttpMailer::new(api_url, self.api_key, self.from)?)),
            None => Ok(Arc::new(LogMailer)),
        }
    }
}

#[derive(Serialize)]
struct MailApiRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Mailer posting JSON to an HTTP mail API
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build mail HTTP client")?;

        Ok(Self {
            client,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let body = MailApiRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("Mail API request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("Mail API answered {}", response.status());
        }

        Ok(())
    }
}

/// Renders the service's emails and dispatches them in the background
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    client_url: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, client_url: impl Into<String>) -> Self {
        Self {
            mailer,
            client_url: client_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn verify_email_message(&self, to: &str, token: &str) -> EmailMessage {
        let link = format!(
            "{}/auth/verify-email?email_verify_token={}",
            self.client_url, token
        );
        EmailMessage {
            to: to.to_string(),
            subject: "Verify your email".to_string(),
            html: format!(
                "<p>Welcome! Confirm your email address to activate your account.</p>\
                 <p><a href=\"{link}\">Verify email</a></p>"
            ),
        }
    }

    pub fn reset_password_message(&self, to: &str, token: &str) -> EmailMessage {
        let link = format!(
            "{}/auth/verify-forgot-password?forgot_password_token={}",
            self.client_url, token
        );
        EmailMessage {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            html: format!(
                "<p>We received a request to reset your password.</p>\
                 <p><a href=\"{link}\">Reset password</a></p>\
                 <p>If you did not ask for this, you can ignore this email.</p>"
            ),
        }
    }

    pub fn send_verify_email(&self, to: &str, token: &str) {
        self.dispatch(self.verify_email_message(to, token));
    }

    pub fn send_reset_password(&self, to: &str, token: &str) {
        self.dispatch(self.reset_password_message(to, token));
    }

    fn dispatch(&self, message: EmailMessage) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            match mailer.send(&message).await {
                Ok(()) => info!("Sent \"{}\" to {}", message.subject, message.to),
                Err(e) => error!("Failed to send \"{}\" to {}: {:#}", message.subject, message.to, e),
            }
        });
    }
}
