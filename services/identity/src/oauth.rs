//! OAuth2 integration for Google sign-in

use anyhow::{Context, Result};
use async_trait::async_trait;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl, basic::BasicClient,
};
use serde::Deserialize;
use tracing::info;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// OAuth2 configuration for a provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl OAuthConfig {
    /// Read the Google client from the environment. Returns `None` when
    /// any of `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`,
    /// `GOOGLE_REDIRECT_URI` is unset, which disables Google login.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Some(Self {
            client_id: var("GOOGLE_CLIENT_ID")?,
            client_secret: var("GOOGLE_CLIENT_SECRET")?,
            redirect_url: var("GOOGLE_REDIRECT_URI")?,
        })
    }
}

/// What the provider tells us about the person signing in
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub email: String,
    pub name: String,
    pub verified_email: bool,
}

/// External identity provider seam used by the login flow
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent-screen URL the browser is sent to
    fn authorize_url(&self) -> String;

    /// Exchange an authorization code for the signed-in profile
    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile>;
}

/// Google user profile response
#[derive(Debug, Deserialize)]
struct GoogleUser {
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

impl GoogleUser {
    fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            self.email.split('@').next().unwrap_or_default().to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Google OAuth2 client
#[derive(Clone)]
pub struct GoogleOAuth {
    client: BasicClient,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url)?);

        Ok(Self {
            client,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuth {
    fn authorize_url(&self) -> String {
        let (auth_url, _csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();

        auth_url.to_string()
    }

    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile> {
        info!("Exchanging Google authorization code");

        let token_response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .context("Failed to exchange authorization code")?;

        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token_response.access_token().secret())
            .send()
            .await
            .context("Failed to reach Google userinfo endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to get Google user profile: {}", response.status());
        }

        let google_user: GoogleUser = response
            .json()
            .await
            .context("Malformed Google user profile")?;

        Ok(ProviderProfile {
            name: google_user.display_name(),
            email: google_user.email,
            verified_email: google_user.verified_email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallbacks() {
        let user: GoogleUser = serde_json::from_str(
            r#"{"email":"ada@example.com","verified_email":true,"name":"Ada Lovelace"}"#,
        )
        .unwrap();
        assert_eq!(user.display_name(), "Ada Lovelace");

        let user: GoogleUser = serde_json::from_str(
            r#"{"email":"ada@example.com","given_name":"Ada","family_name":"King"}"#,
        )
        .unwrap();
        assert_eq!(user.display_name(), "Ada King");
        assert!(!user.verified_email);

        let user: GoogleUser = serde_json::from_str(r#"{"email":"ada@example.com"}"#).unwrap();
        assert_eq!(user.display_name(), "ada");
    }

    #[test]
    fn test_authorize_url_carries_client_and_scopes() {
        let google = GoogleOAuth::new(OAuthConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:8002/google".to_string(),
        })
        .unwrap();

        let url = google.authorize_url();
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("email"));
    }
}
