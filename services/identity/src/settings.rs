//! Service settings
//!
//! Loaded from an optional `identity.toml` next to the binary, overridden by
//! `IDENTITY_*` environment variables (`IDENTITY_BIND_ADDR`,
//! `IDENTITY_CLIENT_URL`, ...). Secrets are not part of the settings; token,
//! mail and OAuth credentials are read by their own modules.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

fn default_bind_addr() -> String {
    "0.0.0.0:8002".to_string()
}

fn default_log_filter() -> String {
    "identity=info,common=info,tower_http=info".to_string()
}

fn default_client_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_redirect_verify_email() -> String {
    "http://localhost:3000/auth/verify-email/success".to_string()
}

fn default_redirect_reset_password() -> String {
    "http://localhost:3000/auth/reset-password".to_string()
}

fn default_redirect_google_login() -> String {
    "http://localhost:3000/auth/login/oauth".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Default `EnvFilter` directives; `RUST_LOG` still wins
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Front-end base URL used in email links
    #[serde(default = "default_client_url")]
    pub client_url: String,
    /// Where a successful email verification lands
    #[serde(default = "default_redirect_verify_email")]
    pub redirect_verify_email: String,
    /// Where a valid reset link lands
    #[serde(default = "default_redirect_reset_password")]
    pub redirect_reset_password: String,
    /// Where a Google login lands
    #[serde(default = "default_redirect_google_login")]
    pub redirect_google_login: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_filter: default_log_filter(),
            client_url: default_client_url(),
            redirect_verify_email: default_redirect_verify_email(),
            redirect_reset_password: default_redirect_reset_password(),
            redirect_google_login: default_redirect_google_login(),
        }
    }
}

impl Settings {
    /// Load `identity.toml` (optional) and `IDENTITY_*` overrides
    pub fn load() -> Result<Self> {
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("identity").required(false))
                .add_source(Environment::with_prefix("IDENTITY")),
        )
    }

    fn from_config(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_apply_without_sources() {
        let settings = Settings::from_config(Config::builder()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_addr, "0.0.0.0:8002");
    }

    #[test]
    #[serial]
    fn test_file_values_override_defaults() {
        let builder = Config::builder().add_source(File::from_str(
            r#"
            bind_addr = "127.0.0.1:9000"
            client_url = "https://shop.example.com"
            "#,
            FileFormat::Toml,
        ));

        let settings = Settings::from_config(builder).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:9000");
        assert_eq!(settings.client_url, "https://shop.example.com");
        assert_eq!(settings.log_filter, default_log_filter());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        unsafe {
            std::env::set_var("IDENTITY_REDIRECT_GOOGLE_LOGIN", "https://shop.example.com/oauth");
        }

        let settings = Settings::load().unwrap();
        assert_eq!(settings.redirect_google_login, "https://shop.example.com/oauth");

        unsafe {
            std::env::remove_var("IDENTITY_REDIRECT_GOOGLE_LOGIN");
        }
    }
}
