use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use common::{database::DatabaseConfig, telemetry::init_tracing};
use identity::{
    AppState, database,
    jwt::{TokenCodec, TokenConfig},
    mail::{MailConfig, Notifier},
    oauth::{GoogleOAuth, IdentityProvider, OAuthConfig},
    password::PasswordPolicy,
    repositories::{PgAuditLog, PgReferenceChecker, PgUserStore},
    routes,
    service::{AuthDeps, AuthService},
    settings::Settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log_filter)?;

    info!("Starting identity service");

    // Initialize database connection pool and schema
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::connect(&db_config)
        .await
        .context("Failed to prepare database")?;
    info!("Database connection successful");

    let token_config = TokenConfig::from_env()?;
    let tokens = TokenCodec::new(&token_config)?;

    let mailer = MailConfig::from_env().into_mailer()?;
    let notifier = Notifier::new(mailer, settings.client_url.clone());

    let provider: Option<Arc<dyn IdentityProvider>> = match OAuthConfig::from_env() {
        Some(config) => Some(Arc::new(GoogleOAuth::new(config)?)),
        None => {
            warn!("Google OAuth is not configured, Google login is disabled");
            None
        }
    };

    let auth = AuthService::new(AuthDeps {
        users: Arc::new(PgUserStore::new(pool.clone())),
        logs: Arc::new(PgAuditLog::new(pool.clone())),
        references: Arc::new(PgReferenceChecker::new(pool)),
        tokens,
        notifier,
        provider,
    });

    let bind_addr = settings.bind_addr.clone();
    let app = routes::create_router(AppState::new(auth, settings, PasswordPolicy::default()));

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Identity service listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
