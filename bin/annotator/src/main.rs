//! # Annotator Binary
//!
//! Assembles the application from the plugins selected by compile-time
//! features and serves the annotation API.

mod mailer;

use an_api::AppState;
use an_config::Settings;
use an_core::session::SessionSigner;
use an_core::{AnnotationService, ServiceConfig};
use chrono::Utc;
use mailer::LogMailer;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Feature-gated imports
#[cfg(feature = "db-sqlite")]
use an_db_sqlite::SqliteStore;

#[cfg(feature = "auth-simple")]
use an_auth_simple::{AesEmailCipher, SimpleAuth};

#[cfg(not(all(feature = "db-sqlite", feature = "auth-simple")))]
compile_error!("annotator needs a store and an auth plugin: enable `db-sqlite` and `auth-simple`");

const CLEANUP_EVERY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ANNOTATOR_LOG_JSON").is_ok_and(|v| v == "1");
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn service_config(settings: &Settings) -> ServiceConfig {
    ServiceConfig {
        site_name: settings.site.name.clone(),
        site_base_url: settings.site.base_url.clone(),
        allow_outside_collaborators: settings.collaboration.allow_outside_collaborators,
        search_max_results: settings.search.max_results,
        auto_delete_enabled: settings.cleanup.auto_delete_enabled,
        auto_delete_months: settings.auto_delete_months(),
    }
}

/// Runs the maintenance sweep at startup and then weekly.
fn spawn_cleanup(service: Arc<AnnotationService>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_EVERY);
        loop {
            ticker.tick().await;
            if let Err(err) = service.cleanup(Utc::now()).await {
                error!(error = %err, "cleanup failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::load()?;
    let secret = settings.security.server_secret.expose_secret();

    // 1. Store, user directory and inbox
    #[cfg(feature = "db-sqlite")]
    let store = Arc::new(SqliteStore::new(&settings.database.url).await?);

    // 2. Authentication and email encryption
    #[cfg(feature = "auth-simple")]
    let (auth, cipher) = (Arc::new(SimpleAuth::new(secret)), Arc::new(AesEmailCipher::new(secret)));

    let service = Arc::new(AnnotationService::new(
        store.clone(),
        store.clone(),
        cipher,
        Arc::new(LogMailer),
        store,
        SessionSigner::new(secret, settings.session_days()),
        service_config(&settings),
    ));
    spawn_cleanup(service.clone());

    let app = an_api::router(AppState {
        service,
        auth,
        cookie_secure: settings.server.cookie_secure,
    });

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    info!(bind = %settings.server.bind, site = %settings.site.name, "annotator listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
