mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use chrono::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use eventmaster_api::mailer::{LogMailer, Mailer, SmtpMailer};
use eventmaster_api::payments::{NoPayments, PaymentGateway, StripeGateway};
use eventmaster_api::{AppState, AppStateInner, Settings};
use eventmaster_db::{MemStorage, SqliteStorage, Storage};

use crate::config::{Config, StorageKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eventmaster=debug,eventmaster_api=debug,eventmaster_db=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set EVENTMASTER_SESSION_SECRET to a random string of 32+ characters.");
            std::process::exit(1);
        }
    };

    // Storage
    let pending_hold = Duration::minutes(config.pending_hold_minutes);
    let storage: Arc<dyn Storage> = match config.storage {
        StorageKind::Sqlite => {
            info!("Using SQLite storage at {}", config.db_path.display());
            Arc::new(SqliteStorage::open(&config.db_path)?.with_pending_hold(pending_hold))
        }
        StorageKind::Memory => {
            warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemStorage::new().with_pending_hold(pending_hold))
        }
    };
    if config.seed {
        eventmaster_db::seed::seed_demo_events(storage.as_ref())?;
    }

    // Outbound integrations
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!("Email via SMTP relay {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(
                &smtp.host,
                smtp.port,
                smtp.username.clone(),
                smtp.password.clone(),
                &smtp.from,
            )?)
        }
        None => {
            info!("SMTP not configured; emails will only be logged");
            Arc::new(LogMailer)
        }
    };
    let payments: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeGateway::new(key.clone())),
        None => {
            info!("STRIPE_SECRET_KEY not set; bookings are confirmed without payment");
            Arc::new(NoPayments)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        storage,
        mailer,
        payments,
        settings: Settings {
            session_secret: config.session_secret.clone(),
            session_ttl_hours: config.session_ttl_hours,
            cookie_secure: config.cookie_secure,
            first_user_admin: config.first_user_admin,
            currency: config.currency.clone(),
            admin_email: config.admin_email.clone(),
        },
    });

    let app = eventmaster_api::router(state)
        .layer(cors_layer(config.cors_origin.as_deref())?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("EventMaster listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Cookies only cross origins when a single trusted origin is configured.
fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Ok(match origin {
        Some(origin) => layer
            .allow_origin(AllowOrigin::exact(HeaderValue::from_str(origin)?))
            .allow_credentials(true),
        None => layer.allow_origin(AllowOrigin::any()),
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
