//! RSVP ledger service - Entry point.

use anyhow::Context;
use rsvp_ledger::{
    api::{create_router_with_rate_limit, AppState, RateLimitState},
    config::{Config, LogConfig, LogFormat},
    store::{EncryptedFileStore, Store},
    RetryPolicy, RosterSource, RsvpService,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    init_logging(&config.log);

    info!("Starting RSVP ledger");

    let roster = RosterSource::open(config.roster.path.clone(), config.roster.policy)
        .await
        .context("Failed to load attendee roster")?;
    let roster = Arc::new(roster);
    watch_roster(&roster)?;

    // Initialize storage
    let store = match (config.store.persist, &config.store.passphrase) {
        (true, Some(passphrase)) => {
            info!(path = %config.store.path.display(), "Using encrypted ledger storage");
            Store::encrypted(EncryptedFileStore::from_passphrase(
                config.store.path.clone(),
                passphrase,
            ))
        }
        _ => {
            warn!("Persistence disabled, using in-memory ledgers (data will be lost on restart)");
            Store::memory()
        }
    };

    let service = RsvpService::new(roster, Arc::new(store)).with_retry(RetryPolicy {
        max_attempts: config.ledger.max_attempts,
        backoff: config.ledger.retry_backoff,
    });

    let state = AppState::new(service);
    let rate_limit = RateLimitState::new(config.rate_limit.global_per_minute);
    let app = create_router_with_rate_limit(state, rate_limit);

    let listen_addr = config
        .server
        .listen_addr
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid listen address: {}", config.server.listen_addr))?;
    let addr = SocketAddr::new(listen_addr, config.server.port);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("RSVP ledger stopped");
    Ok(())
}

/// Cached rosters are refreshed on SIGHUP.
#[cfg(unix)]
fn watch_roster(roster: &Arc<RosterSource>) -> anyhow::Result<()> {
    if roster.policy() == rsvp_ledger::RosterPolicy::Startup {
        roster
            .clone()
            .reload_on_hangup()
            .context("Failed to install SIGHUP handler")?;
        info!("Send SIGHUP to reload the attendee roster");
    }
    Ok(())
}

#[cfg(not(unix))]
fn watch_roster(_roster: &Arc<RosterSource>) -> anyhow::Result<()> {
    Ok(())
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
