//! MailWarden - Campaign delivery server entry point

use anyhow::{Context, Result};
use mailwarden_api::AppState;
use mailwarden_common::config::{Config, LoggingConfig};
use mailwarden_core::{
    CampaignScheduler, DryRunTransport, LoggingUsageMeter, MailTransport, SmtpTransport,
};
use mailwarden_storage::{DatabasePool, MemoryStore, Repositories};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting MailWarden server...");

    if config.tracking.uses_default_secret() {
        warn!(
            require_signature = config.unsubscribe.require_signature,
            "tracking.signing_secret is the built-in default; unsubscribe links can be forged"
        );
    }

    // Initialize storage
    let repos = match config.database.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory store; data is lost on shutdown");
            Repositories::memory(Arc::new(MemoryStore::new()))
        }
        _ => {
            let db_pool = DatabasePool::new(&config.database).await?;
            db_pool.migrate().await?;
            Repositories::postgres(db_pool)
        }
    };

    // Initialize transport
    let transport: Arc<dyn MailTransport> = if config.smtp.dry_run {
        warn!("SMTP dry run enabled; no mail will be delivered");
        Arc::new(DryRunTransport::new(config.server.hostname.clone()))
    } else {
        Arc::new(SmtpTransport::new(
            config.server.hostname.clone(),
            Duration::from_secs(config.smtp.timeout_secs),
        ))
    };

    let state = AppState::new(
        repos.clone(),
        config.clone(),
        transport,
        Arc::new(LoggingUsageMeter),
    )?;
    let shutdown = CancellationToken::new();

    // Start scheduled campaign worker if enabled
    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = CampaignScheduler::new(repos, state.orchestrator.clone())
            .with_poll_interval(config.scheduler.poll_interval_secs);
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            scheduler.run(shutdown).await;
        }))
    } else {
        info!("Campaign scheduler disabled");
        None
    };

    // Start API server
    let api_handle = {
        let app = mailwarden_api::create_router(state);
        let bind = format!("{}:{}", config.server.bind_address, config.api.port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("Failed to bind API server to {}", bind))?;
        info!("Starting API server on {}", bind);

        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    info!("MailWarden server started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    if let Err(e) = api_handle.await {
        warn!("API server task ended abnormally: {}", e);
    }
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }

    info!("MailWarden server shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailwarden=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
