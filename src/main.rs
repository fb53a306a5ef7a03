//! # Fieldbell — operator notification bot
//!
//! Delivers queued field reports to verified operators over Telegram and
//! keeps delivery-group bindings healthy.
//!
//! Usage:
//!   fieldbell                        # Start with ~/.fieldbell/config.toml
//!   fieldbell --config ./dev.toml    # Explicit config file
//!   fieldbell --verbose              # Debug logging

mod bot;
mod commands;

use anyhow::Result;
use clap::Parser;
use fieldbell_core::config::FieldbellConfig;
use fieldbell_dispatch::{DispatchScheduler, GroupLivenessChecker, NotificationDispatcher};
use fieldbell_gateway::AppState;
use fieldbell_store::SqliteRecordStore;
use fieldbell_telegram::client::{TelegramConfig, TelegramGateway};
use fieldbell_verify::{GroupBindingService, SessionStore, VerificationEngine};
use futures::StreamExt;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fieldbell",
    version,
    about = "🔔 Fieldbell — operator notification bot"
)]
struct Cli {
    /// Path to a config file (default: ~/.fieldbell/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the database path
    #[arg(long)]
    db_path: Option<String>,

    /// Override the ingestion HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "fieldbell=debug,tower_http=debug"
    } else {
        "fieldbell=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Config: file (if any) + env override; a missing bot token aborts
    // here, before anything is wired up.
    let mut config = match &cli.config {
        Some(path) => {
            FieldbellConfig::load_from(std::path::Path::new(&shellexpand::tilde(path).to_string()))?
        }
        None => FieldbellConfig::load()?,
    };
    if let Some(db_path) = cli.db_path {
        config.db_path = shellexpand::tilde(&db_path).to_string();
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    config.validate()?;

    let store = Arc::new(SqliteRecordStore::open(std::path::Path::new(
        &config.db_path,
    ))?);
    tracing::info!("💾 Ledger opened at {}", config.db_path);

    let telegram = Arc::new(TelegramGateway::new(TelegramConfig {
        bot_token: config.bot_token.clone(),
        poll_interval: 1,
    }));

    // Startup probe: fail loudly now rather than on the first tick.
    let me = telegram.get_me().await?;
    tracing::info!(
        "🤖 Bot online: @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.first_name
    );

    if let Err(e) = telegram
        .set_my_commands(&[
            ("start", "Verify and connect a group"),
            ("menu", "Show the main menu"),
            ("indexmsg", "Store a report for automatic delivery"),
            ("cancel", "Leave indexing mode"),
            ("status", "Show delivery status"),
        ])
        .await
    {
        tracing::warn!("⚠️ Could not register command menu: {e}");
    }

    // Engines
    let sessions = Arc::new(SessionStore::new());
    let verifier = Arc::new(VerificationEngine::new(
        sessions.clone(),
        store.clone(),
        config.verify.clone(),
    ));
    let groups = Arc::new(GroupBindingService::new(store.clone(), telegram.clone()));
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), telegram.clone()));
    let liveness = Arc::new(GroupLivenessChecker::new(store.clone(), telegram.clone()));
    let scheduler = Arc::new(DispatchScheduler::new(
        dispatcher.clone(),
        liveness,
        config.dispatch.clone(),
    ));

    // Dispatch loop + HTTP ingestion run beside the polling loop.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    if config.http.enabled {
        let state = AppState {
            store: store.clone(),
        };
        let port = config.http.port;
        tokio::spawn(async move {
            if let Err(e) = fieldbell_gateway::serve(state, port).await {
                tracing::error!("❌ Ingestion server failed: {e}");
            }
        });
    }

    let bot = bot::Bot {
        gateway: telegram.clone(),
        store,
        sessions,
        verifier,
        groups,
        dispatcher,
        bot_id: me.id,
    };

    let mut updates = telegram.start_polling();
    tracing::info!("✅ Fieldbell is running — press Ctrl-C to stop");

    loop {
        tokio::select! {
            maybe_update = updates.next() => {
                match maybe_update {
                    Some(update) => bot.handle_update(update).await,
                    None => {
                        tracing::warn!("⚠️ Update stream closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("⏹️ Stop signal received");
                break;
            }
        }
    }

    // Let the in-flight tick finish, then stop ticking.
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    tracing::info!("👋 Fieldbell stopped");
    Ok(())
}
