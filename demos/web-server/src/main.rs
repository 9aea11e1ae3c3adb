//! shellgate server: target registry, session broker and web terminal.
//!
//! Run with: cargo run -p shellgate-web -- --targets targets.toml
//!
//! Then `POST /api/sessions` and open the returned attach URL.

mod api;
mod cli;
mod logging;
mod page;
mod targets_file;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use shellgate_core::RemoteConnector;
use shellgate_session::{AuthSessions, SessionManager, TargetRegistry};
use shellgate_ssh::SshConnector;
use shellgate_transport::Bridge;

use crate::{api::AppState, cli::Args};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let storage = args.storage.open().await.context("failed to open storage")?;
    let registry = TargetRegistry::new(Arc::clone(&storage));

    if let Some(path) = &args.targets {
        let count = targets_file::seed(&registry, path).await?;
        tracing::info!(count, path = %path.display(), "Seeded targets");
    }

    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&storage),
        args.session_config(),
    ));
    let auth = Arc::new(AuthSessions::new(Arc::clone(&storage)));
    let connector: Arc<dyn RemoteConnector> = Arc::new(SshConnector::new(args.ssh_config()));
    let bridge = Bridge::new(Arc::clone(&sessions), connector, args.bridge_config());

    let pruner = auth.spawn_pruner(args.token_prune_interval());
    let sweeper = Arc::clone(&sessions).spawn_sweeper(SWEEP_INTERVAL);

    let app = api::router(AppState { registry, sessions }, bridge);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!("Server listening on http://{}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pruner.abort();
    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
