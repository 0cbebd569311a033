// Game server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (copying defaults on first run)
// 3. Build the session
// 4. Bind the listener and spawn the WebSocket server task
// 5. Spawn the app loop that owns the session
// 6. Wait for Ctrl+C, then shut down

use anyhow::Context;
use gerry_core::session::GameManager;
use gerry_server::app::{self, AppCommand};
use gerry_server::config;
use gerry_server::ws_server::{self, ADMIN_PATH, PLAYER_PATH};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("Game server starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} seats, {} rounds ({})",
        config.game.seat_count,
        config.rounds.len(),
        config
            .rounds
            .iter()
            .map(|r| r.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let manager = GameManager::new(config.game.clone(), config.rounds.clone())
        .context("failed to create game session")?;

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);

    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, ws_tx).await {
            error!("WebSocket server error: {}", e);
        }
    });

    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, cmd_rx, manager).await {
            error!("Application loop error: {}", e);
        }
    });

    info!(
        "Ready: players on ws://{bind_addr}{PLAYER_PATH}, admin on ws://{bind_addr}{ADMIN_PATH}"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Ctrl+C received, shutting down");
            let _ = cmd_tx.send(AppCommand::Shutdown).await;
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), &mut app_handle).await;
        }
        _ = &mut app_handle => {
            info!("Application loop ended");
        }
    }

    // The accept loop runs until its channel closes; don't wait for a client.
    ws_handle.abort();

    info!("Game server shut down cleanly");
    Ok(())
}

/// Initialize tracing to stderr. `RUST_LOG` overrides the default filter.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gerry_server=info,gerry_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
