//! Watch command - development server with live reload

use std::{path::Path, time::Duration};

use color_eyre::eyre::{Result, WrapErr};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};

use crate::{
    server::{ServerState, create_router},
    watch::{DevSite, SiteBuilder, SourceWatcher, WatchLoop, error_message, load_dev_config},
};

/// Run the watch command.
///
/// Builds once, then serves the output while rebuilding on every change.
pub async fn run(
    config_path: &Path,
    port: Option<u16>,
    host: Option<String>,
    open_browser: bool,
) -> Result<()> {
    let config = load_dev_config(config_path)?;
    let host = host.unwrap_or_else(|| config.dev.host.clone());
    let port = port.unwrap_or(config.dev.port);
    let debounce = Duration::from_millis(config.dev.debounce_ms);
    let output_dir = config.output_dir();
    tracing::info!(?config_path, %host, port, "Starting watch mode");

    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, _) = broadcast::channel(64);
    let watcher = SourceWatcher::spawn(&config, config_path, command_tx.clone())?;

    // A failed first build keeps the server up; the next edit retries.
    let mut site = DevSite::new(config_path, config)?.with_watcher(watcher);
    match site.build() {
        Ok(report) => println!(
            "  ✓ Built {} posts and {} pages in {}ms",
            report.posts, report.pages, report.elapsed_ms
        ),
        Err(e) => eprintln!("  ✗ Initial build failed: {}", error_message(&e)),
    }

    let watch = WatchLoop::new(site, command_rx, event_tx.clone(), debounce);
    let state = ServerState {
        events: event_tx,
        commands: command_tx,
        status: watch.status(),
    };
    tokio::spawn(watch.run());

    let app = create_router(&output_dir, state);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    println!();
    println!("  Dev server running at http://{addr}");
    println!("  Press Ctrl+C to stop");
    println!();

    if open_browser {
        let _ = open::that(format!("http://{addr}"));
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .wrap_err("Server error")?;

    Ok(())
}
