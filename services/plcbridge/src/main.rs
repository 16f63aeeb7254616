//! PLC bridge service
//!
//! Startup: config, logging, components, warm-up connect, poller, command
//! writer, HTTP server. Shutdown on Ctrl+C/SIGTERM runs in reverse.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use plcbridge::api::create_api_routes;
use plcbridge::core::bootstrap::{self, Args, Bridge};
use plcbridge::core::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    common::logging::init_with_config(&bootstrap::log_config(&config, &args))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if args.validate {
        info!(
            "Configuration valid: {} stations, {} buttons, servo {}",
            config.stations.len(),
            config.buttons.len(),
            config.servo.id
        );
        return Ok(());
    }

    let bind_address = bootstrap::determine_bind_address(
        args.bind_address.clone(),
        &config.service.api.host,
        config.service.api.port,
    );
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", bind_address))?;

    let connector = bootstrap::connector_for(&config.plc);
    let bridge = Bridge::assemble(config, connector).context("Failed to assemble bridge")?;
    let state = bridge.app_state();
    let access = bridge.access.clone();

    if let Err(e) = access.warm_up().await {
        warn!("Controller not reachable at startup, will retry on first use: {e}");
    }

    let shutdown_token = CancellationToken::new();
    let poller_handle = tokio::spawn(bridge.poller.run(shutdown_token.child_token()));
    let writer_token = CancellationToken::new();
    let writer_handle = tokio::spawn(bridge.writer.run(writer_token.clone()));

    let app = create_api_routes(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("API server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let server_token = shutdown_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let signal = common::shutdown::wait_for_shutdown().await;
        info!("{signal} received, shutting down");
        server_token.cancel();
    });
    if let Err(e) = server.await {
        error!("API server error: {e}");
    }

    // server has stopped taking requests: stop polling, then drain pulses
    shutdown_token.cancel();
    if let Err(e) = poller_handle.await {
        error!("Poller task failed: {e}");
    }
    writer_token.cancel();
    if let Err(e) = writer_handle.await {
        error!("Command writer task failed: {e}");
    }
    access.close().await;

    info!("plcbridge stopped");
    Ok(())
}
