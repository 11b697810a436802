//! pathscope - Monte Carlo renderer debugging server
//!
//! Serves the bundled demo renderer over the pathscope protocol.

mod demo;

use clap::Parser;
use demo::{DemoRenderer, EchoPlugin};
use pathscope_server::{Config, Server, SessionController};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pathscope")]
#[command(about = "Renderer debugging server with a bundled demo path tracer")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "PATHSCOPE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration before logging so the configured level applies
    let loaded = Config::load_from(args.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let config = match loaded {
        Ok(c) => {
            if let Some(path) = &args.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting pathscope server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Render system: {}", config.session.render_system);
    tracing::info!(
        "  Demo scene: {} ({}x{}, {} spp, depth {})",
        config.demo.scene_name,
        config.demo.width,
        config.demo.height,
        config.demo.sample_count,
        config.demo.max_depth
    );
    tracing::info!("  Output: {}", config.demo.output_path.display());

    let renderer = DemoRenderer::new(config.demo.clone());
    let controller = SessionController::new(Box::new(renderer), config.session.render_system)
        .with_plugin(Box::new(EchoPlugin::new()))?;
    tracing::info!("  Plugins: {:?}", controller.plugins().ids());

    let server = Arc::new(Server::new(config.server_config(), controller));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until QUIT or shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
