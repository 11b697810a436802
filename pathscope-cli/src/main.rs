//! pathscope-cli - Command-line client for pathscope
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use pathscope_client::{Client, ConnectionConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pathscope-cli")]
#[command(about = "Command-line client for the pathscope render debugging server")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:50013", env = "PATHSCOPE_SERVER")]
    server: SocketAddr,

    /// Connection timeout in milliseconds
    #[arg(long, default_value = "10000")]
    connect_timeout_ms: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Show render information (scene, output file, sample count)
    Info,

    /// Set the renderer's sample count
    Samples {
        /// Samples per pixel
        count: i32,
    },

    /// Render the full image on the server
    Render,

    /// Fetch the camera and scene objects
    Scene {
        /// Stop waiting after this many milliseconds without a record
        #[arg(long, default_value = "200")]
        idle_ms: u64,
    },

    /// Trace one pixel and print every recorded path
    Pixel {
        x: i32,
        y: i32,
        /// Number of samples to trace
        #[arg(default_value = "1")]
        samples: i32,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the plugins the server announced
    Plugins,

    /// Stop the server
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConnectionConfig::new(cli.server)
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms));

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(config).await?;
        }
        Some(cmd) => {
            let mut client = Client::connect_with(config).await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            if cmd == Commands::Quit {
                client.quit().await?;
                println!("{}", "Server stopped".green());
                return Ok(());
            }

            match commands::execute(&mut client, cmd).await {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.disconnect().await?;
        }
    }

    Ok(())
}
