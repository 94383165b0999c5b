// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use rtsp_topology::Config;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "rtsp-topology")]
#[command(about = "Build media pipeline topologies and serve them over RTSP on demand")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/rtsp-topology/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a topology description and print its structure
    Check {
        /// Topology description (JSON)
        file: PathBuf,

        /// Print the structure as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a topology and simulate one viewer on every stream
    Simulate {
        /// Topology description (JSON)
        file: PathBuf,
    },

    /// Run the topology and serve its streams until interrupted
    #[cfg(feature = "gst")]
    Serve {
        /// Topology description (JSON)
        file: PathBuf,

        /// RTSP port (overrides the config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    // Initialize logging
    // RUST_LOG takes precedence over the configured filter
    // Examples: RUST_LOG=debug, RUST_LOG=rtsp_topology=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::Check { file, json } => cli::check(&file, &config, json),
        Commands::Simulate { file } => cli::simulate(&file, &config).await,
        #[cfg(feature = "gst")]
        Commands::Serve { file, port } => cli::serve(&file, &config, port).await,
    }
}
