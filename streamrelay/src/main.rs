mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use streamrelay_core::{logging, Config, RelayRegistry};

use server::RelayServer;

/// Live chat relay server
#[derive(Debug, Parser)]
#[command(name = "streamrelay", version, about)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "STREAMRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("StreamRelay server starting...");
    info!("Upstream base URL: {}", config.upstream.base_url);
    info!("Poll interval: {:?}", config.relay.poll_interval());

    // 4. Create the relay registry shared by all streams
    let registry = Arc::new(RelayRegistry::new(&config));

    // 5. Start the HTTP/WebSocket server and wait for shutdown
    let server = RelayServer::new(config, registry);
    server.start().await?;

    Ok(())
}
