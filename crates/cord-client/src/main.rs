//! `cord` entry point
//!
//! Run with:
//! ```bash
//! BOT_TOKEN=... cargo run -p cord-client
//! ```
//!
//! Configuration is loaded from environment variables and an optional `.env`.

use anyhow::Context;
use cord_client::Client;
use cord_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Client exited with an error");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(config.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.env,
        intents = config.intents,
        shard_count = ?config.shard_count,
        "Configuration loaded"
    );

    let client = Client::new(&config)?;
    client.events().add_listener("READY".to_string(), |event| async move {
        info!(shard_id = event.shard_id, "Shard reported READY");
    });

    tokio::select! {
        result = client.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            info!("Shutdown requested");
            client.close();
        }
    }

    Ok(())
}
