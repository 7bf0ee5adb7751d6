use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use gatehouse::adapters::http_client::install_crypto_provider;
use gatehouse::config::{ConfigValidator, ServerConfig, load_config, port_from_env};
use gatehouse::tracing_setup::init_tracing;
use gatehouse::{build_app, metrics};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Optional YAML configuration; built-in defaults apply without it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };

    init_tracing(config.logging.format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    if let Err(e) = ConfigValidator::validate(&config) {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    install_crypto_provider();

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .listen_addr
            .parse()
            .context("Invalid metrics listen address")?;
        metrics::init_exporter(addr).context("Failed to start Prometheus exporter")?;
    }

    let port = port_from_env(config.port);
    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));

    let app = build_app(config)?;
    let listener = app.bind(addr)?;

    let shutdown = app.shutdown();
    tokio::spawn(async move {
        if let Err(e) = shutdown.run_signal_handler().await {
            tracing::error!("Signal handler failed: {}", e);
        }
    });

    app.serve(listener).await
}
