use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::adapters::bare::BareServer;
use crate::adapters::file_system::TowerFileSystem;
use crate::adapters::http::HyperServer;
use crate::adapters::http_client::HyperHttpClient;
use crate::adapters::wisp::WispServer;
use crate::config::ServerConfig;
use crate::core::{AppContext, Dispatcher, MountTable, StaticAssetServer};
use crate::ports::bare::BareProxy;
use crate::ports::http_client::HttpClient;

/// Wire the production adapters into an application context.
pub fn build_app(config: ServerConfig) -> Result<AppContext> {
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HyperHttpClient::new().context("Failed to create outbound HTTP client")?);

    let mounts = MountTable::from_config(&config.mounts);
    for mount in mounts.mounts() {
        tracing::debug!(prefix = %mount.prefix, root = %mount.root, "Static mount");
    }
    let assets = StaticAssetServer::new(mounts, Arc::new(TowerFileSystem::new()));
    let mut dispatcher = Dispatcher::new(assets);

    let bare: Option<Arc<dyn BareProxy>> = if config.bare.enabled {
        tracing::debug!(directory = %config.bare.directory, "Bare engine enabled");
        let bare_client = HyperHttpClient::guarded(config.bare.block_local)
            .context("Failed to create bare outbound HTTP client")?;
        Some(Arc::new(BareServer::new(
            config.bare.clone(),
            Arc::new(bare_client),
        )))
    } else {
        None
    };
    if let Some(bare) = &bare {
        dispatcher = dispatcher.with_bare(bare.clone());
    }

    if config.tunnel.enabled {
        tracing::debug!(suffix = %config.tunnel.suffix, "Tunnel engine enabled");
        dispatcher = dispatcher.with_tunnel(
            Arc::new(WispServer::new(config.tunnel.clone())),
            config.tunnel.suffix.clone(),
        );
    }

    let server = Arc::new(HyperServer::new(
        Arc::new(dispatcher),
        Duration::from_secs(config.shutdown.drain_timeout_secs),
    ));

    Ok(AppContext::new(Arc::new(config), server, bare, http_client))
}
