//! Application context: the single instance of every long-lived component.
//!
//! Built once at startup and passed by reference; there are no globals.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::core::addresses::{self, AddressReport};
use crate::core::lifecycle::{self, Lifecycle, LifecycleError};
use crate::ports::bare::BareProxy;
use crate::ports::http_client::HttpClient;
use crate::ports::http_server::HttpServer;
use crate::utils::graceful_shutdown::GracefulShutdown;

pub struct AppContext {
    config: Arc<ServerConfig>,
    server: Arc<dyn HttpServer>,
    bare: Option<Arc<dyn BareProxy>>,
    http_client: Arc<dyn HttpClient>,
    shutdown: Arc<GracefulShutdown>,
    lifecycle: Arc<Lifecycle>,
}

impl AppContext {
    pub fn new(
        config: Arc<ServerConfig>,
        server: Arc<dyn HttpServer>,
        bare: Option<Arc<dyn BareProxy>>,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            config,
            server,
            bare,
            http_client,
            shutdown: Arc::new(GracefulShutdown::new()),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown(&self) -> Arc<GracefulShutdown> {
        self.shutdown.clone()
    }

    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        self.lifecycle.clone()
    }

    /// Bind the listener. A failure terminates the lifecycle for good.
    pub fn bind(&self, addr: SocketAddr) -> Result<TcpListener, LifecycleError> {
        match lifecycle::bind_dual_stack(addr) {
            Ok(listener) => {
                self.lifecycle.mark_listening()?;
                Ok(listener)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.lifecycle.mark_terminated();
                Err(e)
            }
        }
    }

    /// Serve until shutdown, then close the bare engine and terminate.
    ///
    /// The public IP lookup runs detached and never delays the listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.lifecycle.ensure_listening()?;
        let port = listener.local_addr()?.port();
        AddressReport::new(port, addresses::local_hostname()).log();

        if self.config.public_ip.enabled {
            addresses::spawn_public_ip_lookup(
                self.http_client.clone(),
                self.config.public_ip.clone(),
                port,
            );
        }

        let token = self.shutdown.shutdown_token();
        let served = self.server.run(listener, token).await;

        if self.lifecycle.begin_shutdown() {
            if let Some(bare) = &self.bare {
                bare.close();
            }
        }
        self.lifecycle.mark_terminated();
        served
    }
}
