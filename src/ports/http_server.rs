use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use tokio::net::TcpListener;

use crate::utils::graceful_shutdown::ShutdownToken;

/// Type alias for HTTP server run futures
pub type ServerRunFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// HttpServer defines the port (interface) for the accept loop
pub trait HttpServer: Send + Sync + 'static {
    /// Serve connections from `listener` until `shutdown` fires
    ///
    /// # Returns
    /// A future that resolves once the listener is closed and in-flight
    /// connections have drained (or the drain timeout passed)
    fn run<'a>(&'a self, listener: TcpListener, shutdown: ShutdownToken) -> ServerRunFuture<'a>;
}
