use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::core::dispatcher::Dispatcher;
use crate::metrics;
use crate::ports::http_server::{HttpServer, ServerRunFuture};
use crate::utils::graceful_shutdown::ShutdownToken;

/// Accept loop feeding every connection to the dispatcher.
///
/// HTTP/1.1 and HTTP/2 are negotiated per connection; upgrades stay enabled
/// so engines can take the socket over through `hyper::upgrade::on`.
pub struct HyperServer {
    dispatcher: Arc<Dispatcher>,
    drain_timeout: Duration,
}

impl HyperServer {
    pub fn new(dispatcher: Arc<Dispatcher>, drain_timeout: Duration) -> Self {
        Self {
            dispatcher,
            drain_timeout,
        }
    }

    async fn drain(&self, mut connections: JoinSet<()>) {
        if connections.is_empty() {
            return;
        }
        if self.drain_timeout.is_zero() {
            tracing::debug!(open = connections.len(), "Dropping open connections");
            connections.abort_all();
            return;
        }

        tracing::info!(open = connections.len(), "Draining connections");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "Connection drain timeout ({:?}) exceeded, aborting remaining",
                self.drain_timeout
            );
            connections.abort_all();
        }
    }
}

impl HttpServer for HyperServer {
    fn run<'a>(&'a self, listener: TcpListener, mut shutdown: ShutdownToken) -> ServerRunFuture<'a> {
        Box::pin(async move {
            let builder = auto::Builder::new(TokioExecutor::new());
            let mut connections = JoinSet::new();

            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::warn!("Failed to accept connection: {}", e);
                                continue;
                            }
                        };
                        metrics::increment_connections();

                        let dispatcher = self.dispatcher.clone();
                        let service = ServiceBuilder::new()
                            .layer(
                                TraceLayer::new_for_http()
                                    .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
                            )
                            .service_fn(move |req: Request<Incoming>| {
                                let dispatcher = dispatcher.clone();
                                async move { dispatcher.dispatch(req.map(Body::new)).await }
                            });
                        let builder = builder.clone();

                        connections.spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = TowerToHyperService::new(service);
                            if let Err(e) = builder.serve_connection_with_upgrades(io, service).await {
                                tracing::debug!(%peer, "Connection ended: {}", e);
                            }
                        });
                    }
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    reason = shutdown.cancelled() => {
                        tracing::info!(?reason, "Stopped accepting connections");
                        break;
                    }
                }
            }

            drop(listener);
            self.drain(connections).await;
            Ok(())
        })
    }
}
