//! WISP v1 tunnel engine.
//!
//! # Data Flow
//! ```text
//! client ──WebSocket──▶ session ──┬─ stream 1 ──TCP──▶ remote
//!                                 ├─ stream 2 ──UDP──▶ remote
//!                                 └─ ...
//! ```
//!
//! One WebSocket carries many streams; each frame names its stream id.
//! TCP streams use CONTINUE packets for flow control, UDP streams do not.

pub mod packet;
pub mod session;

use std::sync::Arc;

use axum::body::Body;
use hyper::Request;

use crate::adapters::websocket;
use crate::config::TunnelConfig;
use crate::ports::tunnel::{TunnelEngine, TunnelResponseFuture};

pub use packet::{CloseReason, Packet, PacketError, Payload, StreamType};

pub struct WispServer {
    config: Arc<TunnelConfig>,
}

impl WispServer {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl TunnelEngine for WispServer {
    fn route_request<'a>(&'a self, mut req: Request<Body>) -> TunnelResponseFuture<'a> {
        Box::pin(async move {
            let (response, on_upgrade) = match websocket::accept(&mut req, None) {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::debug!(path = %req.uri().path(), "Rejecting WISP handshake: {}", e);
                    return e.into_response();
                }
            };

            let config = self.config.clone();
            tokio::spawn(async move {
                match websocket::server_socket(on_upgrade).await {
                    Ok(socket) => session::run(socket, config).await,
                    Err(e) => tracing::debug!("WISP upgrade failed: {}", e),
                }
            });

            response
        })
    }
}
