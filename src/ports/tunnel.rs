use axum::body::Body;
use hyper::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// Type alias for tunnel handshake responses
pub type TunnelResponseFuture<'a> = Pin<Box<dyn Future<Output = Response<Body>> + Send + 'a>>;

/// TunnelEngine is the port for the multiplexing tunnel.
///
/// The engine answers the upgrade handshake and, when it accepts, takes the
/// upgraded connection. Bytes the client sent right after the handshake stay
/// buffered in the upgraded I/O and reach the engine first.
pub trait TunnelEngine: Send + Sync + 'static {
    fn route_request<'a>(&'a self, req: Request<Body>) -> TunnelResponseFuture<'a>;
}
