use axum::body::Body;
use hyper::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// Type alias for responses produced by the bare engine
pub type BareResponseFuture<'a> = Pin<Box<dyn Future<Output = Response<Body>> + Send + 'a>>;

/// BareProxy is the port for the bare request-forwarding engine.
///
/// Once a request is handed over the engine owns it completely: it writes the
/// response, or for upgrades it answers the handshake and takes the upgraded
/// connection through `hyper::upgrade::on`.
pub trait BareProxy: Send + Sync + 'static {
    /// Whether the engine claims this request or upgrade
    fn should_route(&self, req: &Request<Body>) -> bool;

    /// Handle a plain request
    fn route_request<'a>(&'a self, req: Request<Body>) -> BareResponseFuture<'a>;

    /// Handle an upgrade request; the engine owns the socket afterwards
    fn route_upgrade<'a>(&'a self, req: Request<Body>) -> BareResponseFuture<'a>;

    /// Release engine resources on shutdown
    fn close(&self);
}
