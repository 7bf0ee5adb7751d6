//! Routes every request and upgrade to exactly one handler.
//!
//! Plain requests: bare engine if it claims them, otherwise static assets.
//! Upgrades: bare engine, then the tunnel (path ends with the suffix), then
//! nobody. Unclaimed upgrades surface as [`DispatchError::Unroutable`] so the
//! server drops the connection without writing a byte.

use std::sync::Arc;

use axum::body::Body;
use hyper::header::{self, HeaderMap};
use hyper::{Request, Response, Version};
use thiserror::Error;

use crate::core::static_assets::StaticAssetServer;
use crate::metrics::{self, RequestTimer};
use crate::ports::bare::BareProxy;
use crate::ports::tunnel::TunnelEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    BareOwned,
    TunnelOwned,
    StaticOwned,
    Unroutable,
}

impl RouteDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteDecision::BareOwned => "bare",
            RouteDecision::TunnelOwned => "tunnel",
            RouteDecision::StaticOwned => "static",
            RouteDecision::Unroutable => "unroutable",
        }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no handler for upgrade to {path}")]
    Unroutable { path: String },
}

pub struct Dispatcher {
    bare: Option<Arc<dyn BareProxy>>,
    tunnel: Option<Arc<dyn TunnelEngine>>,
    tunnel_suffix: String,
    assets: StaticAssetServer,
}

impl Dispatcher {
    pub fn new(assets: StaticAssetServer) -> Self {
        Self {
            bare: None,
            tunnel: None,
            tunnel_suffix: String::new(),
            assets,
        }
    }

    pub fn with_bare(mut self, bare: Arc<dyn BareProxy>) -> Self {
        self.bare = Some(bare);
        self
    }

    pub fn with_tunnel(mut self, tunnel: Arc<dyn TunnelEngine>, suffix: impl Into<String>) -> Self {
        self.tunnel = Some(tunnel);
        self.tunnel_suffix = suffix.into();
        self
    }

    fn claiming_bare(&self, req: &Request<Body>) -> Option<&Arc<dyn BareProxy>> {
        self.bare.as_ref().filter(|bare| bare.should_route(req))
    }

    fn claiming_tunnel(&self, req: &Request<Body>) -> Option<&Arc<dyn TunnelEngine>> {
        if self.tunnel_suffix.is_empty() || !req.uri().path().ends_with(&self.tunnel_suffix) {
            return None;
        }
        self.tunnel.as_ref()
    }

    pub fn classify(&self, req: &Request<Body>) -> RouteDecision {
        if self.claiming_bare(req).is_some() {
            RouteDecision::BareOwned
        } else if !is_upgrade_request(req) {
            RouteDecision::StaticOwned
        } else if self.claiming_tunnel(req).is_some() {
            RouteDecision::TunnelOwned
        } else {
            RouteDecision::Unroutable
        }
    }

    /// Entry point for the server: picks the plain or upgrade path.
    pub async fn dispatch(&self, req: Request<Body>) -> Result<Response<Body>, DispatchError> {
        let decision = self.classify(&req);
        let upgrade = is_upgrade_request(&req);
        tracing::debug!(
            path = %req.uri().path(),
            route = decision.as_str(),
            upgrade,
            "Dispatching"
        );
        metrics::increment_dispatch(decision.as_str());
        let _timer = RequestTimer::new(decision.as_str());

        if upgrade {
            self.handle_upgrade(req).await
        } else {
            Ok(self.handle_request(req).await)
        }
    }

    pub async fn handle_request(&self, req: Request<Body>) -> Response<Body> {
        if let Some(bare) = self.claiming_bare(&req) {
            return bare.route_request(req).await;
        }
        self.assets.serve(req).await
    }

    pub async fn handle_upgrade(&self, req: Request<Body>) -> Result<Response<Body>, DispatchError> {
        if let Some(bare) = self.claiming_bare(&req) {
            return Ok(bare.route_upgrade(req).await);
        }
        if let Some(tunnel) = self.claiming_tunnel(&req) {
            return Ok(tunnel.route_request(req).await);
        }
        Err(DispatchError::Unroutable {
            path: req.uri().path().to_string(),
        })
    }
}

fn has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// HTTP/1.1 `Connection: upgrade` with an `Upgrade` protocol named.
pub fn is_upgrade_request(req: &Request<Body>) -> bool {
    req.version() == Version::HTTP_11
        && req.headers().contains_key(header::UPGRADE)
        && has_token(req.headers(), header::CONNECTION, "upgrade")
}
