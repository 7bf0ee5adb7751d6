//! Bare v3 request-forwarding engine.
//!
//! Mounted under a directory such as `/bare/`:
//!
//! | Path           | Meaning                                        |
//! |----------------|------------------------------------------------|
//! | `<dir>`        | JSON manifest                                  |
//! | `<dir>v3/`     | forward one request described by `x-bare-*`    |
//! | `<dir>v3/` ws  | WebSocket relay, see [`socket`]                |
//!
//! Every answer carries permissive CORS headers; failures are JSON bodies
//! of the form `{code, id, message}`.

pub mod error;
pub mod headers;
pub mod remote;
pub mod socket;

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::response::IntoResponse;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tokio::sync::watch;

use crate::adapters::websocket;
use crate::config::{BareConfig, BareMaintainer};
use crate::metrics;
use crate::ports::bare::{BareProxy, BareResponseFuture};
use crate::ports::http_client::HttpClient;

pub use error::BareError;

const HTTP_SCHEMES: &[&str] = &["http", "https"];

#[derive(Serialize)]
struct Manifest<'a> {
    versions: &'static [&'static str],
    language: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintainer: Option<&'a BareMaintainer>,
    project: Project,
}

#[derive(Serialize)]
struct Project {
    name: &'static str,
    description: &'static str,
    version: &'static str,
}

pub struct BareServer {
    config: BareConfig,
    client: Arc<dyn HttpClient>,
    closed: watch::Sender<bool>,
}

impl BareServer {
    pub fn new(config: BareConfig, client: Arc<dyn HttpClient>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            config,
            client,
            closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Path below the bare directory, if the request is inside it.
    fn route_path<'a>(&self, req: &'a Request<Body>) -> Option<&'a str> {
        req.uri().path().strip_prefix(self.config.directory.as_str())
    }

    fn manifest(&self) -> Response<Body> {
        let manifest = Manifest {
            versions: &["v3"],
            language: "Rust",
            maintainer: self.config.maintainer.as_ref(),
            project: Project {
                name: env!("CARGO_PKG_NAME"),
                description: env!("CARGO_PKG_DESCRIPTION"),
                version: env!("CARGO_PKG_VERSION"),
            },
        };
        Json(manifest).into_response()
    }

    async fn forward_v3(&self, req: Request<Body>) -> Result<Response<Body>, BareError> {
        let (parts, body) = req.into_parts();
        let incoming = &parts.headers;

        let url = headers::read_split(incoming, "x-bare-url")?
            .ok_or_else(|| BareError::missing_header("x-bare-url"))?;
        let remote = remote::parse_remote(&url, "x-bare-url", HTTP_SCHEMES)?;
        remote::check_remote(&remote, self.config.block_local, "x-bare-url").await?;

        let raw_headers = headers::read_split(incoming, "x-bare-headers")?
            .ok_or_else(|| BareError::missing_header("x-bare-headers"))?;
        let mut outbound = headers::parse_remote_headers(&raw_headers)?;

        let cache = wants_cache(parts.uri.query());

        let mut forward = headers::parse_name_list(
            incoming.get("x-bare-forward-headers"),
            "x-bare-forward-headers",
            headers::FORBIDDEN_FORWARD,
        )?;
        forward.extend(headers::DEFAULT_FORWARD.iter().map(|s| s.to_string()));

        let mut pass = headers::parse_name_list(
            incoming.get("x-bare-pass-headers"),
            "x-bare-pass-headers",
            headers::FORBIDDEN_PASS,
        )?;
        pass.extend(headers::DEFAULT_PASS.iter().map(|s| s.to_string()));

        let mut pass_status = headers::parse_status_list(incoming.get("x-bare-pass-status"))?;

        if cache {
            forward.extend(headers::CACHE_FORWARD.iter().map(|s| s.to_string()));
            pass.extend(headers::CACHE_PASS.iter().map(|s| s.to_string()));
            pass_status.push(StatusCode::NOT_MODIFIED.as_u16());
        }

        copy_headers(incoming, &mut outbound, &forward);

        let mut outbound_req = Request::new(body);
        *outbound_req.method_mut() = parts.method;
        *outbound_req.uri_mut() = remote;
        *outbound_req.headers_mut() = outbound;

        let response = self.client.send_request(outbound_req).await?;
        let (remote_parts, remote_body) = response.into_parts();
        let status = remote_parts.status;

        let mut answer_headers = HeaderMap::new();
        copy_headers(&remote_parts.headers, &mut answer_headers, &pass);
        answer_headers.insert("x-bare-status", HeaderValue::from(status.as_u16()));
        answer_headers.insert(
            "x-bare-status-text",
            HeaderValue::from_static(status.canonical_reason().unwrap_or("")),
        );
        headers::write_split(
            &mut answer_headers,
            "x-bare-headers",
            &headers::encode_remote_headers(&remote_parts.headers),
        )?;

        let mut answer = Response::new(remote_body);
        *answer.status_mut() = if pass_status.contains(&status.as_u16()) {
            status
        } else {
            StatusCode::OK
        };
        *answer.headers_mut() = answer_headers;
        Ok(answer)
    }
}

fn wants_cache(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair == "cache" || pair.starts_with("cache="))
    })
}

/// Copy the named headers from `from`, replacing what `to` already holds.
fn copy_headers(from: &HeaderMap, to: &mut HeaderMap, names: &[String]) {
    for name in names {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if !from.contains_key(&name) {
            continue;
        }
        to.remove(&name);
        for value in from.get_all(&name) {
            to.append(name.clone(), value.clone());
        }
    }
}

fn apply_cors(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    let any = HeaderValue::from_static("*");
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, any.clone());
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, any.clone());
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, any.clone());
    headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, any);
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("7200"));
    headers.insert("x-robots-tag", HeaderValue::from_static("noindex"));
}

impl BareProxy for BareServer {
    fn should_route(&self, req: &Request<Body>) -> bool {
        !self.is_closed() && self.route_path(req).is_some()
    }

    fn route_request<'a>(&'a self, req: Request<Body>) -> BareResponseFuture<'a> {
        Box::pin(async move {
            let mut response = if req.method() == Method::OPTIONS {
                Response::new(Body::empty())
            } else {
                match self.route_path(&req) {
                    Some("") => {
                        metrics::increment_bare_requests("manifest");
                        self.manifest()
                    }
                    Some("v3/") => {
                        metrics::increment_bare_requests("v3");
                        self.forward_v3(req).await.unwrap_or_else(|e| {
                            tracing::debug!("Bare request failed: {}", e);
                            e.into_response()
                        })
                    }
                    _ => BareError::not_found().into_response(),
                }
            };
            apply_cors(&mut response);
            response
        })
    }

    fn route_upgrade<'a>(&'a self, mut req: Request<Body>) -> BareResponseFuture<'a> {
        Box::pin(async move {
            if self.route_path(&req) != Some("v3/") {
                let mut response = BareError::not_found().into_response();
                apply_cors(&mut response);
                return response;
            }

            let request_headers = req.headers().clone();
            let (response, on_upgrade) = match websocket::accept(&mut req, None) {
                Ok(accepted) => accepted,
                Err(e) => return e.into_response(),
            };

            metrics::increment_bare_requests("websocket");
            let block_local = self.config.block_local;
            let closed = self.closed.subscribe();
            tokio::spawn(async move {
                match websocket::server_socket(on_upgrade).await {
                    Ok(client) => socket::relay(client, request_headers, block_local, closed).await,
                    Err(e) => tracing::debug!("Bare upgrade failed: {}", e),
                }
            });

            response
        })
    }

    fn close(&self) {
        if !self.closed.send_replace(true) {
            tracing::info!("Bare server closed");
        }
    }
}
