//! Server-side WebSocket handshake shared by the bare and WISP engines.

use axum::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;

pub type ServerSocket = WebSocketStream<TokioIo<Upgraded>>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("request is not a websocket upgrade")]
    NotWebSocket,

    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("unsupported websocket version")]
    UnsupportedVersion,
}

impl HandshakeError {
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.to_string()));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        if self == HandshakeError::UnsupportedVersion {
            response
                .headers_mut()
                .insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        }
        response
    }
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// `Connection: upgrade` plus `Upgrade: websocket`.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    header_has_token(headers, header::CONNECTION, "upgrade")
        && header_has_token(headers, header::UPGRADE, "websocket")
}

/// Validate the client handshake and build the `101` answer.
///
/// The returned [`OnUpgrade`] resolves to the raw connection once hyper has
/// written the response.
pub fn accept(
    req: &mut Request<Body>,
    protocol: Option<&str>,
) -> Result<(Response<Body>, OnUpgrade), HandshakeError> {
    if !is_websocket_upgrade(req.headers()) {
        return Err(HandshakeError::NotWebSocket);
    }

    let version_ok = req
        .headers()
        .get(header::SEC_WEBSOCKET_VERSION)
        .is_some_and(|v| v.as_bytes() == b"13");
    if !version_ok {
        return Err(HandshakeError::UnsupportedVersion);
    }

    let accept_key = req
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
        .ok_or(HandshakeError::MissingKey)?;

    let on_upgrade = hyper::upgrade::on(&mut *req);

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(value) = HeaderValue::from_str(&accept_key) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
    }
    if let Some(value) = protocol.and_then(|p| HeaderValue::from_str(p).ok()) {
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok((response, on_upgrade))
}

/// Wait for the upgrade to finish and wrap the connection as a server socket.
pub async fn server_socket(on_upgrade: OnUpgrade) -> Result<ServerSocket, hyper::Error> {
    let upgraded = on_upgrade.await?;
    Ok(WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await)
}
