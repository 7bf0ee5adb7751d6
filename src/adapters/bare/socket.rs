//! Bare v3 WebSocket relay.
//!
//! The client opens a socket on `<directory>v3/`, sends one text frame
//! describing the remote, and after the `open` answer every frame is copied
//! verbatim in both directions.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response as RemoteResponse;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls};

use super::error::BareError;
use super::headers::{FORBIDDEN_FORWARD, JsonHeaderValue};
use super::remote::{parse_remote, resolve_remote};
use crate::ports::http_client::HttpClientError;
use crate::adapters::websocket::ServerSocket;

const CONNECT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);
const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake headers tungstenite generates itself.
const MANAGED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
    "sec-websocket-protocol",
];

type RemoteSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Connect {
        remote: String,
        #[serde(default)]
        protocols: Vec<String>,
        #[serde(default)]
        headers: BTreeMap<String, JsonHeaderValue>,
        #[serde(default, rename = "forwardHeaders")]
        forward_headers: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct OpenMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    protocol: &'a str,
    #[serde(rename = "setCookies")]
    set_cookies: Vec<String>,
}

/// Relay one client socket until either side closes or the engine shuts down.
pub async fn relay(
    mut client: ServerSocket,
    request_headers: HeaderMap,
    block_local: bool,
    mut closed: watch::Receiver<bool>,
) {
    let message = match timeout(CONNECT_MESSAGE_TIMEOUT, client.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str::<ClientMessage>(text.as_str()),
        _ => {
            tracing::debug!("Bare socket closed before a connect message");
            let _ = client.close(None).await;
            return;
        }
    };
    let message = match message {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Invalid bare connect message: {}", e);
            let _ = client.close(None).await;
            return;
        }
    };

    let (remote, response) = match open_remote(message, &request_headers, block_local).await {
        Ok(opened) => opened,
        Err(e) => {
            tracing::debug!("Bare socket remote failed: {}", e);
            let _ = client.close(None).await;
            return;
        }
    };

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let set_cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();
    let open = OpenMessage {
        kind: "open",
        protocol,
        set_cookies,
    };
    let Ok(open) = serde_json::to_string(&open) else {
        return;
    };
    if client.send(Message::text(open)).await.is_err() {
        return;
    }

    pipe(client, remote, &mut closed).await;
}

async fn open_remote(
    message: ClientMessage,
    request_headers: &HeaderMap,
    block_local: bool,
) -> Result<(RemoteSocket, RemoteResponse), BareError> {
    let ClientMessage::Connect {
        remote,
        protocols,
        headers,
        forward_headers,
    } = message;

    let uri = parse_remote(&remote, "remote", &["ws", "wss"])?;
    let addrs = resolve_remote(&uri, block_local, "remote").await?;

    let mut request = uri
        .to_string()
        .into_client_request()
        .map_err(|e| BareError::invalid_header("remote", e.to_string()))?;
    let outbound = request.headers_mut();

    for (name, value) in &headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if MANAGED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        outbound.remove(&name);
        for item in value.values() {
            if let Ok(item) = HeaderValue::from_str(item) {
                outbound.append(name.clone(), item);
            }
        }
    }

    for name in &forward_headers {
        let name = name.to_ascii_lowercase();
        if FORBIDDEN_FORWARD.contains(&name.as_str()) || MANAGED_HEADERS.contains(&name.as_str())
        {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if let Some(value) = request_headers.get(&name) {
            outbound.insert(name, value.clone());
        }
    }

    if !protocols.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&protocols.join(", ")) {
            outbound.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
        }
    }

    let stream = match timeout(REMOTE_CONNECT_TIMEOUT, TcpStream::connect(&addrs[..])).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(dial_error(e).into()),
        Err(_) => return Err(HttpClientError::TimeoutError(REMOTE_CONNECT_TIMEOUT).into()),
    };
    let _ = stream.set_nodelay(true);

    client_async_tls(request, stream)
        .await
        .map_err(|e| BareError::unknown(e.to_string()))
}

fn dial_error(err: std::io::Error) -> HttpClientError {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => HttpClientError::ConnectionRefused(err.to_string()),
        _ => HttpClientError::ConnectionError(err.to_string()),
    }
}

async fn pipe(client: ServerSocket, remote: RemoteSocket, closed: &mut watch::Receiver<bool>) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut remote_tx, mut remote_rx) = remote.split();

    if !*closed.borrow() {
        loop {
            tokio::select! {
                message = client_rx.next() => {
                    if !forward(message, &mut remote_tx).await {
                        break;
                    }
                }
                message = remote_rx.next() => {
                    if !forward(message, &mut client_tx).await {
                        break;
                    }
                }
                _ = closed.changed() => break,
            }
        }
    }

    let _ = client_tx.close().await;
    let _ = remote_tx.close().await;
}

/// Copy one data frame; returns false once the relay should stop.
async fn forward<S>(message: Option<Result<Message, tungstenite::Error>>, sink: &mut S) -> bool
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match message {
        Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
            sink.send(message).await.is_ok()
        }
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => false,
        Some(Ok(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect_message() {
        let raw = r#"{
            "type": "connect",
            "remote": "wss://example.com/socket",
            "protocols": ["chat"],
            "headers": {"user-agent": "test", "cookie": ["a=1", "b=2"]},
            "forwardHeaders": ["accept-language"]
        }"#;
        let ClientMessage::Connect {
            remote,
            protocols,
            headers,
            forward_headers,
        } = serde_json::from_str(raw).unwrap();

        assert_eq!(remote, "wss://example.com/socket");
        assert_eq!(protocols, vec!["chat"]);
        assert_eq!(headers["cookie"].values().count(), 2);
        assert_eq!(forward_headers, vec!["accept-language"]);
    }

    #[test]
    fn test_connect_message_defaults() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"connect","remote":"ws://example.com/"}"#).unwrap();
        let ClientMessage::Connect {
            protocols, headers, ..
        } = message;
        assert!(protocols.is_empty());
        assert!(headers.is_empty());

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"other"}"#).is_err());
    }

    #[test]
    fn test_open_message_shape() {
        let open = OpenMessage {
            kind: "open",
            protocol: "chat",
            set_cookies: vec!["a=1".to_string()],
        };
        let value: serde_json::Value = serde_json::to_value(&open).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "open", "protocol": "chat", "setCookies": ["a=1"]})
        );
    }

    #[tokio::test]
    async fn test_local_remote_is_refused() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"connect","remote":"ws://127.0.0.1:1/"}"#).unwrap();
        let err = open_remote(message, &HeaderMap::new(), true)
            .await
            .unwrap_err();
        assert_eq!(err.code, "HOST_FORBIDDEN");
    }

    #[tokio::test]
    async fn test_dials_resolved_remote() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let message: ClientMessage = serde_json::from_value(serde_json::json!({
            "type": "connect",
            "remote": format!("ws://127.0.0.1:{port}/"),
        }))
        .unwrap();
        let err = open_remote(message, &HeaderMap::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err.code, "CONNECTION_REFUSED");
    }
}
