use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::dns::Name;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tower::Service;

use crate::ports::http_client::{
    FetchTextFuture, HttpClient, HttpClientError, HttpClientResult, HttpResponseFuture,
};
use crate::utils::net::is_local_ip;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Name resolver for the outbound connector.
///
/// With `block_local` set, a name with any local answer fails to resolve, so
/// the addresses that get dialed are the ones that were checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardedResolver {
    block_local: bool,
}

impl GuardedResolver {
    pub fn new(block_local: bool) -> Self {
        Self { block_local }
    }
}

impl Service<Name> for GuardedResolver {
    type Response = std::vec::IntoIter<SocketAddr>;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, name: Name) -> Self::Future {
        let block_local = self.block_local;
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), 0))
                .await?
                .collect();
            if block_local && addrs.iter().any(|addr| is_local_ip(addr.ip())) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{} resolves to a local address", name.as_str()),
                ));
            }
            Ok(addrs.into_iter())
        })
    }
}

/// Outbound HTTP/HTTPS client used by the bare engine and the public IP lookup.
#[derive(Clone)]
pub struct HyperHttpClient {
    client: Client<HttpsConnector<HttpConnector<GuardedResolver>>, Body>,
}

impl HyperHttpClient {
    pub fn new() -> HttpClientResult<Self> {
        Self::guarded(false)
    }

    /// A client that refuses names resolving to local addresses when `block_local` is set.
    pub fn guarded(block_local: bool) -> HttpClientResult<Self> {
        install_crypto_provider();

        let mut http = HttpConnector::new_with_resolver(GuardedResolver::new(block_local));
        http.enforce_http(false);
        http.set_connect_timeout(Some(CONNECT_TIMEOUT));

        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                // Plain HTTP keeps working; HTTPS remotes fail certificate checks.
                tracing::warn!("No native root certificates available: {}", e);
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(tls)
            }
        };
        let https = builder.https_or_http().enable_http1().wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);

        tracing::info!("Created new HTTPS-capable HTTP client");
        Ok(Self { client })
    }

    /// Map a client error onto the port's taxonomy by walking its source chain.
    fn classify_error(err: &hyper_util::client::legacy::Error) -> HttpClientError {
        let chain = || std::iter::successors(err.source(), |&cause| cause.source());

        // The resolver refusal arrives wrapped in a "dns error" cause.
        let refused = chain().find_map(|cause| {
            cause
                .downcast_ref::<io::Error>()
                .filter(|io| io.kind() == io::ErrorKind::PermissionDenied)
        });
        if let Some(io) = refused {
            return HttpClientError::Forbidden(io.to_string());
        }

        let mut source: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        return HttpClientError::ConnectionRefused(io.to_string());
                    }
                    std::io::ErrorKind::TimedOut => {
                        return HttpClientError::TimeoutError(CONNECT_TIMEOUT);
                    }
                    _ => {}
                }
            }
            let text = cause.to_string();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return HttpClientError::HostNotFound(text);
            }
            source = cause.source();
        }
        HttpClientError::ConnectionError(err.to_string())
    }
}

impl HttpClient for HyperHttpClient {
    fn send_request<'a>(&'a self, req: Request<Body>) -> HttpResponseFuture<'a> {
        Box::pin(async move {
            let method = req.method().clone();
            let uri = req.uri().clone();
            tracing::debug!("Sending request: {} {}", method, uri);

            match self.client.request(req).await {
                Ok(response) => {
                    tracing::debug!(
                        "Received response from {} {}: status={}",
                        method,
                        uri,
                        response.status()
                    );
                    Ok(response.map(Body::new))
                }
                Err(err) => {
                    tracing::debug!("Error making request to {} {}: {}", method, uri, err);
                    Err(Self::classify_error(&err))
                }
            }
        })
    }

    fn fetch_text<'a>(&'a self, url: &'a str, limit: Duration) -> FetchTextFuture<'a> {
        Box::pin(async move {
            let req = Request::builder()
                .method("GET")
                .uri(url)
                .header(hyper::header::USER_AGENT, concat!("gatehouse/", env!("CARGO_PKG_VERSION")))
                .body(Body::empty())
                .map_err(|e| HttpClientError::InvalidRequestError(e.to_string()))?;

            let fetch = async {
                let response = self.send_request(req).await?;
                let status = response.status();
                if status != StatusCode::OK {
                    return Err(HttpClientError::StatusError {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let bytes = response
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| HttpClientError::BodyError(e.to_string()))?
                    .to_bytes();
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            };

            match timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => Err(HttpClientError::TimeoutError(limit)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn one_shot_server(reply: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            stream.write_all(reply.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/ip")
    }

    #[tokio::test]
    async fn test_fetch_text_reads_body() {
        let url = one_shot_server(
            "HTTP/1.1 200 OK\r\ncontent-length: 12\r\nconnection: close\r\n\r\n203.0.113.7\n",
        )
        .await;

        let client = HyperHttpClient::new().unwrap();
        let text = client.fetch_text(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(text.trim(), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_fetch_text_rejects_error_status() {
        let url = one_shot_server(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let client = HyperHttpClient::new().unwrap();
        let err = client.fetch_text(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, HttpClientError::StatusError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_guarded_client_refuses_local_names() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = HyperHttpClient::guarded(true).unwrap();
        let err = client
            .fetch_text(&format!("http://localhost:{port}/"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::Forbidden(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_resolver_passes_local_names_when_open() {
        let mut resolver = GuardedResolver::new(false);
        let addrs: Vec<SocketAddr> = resolver
            .call("localhost".parse().unwrap())
            .await
            .unwrap()
            .collect();
        assert!(addrs.iter().all(|addr| addr.ip().is_loopback()));

        let mut resolver = GuardedResolver::new(true);
        let err = resolver.call("localhost".parse().unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HyperHttpClient::new().unwrap();
        let err = client
            .fetch_text(&format!("http://{addr}/"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::ConnectionRefused(_)));
    }

    #[tokio::test]
    async fn test_fetch_text_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = HyperHttpClient::new().unwrap();
        let err = client
            .fetch_text(&format!("http://{addr}/"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::TimeoutError(_)));
    }
}
