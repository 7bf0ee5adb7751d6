use axum::body::Body;
use hyper::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Custom error type for outbound HTTP operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when the connection to the remote fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The remote host actively refused the connection
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The remote host name did not resolve
    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// The remote host resolved to an address the client refuses to dial
    #[error("Host forbidden: {0}")]
    Forbidden(String),

    /// Error when the request times out
    #[error("Timeout error after {0:?}")]
    TimeoutError(Duration),

    /// Error when the request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequestError(String),

    /// Error when the remote answers with a non-success status
    #[error("Remote returned error status: {status}, url: {url}")]
    StatusError { url: String, status: u16 },

    /// Error when reading the response body fails
    #[error("Body error: {0}")]
    BodyError(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Type alias for async HTTP request responses
pub type HttpResponseFuture<'a> =
    Pin<Box<dyn Future<Output = HttpClientResult<Response<Body>>> + Send + 'a>>;

/// Type alias for async text fetches
pub type FetchTextFuture<'a> = Pin<Box<dyn Future<Output = HttpClientResult<String>> + Send + 'a>>;

/// HttpClient defines the port (interface) for outbound HTTP requests
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to a remote server
    fn send_request<'a>(&'a self, req: Request<Body>) -> HttpResponseFuture<'a>;

    /// GET `url` and return the body as text, bounded by `timeout`
    fn fetch_text<'a>(&'a self, url: &'a str, timeout: Duration) -> FetchTextFuture<'a>;
}
