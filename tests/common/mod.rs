#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use gatehouse::core::lifecycle::bind_dual_stack;
use gatehouse::ports::bare::{BareProxy, BareResponseFuture};
use gatehouse::ports::http_client::{FetchTextFuture, HttpClient, HttpClientError, HttpResponseFuture};
use gatehouse::ports::http_server::HttpServer;
use gatehouse::ports::tunnel::{TunnelEngine, TunnelResponseFuture};
use gatehouse::utils::graceful_shutdown::{GracefulShutdown, ShutdownReason};
use gatehouse::adapters::HyperServer;
use gatehouse::Dispatcher;
use hyper::header::{CONNECTION, UPGRADE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bare engine double claiming everything under `/bare/`.
#[derive(Default)]
pub struct MockBare {
    pub requests: AtomicUsize,
    pub upgrades: AtomicUsize,
    pub closes: AtomicUsize,
}

impl BareProxy for MockBare {
    fn should_route(&self, req: &Request<Body>) -> bool {
        req.uri().path().starts_with("/bare/")
    }

    fn route_request<'a>(&'a self, _req: Request<Body>) -> BareResponseFuture<'a> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Response::new(Body::from("bare")) })
    }

    fn route_upgrade<'a>(&'a self, _req: Request<Body>) -> BareResponseFuture<'a> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Response::new(Body::from("bare upgrade")) })
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tunnel double: answers `101` and reports the first bytes it reads.
pub struct RecordingTunnel {
    pub calls: AtomicUsize,
    received: mpsc::UnboundedSender<Vec<u8>>,
}

impl RecordingTunnel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (received, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls: AtomicUsize::new(0),
                received,
            },
            rx,
        )
    }
}

impl TunnelEngine for RecordingTunnel {
    fn route_request<'a>(&'a self, mut req: Request<Body>) -> TunnelResponseFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let on_upgrade = hyper::upgrade::on(&mut req);
        let received = self.received.clone();

        tokio::spawn(async move {
            let Ok(upgraded) = on_upgrade.await else {
                return;
            };
            let mut io = TokioIo::new(upgraded);
            let mut buf = vec![0u8; 1024];
            if let Ok(n) = io.read(&mut buf).await {
                let _ = received.send(buf[..n].to_vec());
            }
        });

        Box::pin(async {
            Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .header(CONNECTION, "Upgrade")
                .header(UPGRADE, "echo")
                .body(Body::empty())
                .unwrap()
        })
    }
}

/// Outbound client whose lookups never finish.
pub struct HangingClient {
    pub lookups: AtomicUsize,
}

impl HangingClient {
    pub fn new() -> Self {
        Self {
            lookups: AtomicUsize::new(0),
        }
    }
}

impl HttpClient for HangingClient {
    fn send_request<'a>(&'a self, _req: Request<Body>) -> HttpResponseFuture<'a> {
        Box::pin(async { Err(HttpClientError::InvalidRequestError("unused".into())) })
    }

    fn fetch_text<'a>(&'a self, _url: &'a str, _timeout: Duration) -> FetchTextFuture<'a> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::pending())
    }
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Arc<GracefulShutdown>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    pub async fn stop(self) {
        self.shutdown.trigger_shutdown(ShutdownReason::Manual);
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Serve `dispatcher` on an ephemeral loopback port.
pub fn start_server(dispatcher: Dispatcher) -> RunningServer {
    let listener = bind_dual_stack("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(GracefulShutdown::new());
    let token = shutdown.shutdown_token();

    let server = HyperServer::new(Arc::new(dispatcher), Duration::ZERO);
    let handle = tokio::spawn(async move { server.run(listener, token).await });

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}

/// Write raw bytes and read until the server closes or stops talking.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut received = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received)).await;
    received
}

pub fn get_request(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

pub fn upgrade_request(path: &str, protocol: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: {protocol}\r\n\r\n"
    )
}
