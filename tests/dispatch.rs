mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MockBare, RecordingTunnel, get_request, raw_exchange, start_server, upgrade_request};
use gatehouse::Dispatcher;
use gatehouse::adapters::TowerFileSystem;
use gatehouse::core::{Mount, MountTable, StaticAssetServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn assets(root: &std::path::Path) -> StaticAssetServer {
    let mounts = MountTable::new(vec![
        Mount {
            prefix: "/".to_string(),
            root: root.join("public").to_string_lossy().into_owned(),
        },
        Mount {
            prefix: "/uv/".to_string(),
            root: root.join("uv").to_string_lossy().into_owned(),
        },
    ]);
    StaticAssetServer::new(mounts, Arc::new(TowerFileSystem::new()))
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("public")).unwrap();
    std::fs::create_dir_all(dir.path().join("uv")).unwrap();
    std::fs::write(dir.path().join("uv/foo.js"), "console.log('uv');").unwrap();
    std::fs::write(dir.path().join("public/index.html"), "<h1>home</h1>").unwrap();
    dir
}

#[tokio::test]
async fn static_file_served_from_uv_mount() {
    let dir = fixture();
    let bare = Arc::new(MockBare::default());
    let server = start_server(Dispatcher::new(assets(dir.path())).with_bare(bare.clone()));

    let response = raw_exchange(server.addr, get_request("/uv/foo.js").as_bytes()).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200"), "{text}");
    assert!(text.ends_with("console.log('uv');"));

    let response = raw_exchange(server.addr, get_request("/uv/missing.js").as_bytes()).await;
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 404"));

    assert_eq!(bare.requests.load(Ordering::SeqCst), 0);
    server.stop().await;
}

#[tokio::test]
async fn bare_claimed_requests_never_reach_static() {
    let dir = fixture();
    // A file that would match if the static server saw the request.
    std::fs::create_dir_all(dir.path().join("public/bare")).unwrap();
    std::fs::write(dir.path().join("public/bare/index.html"), "static").unwrap();

    let bare = Arc::new(MockBare::default());
    let server = start_server(Dispatcher::new(assets(dir.path())).with_bare(bare.clone()));

    let response = raw_exchange(server.addr, get_request("/bare/").as_bytes()).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.ends_with("bare"), "{text}");
    assert!(!text.contains("static"));
    assert_eq!(bare.requests.load(Ordering::SeqCst), 1);

    server.stop().await;
}

#[tokio::test]
async fn tunnel_receives_upgrade_once_with_head_bytes() {
    let dir = fixture();
    let bare = Arc::new(MockBare::default());
    let (tunnel, mut received) = RecordingTunnel::new();
    let tunnel = Arc::new(tunnel);
    let dispatcher = Dispatcher::new(assets(dir.path()))
        .with_bare(bare.clone())
        .with_tunnel(tunnel.clone(), "/wisp/");
    let server = start_server(dispatcher);

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let mut request = upgrade_request("/wisp/", "echo").into_bytes();
    request.extend_from_slice(b"HEAD-BYTES");
    stream.write_all(&request).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 101"));

    let head = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(head, b"HEAD-BYTES");
    assert_eq!(tunnel.calls.load(Ordering::SeqCst), 1);
    assert_eq!(bare.upgrades.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn unroutable_upgrade_is_closed_silently() {
    let dir = fixture();
    let (tunnel, _received) = RecordingTunnel::new();
    let tunnel = Arc::new(tunnel);
    let dispatcher = Dispatcher::new(assets(dir.path()))
        .with_bare(Arc::new(MockBare::default()))
        .with_tunnel(tunnel.clone(), "/wisp/");
    let server = start_server(dispatcher);

    for path in ["/uv/foo.js", "/wisp", "/other?next=/wisp/"] {
        let response = raw_exchange(server.addr, upgrade_request(path, "websocket").as_bytes()).await;
        assert!(response.is_empty(), "{path} got {:?}", String::from_utf8_lossy(&response));
    }
    assert_eq!(tunnel.calls.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn bare_claims_upgrades_before_tunnel() {
    let dir = fixture();
    let bare = Arc::new(MockBare::default());
    let (tunnel, _received) = RecordingTunnel::new();
    let tunnel = Arc::new(tunnel);
    let dispatcher = Dispatcher::new(assets(dir.path()))
        .with_bare(bare.clone())
        .with_tunnel(tunnel.clone(), "/wisp/");
    let server = start_server(dispatcher);

    let response = raw_exchange(server.addr, upgrade_request("/bare/wisp/", "websocket").as_bytes()).await;
    assert!(!response.is_empty());
    assert_eq!(bare.upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(tunnel.calls.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn directory_redirect_keeps_mount_prefix() {
    let dir = fixture();
    std::fs::create_dir_all(dir.path().join("uv/sub")).unwrap();
    std::fs::write(dir.path().join("uv/sub/index.html"), "sub").unwrap();
    let server = start_server(Dispatcher::new(assets(dir.path())));

    let response = raw_exchange(server.addr, get_request("/uv/sub").as_bytes()).await;
    let text = String::from_utf8_lossy(&response).to_ascii_lowercase();
    assert!(text.starts_with("http/1.1 3"), "{text}");
    assert!(text.contains("location: /uv/sub/\r\n"), "{text}");

    let response = raw_exchange(server.addr, get_request("/uv/sub/").as_bytes()).await;
    assert!(String::from_utf8_lossy(&response).ends_with("sub"));

    server.stop().await;
}
