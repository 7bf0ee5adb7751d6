use std::sync::Arc;

use axum::body::Body;
use hyper::header::{HeaderValue, LOCATION};
use hyper::{Request, Response, StatusCode};

use crate::core::mount_table::MountTable;
use crate::ports::file_system::FileSystem;

/// Serves files from the mount table; every miss becomes a 404.
pub struct StaticAssetServer {
    mounts: MountTable,
    file_system: Arc<dyn FileSystem>,
}

impl StaticAssetServer {
    pub fn new(mounts: MountTable, file_system: Arc<dyn FileSystem>) -> Self {
        Self {
            mounts,
            file_system,
        }
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub async fn serve(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().to_string();
        let Some((mount, rest)) = self.mounts.find(&path) else {
            tracing::debug!(%path, "No mount point for path");
            return not_found();
        };

        match self.file_system.serve_file(&mount.root, rest, req).await {
            Ok(mut response) => {
                if response.status().is_redirection() {
                    rebase_location(&mut response, &mount.prefix);
                }
                response
            }
            Err(e) => {
                tracing::warn!(%path, root = %mount.root, "Failed to serve static file: {}", e);
                not_found()
            }
        }
    }
}

/// The file system sees paths relative to the mount, so absolute redirect
/// targets it produces have to be put back under the mount prefix.
fn rebase_location(response: &mut Response<Body>, prefix: &str) {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return;
    }
    let Some(location) = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
    else {
        return;
    };
    if !location.starts_with('/') || location.starts_with("//") {
        return;
    }
    if let Ok(rebased) = HeaderValue::from_str(&format!("{prefix}{location}")) {
        response.headers_mut().insert(LOCATION, rebased);
    }
}

pub fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("Not Found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mount_table::Mount;
    use crate::ports::file_system::{FileServeFuture, FileSystemError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFs {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
        redirect: bool,
    }

    impl FileSystem for RecordingFs {
        fn serve_file<'a>(
            &'a self,
            root: &'a str,
            path: &'a str,
            _req: Request<Body>,
        ) -> FileServeFuture<'a> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((root.to_string(), path.to_string()));
                if self.fail {
                    Err(FileSystemError::InvalidPath(path.to_string()))
                } else if self.redirect {
                    Ok(Response::builder()
                        .status(StatusCode::TEMPORARY_REDIRECT)
                        .header(LOCATION, format!("/{path}/"))
                        .body(Body::empty())
                        .unwrap())
                } else {
                    Ok(Response::new(Body::from("ok")))
                }
            })
        }
    }

    fn server(fs: Arc<RecordingFs>) -> StaticAssetServer {
        let mounts = MountTable::new(vec![
            Mount {
                prefix: "/".to_string(),
                root: "public".to_string(),
            },
            Mount {
                prefix: "/uv/".to_string(),
                root: "assets/uv".to_string(),
            },
        ]);
        StaticAssetServer::new(mounts, fs)
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_routes_to_matching_mount() {
        let fs = Arc::new(RecordingFs::default());
        let assets = server(fs.clone());

        let response = assets.serve(get("/uv/uv.bundle.js?v=2")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            fs.calls.lock().unwrap()[0],
            ("assets/uv".to_string(), "uv.bundle.js".to_string())
        );
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let fs = Arc::new(RecordingFs::default());
        let assets = StaticAssetServer::new(MountTable::default(), fs.clone());

        let response = assets.serve(get("/anything")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(fs.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_system_error_is_not_found() {
        let fs = Arc::new(RecordingFs {
            fail: true,
            ..Default::default()
        });
        let response = server(fs).serve(get("/index.html")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_redirect_stays_under_mount() {
        let fs = Arc::new(RecordingFs {
            redirect: true,
            ..Default::default()
        });
        let assets = server(fs);

        let response = assets.serve(get("/uv/sub")).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/uv/sub/");

        let response = assets.serve(get("/docs")).await;
        assert_eq!(response.headers()[LOCATION], "/docs/");
    }
}
