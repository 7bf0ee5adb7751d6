use axum::body::Body;
use hyper::{Request, Response};
use std::convert::TryFrom;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::ports::file_system::{FileServeFuture, FileSystem, FileSystemError};

/// A file system implementation that uses tower-http's ServeDir
#[derive(Debug, Default, Clone)]
pub struct TowerFileSystem;

impl TowerFileSystem {
    /// Creates a new TowerFileSystem
    ///
    /// This is equivalent to calling `Default::default()` since TowerFileSystem has no state.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for TowerFileSystem {
    fn serve_file<'a>(
        &'a self,
        root: &'a str,
        path: &'a str,
        req: Request<Body>,
    ) -> FileServeFuture<'a> {
        Box::pin(async move {
            // ServeDir resolves against the request URI, so rebase it onto the mount root
            let uri_string = format!("/{}", path.trim_start_matches('/'));
            let uri = hyper::Uri::try_from(uri_string)
                .map_err(|e| FileSystemError::InvalidPath(e.to_string()))?;

            let (parts, body) = req.into_parts();
            let mut new_req = Request::from_parts(parts, body);
            *new_req.uri_mut() = uri;

            let serve_dir = ServeDir::new(root);
            let Ok(response) = serve_dir.oneshot(new_req).await;

            let (parts, file_body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(file_body)))
        })
    }
}
