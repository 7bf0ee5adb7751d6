use axum::Json;
use axum::body::Body;
use axum::response::IntoResponse;
use hyper::{Response, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::ports::http_client::HttpClientError;

/// Error body every bare client understands: `{code, id, message}`.
#[derive(Error, Debug, Clone, Serialize)]
#[error("{code} ({id}): {message}")]
pub struct BareError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub id: String,
    pub message: String,
}

impl BareError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn missing_header(name: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "MISSING_BARE_HEADER",
            format!("request.headers.{name}"),
            "Header was not specified.",
        )
    }

    pub fn invalid_header(name: &str, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "INVALID_BARE_HEADER",
            format!("request.headers.{name}"),
            message,
        )
    }

    pub fn forbidden_header(list: &str, header: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "FORBIDDEN_BARE_HEADER",
            format!("request.headers.{list}"),
            format!("A forbidden header was passed: {header}"),
        )
    }

    pub fn host_forbidden(id: &str) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "HOST_FORBIDDEN",
            id,
            "The remote resolves to a local address.",
        )
    }

    pub fn host_not_found() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "HOST_NOT_FOUND",
            "request",
            "The specified host could not be resolved.",
        )
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "UNKNOWN", "error.NotFoundError", "Not found.")
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "UNKNOWN",
            "error.Error",
            message,
        )
    }

    pub fn into_response(self) -> Response<Body> {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

impl From<HttpClientError> for BareError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::HostNotFound(_) => Self::host_not_found(),
            HttpClientError::Forbidden(_) => Self::host_forbidden("request"),
            HttpClientError::ConnectionRefused(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONNECTION_REFUSED",
                "response",
                "The remote rejected the request.",
            ),
            HttpClientError::TimeoutError(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONNECTION_TIMEOUT",
                "response",
                "The response timed out.",
            ),
            other => Self::unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = BareError::missing_header("x-bare-url").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "MISSING_BARE_HEADER");
        assert_eq!(value["id"], "request.headers.x-bare-url");
        assert!(value.get("status").is_none());
    }

    #[test]
    fn test_client_errors_map_to_codes() {
        let err: BareError = HttpClientError::HostNotFound("x".into()).into();
        assert_eq!(err.code, "HOST_NOT_FOUND");

        let err: BareError = HttpClientError::Forbidden("x".into()).into();
        assert_eq!(err.code, "HOST_FORBIDDEN");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err: BareError = HttpClientError::ConnectionRefused("x".into()).into();
        assert_eq!(err.code, "CONNECTION_REFUSED");

        let err: BareError = HttpClientError::TimeoutError(Duration::from_secs(1)).into();
        assert_eq!(err.code, "CONNECTION_TIMEOUT");

        let err: BareError = HttpClientError::ConnectionError("reset".into()).into();
        assert_eq!(err.code, "UNKNOWN");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
